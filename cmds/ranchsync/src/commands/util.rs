//! Utilities for command handlers.

use std::{
	fs,
	io::{self, ErrorKind, Write},
	path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::{
	config::{ConnectionOverrides, RanchsyncConfig},
	descriptor::{self, Descriptor, TemplateValues},
	merge,
};

/// Template value sources shared by commands that read descriptors.
#[derive(Args, Debug, Clone, Default)]
pub struct ValuesArgs {
	/// YAML file with template values. May be repeated, later files win
	#[arg(long = "values", value_name = "FILE")]
	pub files: Vec<PathBuf>,

	/// Set a template value (Format: key=value). Wins over --values files
	#[arg(long = "set", value_name = "KEY=VALUE")]
	pub set: Vec<String>,
}

impl ValuesArgs {
	/// Layer config values, then `--values` files, then `--set` pairs.
	pub fn resolve(&self, base: &TemplateValues) -> Result<TemplateValues> {
		let mut values = base.clone();
		for path in &self.files {
			let content = fs::read_to_string(path)
				.with_context(|| format!("failed to read values file: {}", path.display()))?;
			let file: TemplateValues = serde_yaml_with_quirks::from_str(&content)
				.with_context(|| format!("failed to parse values file: {}", path.display()))?;
			values.extend(file);
		}
		for pair in &self.set {
			let (key, value) = parse_set(pair)?;
			values.insert(key, value);
		}
		Ok(values)
	}
}

/// Parse a `key=value` pair. The value is read as a YAML scalar so numbers
/// and booleans keep their type; anything else stays a string.
fn parse_set(pair: &str) -> Result<(String, serde_json::Value)> {
	let Some((key, raw)) = pair.split_once('=') else {
		bail!("invalid --set value `{pair}`, expected key=value");
	};
	if key.is_empty() {
		bail!("invalid --set value `{pair}`, key is empty");
	}
	let value = match serde_yaml_with_quirks::from_str::<serde_json::Value>(raw) {
		Ok(value @ (serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => value,
		_ => serde_json::Value::String(raw.to_string()),
	};
	Ok((key.to_string(), value))
}

/// Where to reach Rancher and how to authenticate.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
	/// Rancher server URL, without the /v3 suffix
	#[arg(long, env = "RANCHER_URL")]
	pub url: Option<String>,

	/// Bearer token
	#[arg(long, env = "RANCHER_TOKEN", hide_env_values = true)]
	pub token: Option<String>,

	/// API access key, used together with --secret-key
	#[arg(long, env = "RANCHER_ACCESS_KEY")]
	pub access_key: Option<String>,

	/// API secret key
	#[arg(long, env = "RANCHER_SECRET_KEY", hide_env_values = true)]
	pub secret_key: Option<String>,
}

impl From<&ConnectionArgs> for ConnectionOverrides {
	fn from(args: &ConnectionArgs) -> Self {
		ConnectionOverrides {
			url: args.url.clone(),
			token: args.token.clone(),
			access_key: args.access_key.clone(),
			secret_key: args.secret_key.clone(),
		}
	}
}

/// A descriptor ready to converge, with the config found next to it.
#[derive(Debug)]
pub struct LoadedDescriptor {
	pub path: PathBuf,
	pub descriptor: Descriptor,
	pub config: RanchsyncConfig,
}

fn read_descriptor(path: &Path, values: &TemplateValues) -> Result<Descriptor> {
	let bytes =
		fs::read(path).with_context(|| format!("failed to read descriptor: {}", path.display()))?;
	descriptor::parse(&bytes, values)
		.with_context(|| format!("failed to parse descriptor: {}", path.display()))
}

/// Read, render and parse a descriptor, merging it into `parent` when given.
///
/// The config file is looked up from the descriptor's directory; its values
/// apply to the parent too.
pub fn load_descriptor(
	path: &Path,
	parent: Option<&Path>,
	values: &ValuesArgs,
) -> Result<LoadedDescriptor> {
	let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
	let config = RanchsyncConfig::load_from_directory(dir)?.unwrap_or_default();
	let values = values.resolve(&config.values)?;

	let mut descriptor = read_descriptor(path, &values)?;
	if let Some(parent_path) = parent {
		let parent = read_descriptor(parent_path, &values)?;
		descriptor = merge::merge(&descriptor, &parent).with_context(|| {
			format!(
				"failed to merge {} into {}",
				path.display(),
				parent_path.display()
			)
		})?;
	}

	Ok(LoadedDescriptor {
		path: path.to_path_buf(),
		descriptor,
		config,
	})
}

/// A writer wrapper that silently handles broken pipe errors.
///
/// When the underlying writer returns a broken pipe error (EPIPE), this wrapper
/// converts it to a successful write. This allows commands to exit cleanly when
/// output is piped to a process that closes early (e.g., `ranchsync show x.yaml | head -1`).
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use rstest::rstest;
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;
	use crate::{config::CONFIG_FILE_NAME, test_utils::BrokenPipeWriter};

	#[test]
	fn test_broken_pipe_is_swallowed() {
		let mut guard = BrokenPipeGuard::new(BrokenPipeWriter);
		assert_eq!(guard.write(b"hello").unwrap(), 5);
		guard.flush().unwrap();
	}

	#[rstest]
	#[case("replicas=3", "replicas", json!(3))]
	#[case("debug=true", "debug", json!(true))]
	#[case("cluster=prod", "cluster", json!("prod"))]
	#[case("url=https://a=b", "url", json!("https://a=b"))]
	#[case("empty=", "empty", json!(""))]
	fn test_parse_set(#[case] pair: &str, #[case] key: &str, #[case] value: serde_json::Value) {
		assert_eq!(parse_set(pair).unwrap(), (key.to_string(), value));
	}

	#[rstest]
	#[case("novalue")]
	#[case("=value")]
	fn test_parse_set_rejects(#[case] pair: &str) {
		assert!(parse_set(pair).is_err());
	}

	#[test]
	fn test_values_layering() {
		let temp = TempDir::new().unwrap();
		let file = temp.path().join("values.yaml");
		fs::write(&file, "cluster: staging\nreplicas: 2\n").unwrap();

		let base = TemplateValues::from([
			("cluster".to_string(), json!("prod")),
			("team".to_string(), json!("payments")),
		]);
		let args = ValuesArgs {
			files: vec![file],
			set: vec!["replicas=5".to_string()],
		};

		let values = args.resolve(&base).unwrap();
		assert_eq!(values["cluster"], "staging");
		assert_eq!(values["team"], "payments");
		assert_eq!(values["replicas"], 5);
	}

	#[test]
	fn test_load_descriptor_uses_config_values_and_parent() {
		let temp = TempDir::new().unwrap();
		fs::write(
			temp.path().join(CONFIG_FILE_NAME),
			"values:\n  cluster: prod\n",
		)
		.unwrap();
		let parent = temp.path().join("base.yaml");
		fs::write(
			&parent,
			indoc! {"
				kind: Project
				metadata:
				  clusterName: '{{ .cluster }}'
				spec:
				  namespaces:
				    - name: shared
			"},
		)
		.unwrap();
		let child = temp.path().join("payments.yaml");
		fs::write(
			&child,
			indoc! {"
				kind: Project
				metadata:
				  projectName: payments
				spec:
				  namespaces:
				    - name: payments
			"},
		)
		.unwrap();

		let loaded = load_descriptor(&child, Some(&parent), &ValuesArgs::default()).unwrap();
		let Descriptor::Project(project) = loaded.descriptor else {
			panic!("expected a project descriptor");
		};
		assert_eq!(project.metadata.cluster_name.as_deref(), Some("prod"));
		assert_eq!(project.metadata.project_name.as_deref(), Some("payments"));
		let names: Vec<_> = project.spec.namespaces.iter().map(|n| n.name.as_str()).collect();
		assert_eq!(names, vec!["shared", "payments"]);
	}

	#[test]
	fn test_load_descriptor_names_the_file_on_error() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("broken.yaml");
		fs::write(&path, "metadata: {}\n").unwrap();

		let err = load_descriptor(&path, None, &ValuesArgs::default()).unwrap_err();
		assert!(format!("{err:#}").contains("broken.yaml"));
		assert!(format!("{err:#}").contains("no `kind` field"));
	}
}
