//! Configuration file support for ranchsync
//!
//! Supports `.ranchsync.yaml` files that can be placed anywhere in the directory
//! hierarchy. ranchsync searches from the descriptor's directory upward to the
//! filesystem root.

use std::{
	fmt, fs,
	path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::{
	api::Credentials,
	client::ConnectionSettings,
	descriptor::{Metadata, TemplateValues},
};

/// The name of the config file ranchsync looks for
pub const CONFIG_FILE_NAME: &str = ".ranchsync.yaml";

/// Root configuration structure for .ranchsync.yaml
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RanchsyncConfig {
	/// Rancher server URL, without the `/v3` suffix
	#[serde(default)]
	pub rancher_url: Option<String>,

	#[serde(default)]
	pub token: Option<String>,

	#[serde(default)]
	pub access_key: Option<String>,

	#[serde(default)]
	pub secret_key: Option<String>,

	/// Template values, overridden by `--values` files and `--set`
	#[serde(default)]
	pub values: TemplateValues,
}

impl fmt::Debug for RanchsyncConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RanchsyncConfig")
			.field("rancher_url", &self.rancher_url)
			.field("access_key", &self.access_key)
			.field("values", &self.values)
			.finish_non_exhaustive()
	}
}

impl RanchsyncConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		if let Some(config_path) = find_config_file(start_dir) {
			tracing::debug!(path = %config_path.display(), "loading config file");
			let config = Self::load_from_file(&config_path)?;
			Ok(Some(config))
		} else {
			Ok(None)
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let config: RanchsyncConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		Ok(config)
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let mut current = start_dir.to_path_buf();

	if let Ok(canonical) = current.canonicalize() {
		current = canonical;
	}

	loop {
		let config_path = current.join(CONFIG_FILE_NAME);
		if config_path.exists() {
			return Some(config_path);
		}

		match current.parent() {
			Some(parent) if parent != current => current = parent.to_path_buf(),
			_ => break,
		}
	}

	None
}

/// Connection settings given on the command line or through the environment.
#[derive(Clone, Default)]
pub struct ConnectionOverrides {
	pub url: Option<String>,
	pub token: Option<String>,
	pub access_key: Option<String>,
	pub secret_key: Option<String>,
}

/// One source of connection settings, highest precedence first.
struct Layer<'a> {
	url: Option<&'a str>,
	token: Option<&'a str>,
	access_key: Option<&'a str>,
	secret_key: Option<&'a str>,
}

fn first<'a>(
	layers: &[Layer<'a>],
	pick: impl Fn(&Layer<'a>) -> Option<&'a str>,
) -> Option<&'a str> {
	layers.iter().find_map(|layer| pick(layer).filter(|v| !v.is_empty()))
}

/// Resolve where to connect and how to authenticate.
///
/// Each setting comes from the first source that sets it: flags and
/// environment, then descriptor metadata, then the config file. A token wins
/// over an access/secret key pair.
pub fn resolve_connection(
	overrides: &ConnectionOverrides,
	metadata: &Metadata,
	config: &RanchsyncConfig,
) -> Result<ConnectionSettings> {
	let layers = [
		Layer {
			url: overrides.url.as_deref(),
			token: overrides.token.as_deref(),
			access_key: overrides.access_key.as_deref(),
			secret_key: overrides.secret_key.as_deref(),
		},
		Layer {
			url: metadata.rancher_url.as_deref(),
			token: metadata.token.as_deref(),
			access_key: metadata.access_key.as_deref(),
			secret_key: metadata.secret_key.as_deref(),
		},
		Layer {
			url: config.rancher_url.as_deref(),
			token: config.token.as_deref(),
			access_key: config.access_key.as_deref(),
			secret_key: config.secret_key.as_deref(),
		},
	];

	let Some(url) = first(&layers, |l| l.url) else {
		bail!(
			"no Rancher URL configured: pass --url, set RANCHER_URL, metadata.rancherUrl \
			 or rancherUrl in {CONFIG_FILE_NAME}"
		);
	};

	let credentials = match (
		first(&layers, |l| l.token),
		first(&layers, |l| l.access_key),
		first(&layers, |l| l.secret_key),
	) {
		(Some(token), _, _) => Credentials::Token(token.to_string()),
		(None, Some(access_key), Some(secret_key)) => Credentials::KeyPair {
			access_key: access_key.to_string(),
			secret_key: secret_key.to_string(),
		},
		(None, Some(_), None) => bail!("access key configured without a secret key"),
		(None, None, Some(_)) => bail!("secret key configured without an access key"),
		(None, None, None) => Credentials::Anonymous,
	};

	Ok(ConnectionSettings {
		url: url.to_string(),
		credentials,
	})
}
