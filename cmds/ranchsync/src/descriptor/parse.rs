//! Descriptor parsing: template rendering, kind check, structural decode.

use std::collections::{BTreeMap, HashMap};

use gtmpl::{Context, FuncError, Template, Value};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::instrument;

use super::{ClusterDescriptor, Descriptor, DescriptorKind, ProjectDescriptor, WorkloadDescriptor};

/// Values available to descriptor templates as `{{ .key }}`.
pub type TemplateValues = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ParseError {
	#[error("descriptor is not valid UTF-8")]
	Utf8(#[from] std::str::Utf8Error),

	#[error("rendering descriptor template: {0}")]
	Template(String),

	#[error("descriptor has no `kind` field")]
	MissingKind,

	#[error("unknown descriptor kind `{0}`")]
	UnknownKind(String),

	#[error("expected a {expected} descriptor, found kind `{found}`")]
	KindMismatch { expected: String, found: String },

	#[error("{kind} spec must be a mapping, found {found}")]
	WorkloadSpec { kind: String, found: &'static str },

	#[error("decoding {kind} descriptor")]
	Yaml {
		kind: String,
		#[source]
		source: serde_yaml_with_quirks::Error,
	},
}

#[derive(Deserialize)]
struct KindProbe {
	#[serde(default)]
	kind: Option<String>,
}

/// Template function `default`: the piped value unless it is empty.
///
/// `{{ .replicas | default "1" }}` receives `["1", .replicas]`, so arguments
/// are checked from the back.
fn tmpl_default(args: &[Value]) -> Result<Value, FuncError> {
	for arg in args.iter().rev() {
		if !is_empty_value(arg) {
			return Ok(arg.clone());
		}
	}
	Ok(args.first().cloned().unwrap_or(Value::NoValue))
}

fn is_empty_value(v: &Value) -> bool {
	match v {
		Value::NoValue | Value::Nil => true,
		Value::Bool(b) => !b,
		Value::String(s) => s.is_empty(),
		Value::Array(a) => a.is_empty(),
		Value::Map(m) => m.is_empty(),
		_ => false,
	}
}

fn json_to_gtmpl(value: &serde_json::Value) -> Value {
	match value {
		serde_json::Value::Null => Value::Nil,
		serde_json::Value::Bool(b) => Value::Bool(*b),
		serde_json::Value::Number(n) => {
			if let Some(i) = n.as_i64() {
				Value::Number(i.into())
			} else if let Some(f) = n.as_f64() {
				Value::Number(f.into())
			} else {
				Value::Nil
			}
		}
		serde_json::Value::String(s) => Value::String(s.clone()),
		serde_json::Value::Array(arr) => Value::Array(arr.iter().map(json_to_gtmpl).collect()),
		serde_json::Value::Object(obj) => Value::Map(
			obj.iter()
				.map(|(k, v)| (k.clone(), json_to_gtmpl(v)))
				.collect(),
		),
	}
}

/// Render template actions in a descriptor.
///
/// Text without `{{` is returned untouched.
pub fn render(text: &str, values: &TemplateValues) -> Result<String, ParseError> {
	if !text.contains("{{") {
		return Ok(text.to_string());
	}

	let mut tmpl = Template::default();
	tmpl.add_func("default", tmpl_default);
	tmpl.parse(text)
		.map_err(|e| ParseError::Template(format!("{:?}", e)))?;

	let context: HashMap<String, Value> = values
		.iter()
		.map(|(k, v)| (k.clone(), json_to_gtmpl(v)))
		.collect();
	tmpl.render(&Context::from(Value::Map(context)))
		.map_err(|e| ParseError::Template(format!("{:?}", e)))
}

fn probe_kind(text: &str) -> Result<DescriptorKind, ParseError> {
	let probe: KindProbe =
		serde_yaml_with_quirks::from_str(text).map_err(|source| ParseError::Yaml {
			kind: "descriptor".to_string(),
			source,
		})?;
	let kind = probe.kind.ok_or(ParseError::MissingKind)?;
	DescriptorKind::from_name(&kind).ok_or(ParseError::UnknownKind(kind))
}

fn decode<T: DeserializeOwned>(text: &str, kind: DescriptorKind) -> Result<T, ParseError> {
	serde_yaml_with_quirks::from_str(text).map_err(|source| ParseError::Yaml {
		kind: kind.to_string(),
		source,
	})
}

fn json_type(value: &serde_json::Value) -> &'static str {
	match value {
		serde_json::Value::Null => "null",
		serde_json::Value::Bool(_) => "a boolean",
		serde_json::Value::Number(_) => "a number",
		serde_json::Value::String(_) => "a string",
		serde_json::Value::Array(_) => "a list",
		serde_json::Value::Object(_) => "a mapping",
	}
}

/// Decode a workload descriptor. An absent spec is left for a parent to
/// fill; any other non-mapping spec is rejected.
fn decode_workload(text: &str, kind: DescriptorKind) -> Result<WorkloadDescriptor, ParseError> {
	let workload: WorkloadDescriptor = decode(text, kind)?;
	match &workload.spec {
		serde_json::Value::Null | serde_json::Value::Object(_) => Ok(workload),
		other => Err(ParseError::WorkloadSpec {
			kind: kind.to_string(),
			found: json_type(other),
		}),
	}
}

fn rendered(bytes: &[u8], values: &TemplateValues) -> Result<String, ParseError> {
	render(std::str::from_utf8(bytes)?, values)
}

/// Parse any descriptor, dispatching on its `kind`.
#[instrument(skip_all, fields(len = bytes.len()))]
pub fn parse(bytes: &[u8], values: &TemplateValues) -> Result<Descriptor, ParseError> {
	let text = rendered(bytes, values)?;
	let kind = probe_kind(&text)?;
	tracing::debug!(%kind, "parsing descriptor");

	Ok(match kind {
		DescriptorKind::Cluster => Descriptor::Cluster(decode(&text, kind)?),
		DescriptorKind::Project => Descriptor::Project(decode(&text, kind)?),
		_ => Descriptor::Workload(decode_workload(&text, kind)?),
	})
}

fn expect_kind(
	text: &str,
	accepts: impl Fn(DescriptorKind) -> bool,
	expected: &str,
) -> Result<DescriptorKind, ParseError> {
	let found = match probe_kind(text) {
		Ok(kind) => kind,
		Err(ParseError::UnknownKind(found)) => {
			return Err(ParseError::KindMismatch {
				expected: expected.to_string(),
				found,
			})
		}
		Err(e) => return Err(e),
	};
	if accepts(found) {
		Ok(found)
	} else {
		Err(ParseError::KindMismatch {
			expected: expected.to_string(),
			found: found.to_string(),
		})
	}
}

pub fn parse_cluster(
	bytes: &[u8],
	values: &TemplateValues,
) -> Result<ClusterDescriptor, ParseError> {
	let text = rendered(bytes, values)?;
	let kind = expect_kind(&text, |k| k == DescriptorKind::Cluster, "Cluster")?;
	decode(&text, kind)
}

pub fn parse_project(
	bytes: &[u8],
	values: &TemplateValues,
) -> Result<ProjectDescriptor, ParseError> {
	let text = rendered(bytes, values)?;
	let kind = expect_kind(&text, |k| k == DescriptorKind::Project, "Project")?;
	decode(&text, kind)
}

pub fn parse_workload(
	bytes: &[u8],
	values: &TemplateValues,
) -> Result<WorkloadDescriptor, ParseError> {
	let text = rendered(bytes, values)?;
	let kind = expect_kind(&text, |k| k.workload().is_some(), "workload")?;
	decode_workload(&text, kind)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;
	use rstest::rstest;
	use serde_json::json;

	use super::*;
	use crate::descriptor::WorkloadKind;

	const PROJECT: &str = indoc! {"
		apiVersion: ranchsync.io/v1
		kind: Project
		metadata:
		  clusterName: prod
		  projectName: payments
		  namespace: payments
		spec:
		  namespaces:
		    - name: payments
		  configMaps:
		    - name: settings
		      data:
		        LOG_LEVEL: info
		  apps:
		    - name: redis
		      targetNamespace: payments
		      catalog: library
		      template: redis
		      version: 10.5.7
	"};

	#[test]
	fn test_parse_project() {
		let descriptor = parse(PROJECT.as_bytes(), &TemplateValues::new()).unwrap();
		let project = assert_matches!(descriptor, Descriptor::Project(p) => p);
		assert_eq!(project.metadata.cluster_name.as_deref(), Some("prod"));
		assert_eq!(project.project_name(), Some("payments"));
		assert_eq!(project.spec.namespaces[0].name, "payments");
		assert_eq!(project.spec.config_maps[0].data["LOG_LEVEL"], "info");
		assert_eq!(project.spec.apps[0].version, "10.5.7");
	}

	#[test]
	fn test_parse_renders_template_values() {
		let text = indoc! {"
			kind: Project
			metadata:
			  clusterName: {{ .cluster }}
			  projectName: {{ .project | default \"fallback\" }}
		"};
		let values = TemplateValues::from([("cluster".to_string(), json!("staging"))]);

		let project = parse_project(text.as_bytes(), &values).unwrap();
		assert_eq!(project.metadata.cluster_name.as_deref(), Some("staging"));
		assert_eq!(project.metadata.project_name.as_deref(), Some("fallback"));
	}

	#[rstest]
	#[case::job("Job", WorkloadKind::Job)]
	#[case::cron_job("CronJob", WorkloadKind::CronJob)]
	#[case::deployment("Deployment", WorkloadKind::Deployment)]
	#[case::daemon_set("DaemonSet", WorkloadKind::DaemonSet)]
	#[case::stateful_set("StatefulSet", WorkloadKind::StatefulSet)]
	fn test_parse_workload_kinds(#[case] kind: &str, #[case] expected: WorkloadKind) {
		let text = format!(
			"kind: {kind}\nmetadata:\n  name: worker\n  namespace: jobs\nspec:\n  containers: []\n"
		);
		let workload = parse_workload(text.as_bytes(), &TemplateValues::new()).unwrap();
		assert_eq!(workload.kind, expected);
		assert_eq!(workload.metadata.name.as_deref(), Some("worker"));
		assert_eq!(workload.spec, json!({"containers": []}));
	}

	#[rstest]
	#[case::list("spec:\n  - name: web\n", "a list")]
	#[case::scalar("spec: web\n", "a string")]
	#[case::number("spec: 3\n", "a number")]
	fn test_parse_workload_rejects_non_mapping_spec(#[case] spec: &str, #[case] expected: &str) {
		let text = format!("kind: Deployment\nmetadata:\n  name: web\n{spec}");
		assert_matches!(
			parse(text.as_bytes(), &TemplateValues::new()),
			Err(ParseError::WorkloadSpec { kind, found }) if kind == "Deployment" && found == expected
		);
		assert_matches!(
			parse_workload(text.as_bytes(), &TemplateValues::new()),
			Err(ParseError::WorkloadSpec { .. })
		);
	}

	#[test]
	fn test_parse_workload_without_spec_is_left_for_merge() {
		let text = "kind: Job\nmetadata:\n  name: migrate\n";
		let workload = parse_workload(text.as_bytes(), &TemplateValues::new()).unwrap();
		assert!(workload.spec.is_null());
	}

	#[test]
	fn test_parse_project_rejects_other_kind() {
		let text = "kind: Cluster\nmetadata:\n  clusterName: prod\n";
		assert_matches!(
			parse_project(text.as_bytes(), &TemplateValues::new()),
			Err(ParseError::KindMismatch { expected, found }) if expected == "Project" && found == "Cluster"
		);
	}

	#[test]
	fn test_parse_workload_rejects_project() {
		assert_matches!(
			parse_workload(PROJECT.as_bytes(), &TemplateValues::new()),
			Err(ParseError::KindMismatch { found, .. }) if found == "Project"
		);
	}

	#[test]
	fn test_parse_missing_kind() {
		let text = "metadata:\n  clusterName: prod\n";
		assert_matches!(
			parse(text.as_bytes(), &TemplateValues::new()),
			Err(ParseError::MissingKind)
		);
	}

	#[test]
	fn test_parse_unknown_kind() {
		let text = "kind: Pod\n";
		assert_matches!(
			parse(text.as_bytes(), &TemplateValues::new()),
			Err(ParseError::UnknownKind(kind)) if kind == "Pod"
		);
	}

	#[test]
	fn test_parse_structural_error_names_kind() {
		let text = "kind: Cluster\nspec:\n  storageClasses: not-a-list\n";
		assert_matches!(
			parse(text.as_bytes(), &TemplateValues::new()),
			Err(ParseError::Yaml { kind, .. }) if kind == "Cluster"
		);
	}

	#[test]
	fn test_render_without_actions_is_identity() {
		let text = "kind: Cluster\n";
		assert_eq!(render(text, &TemplateValues::new()).unwrap(), text);
	}

	#[test]
	fn test_render_reports_template_errors() {
		assert_matches!(
			render("kind: {{ .kind ", &TemplateValues::new()),
			Err(ParseError::Template(_))
		);
	}
}
