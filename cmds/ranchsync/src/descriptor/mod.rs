//! Typed desired-state descriptors.
//!
//! A descriptor file holds exactly one top-level document whose `kind` is
//! one of [`DescriptorKind`]. Cluster and project descriptors carry lists of
//! named entries; workload descriptors carry an opaque body forwarded as-is.

mod parse;

use std::{collections::BTreeMap, fmt};

pub use parse::{
	parse, parse_cluster, parse_project, parse_workload, render, ParseError, TemplateValues,
};
use serde::{Deserialize, Serialize};

use crate::client::{OnExists, Resource, ResourceKind};

/// Default `apiVersion` written by `show` when a descriptor omits it.
pub const API_VERSION: &str = "ranchsync.io/v1";

fn default_api_version() -> String {
	API_VERSION.to_string()
}

/// Entries identified by a human-assigned name within their scope.
pub trait Named {
	fn name(&self) -> &str;
}

/// Entries that live inside a namespace.
pub trait Namespaced {
	fn namespace(&self) -> Option<&str>;

	/// Set the namespace if the entry does not name one itself.
	fn default_namespace(&mut self, namespace: &str);
}

/// Top-level descriptor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
	Cluster,
	Project,
	Job,
	CronJob,
	Deployment,
	DaemonSet,
	StatefulSet,
}

impl DescriptorKind {
	pub const ALL: [DescriptorKind; 7] = [
		DescriptorKind::Cluster,
		DescriptorKind::Project,
		DescriptorKind::Job,
		DescriptorKind::CronJob,
		DescriptorKind::Deployment,
		DescriptorKind::DaemonSet,
		DescriptorKind::StatefulSet,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			DescriptorKind::Cluster => "Cluster",
			DescriptorKind::Project => "Project",
			DescriptorKind::Job => "Job",
			DescriptorKind::CronJob => "CronJob",
			DescriptorKind::Deployment => "Deployment",
			DescriptorKind::DaemonSet => "DaemonSet",
			DescriptorKind::StatefulSet => "StatefulSet",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.as_str() == name)
	}

	pub fn workload(self) -> Option<WorkloadKind> {
		match self {
			DescriptorKind::Cluster | DescriptorKind::Project => None,
			DescriptorKind::Job => Some(WorkloadKind::Job),
			DescriptorKind::CronJob => Some(WorkloadKind::CronJob),
			DescriptorKind::Deployment => Some(WorkloadKind::Deployment),
			DescriptorKind::DaemonSet => Some(WorkloadKind::DaemonSet),
			DescriptorKind::StatefulSet => Some(WorkloadKind::StatefulSet),
		}
	}
}

impl fmt::Display for DescriptorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Workload kinds. None of them are updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
	Job,
	CronJob,
	Deployment,
	DaemonSet,
	StatefulSet,
}

impl WorkloadKind {
	pub fn resource_kind(self) -> ResourceKind {
		match self {
			WorkloadKind::Job => ResourceKind::Job,
			WorkloadKind::CronJob => ResourceKind::CronJob,
			WorkloadKind::Deployment => ResourceKind::Deployment,
			WorkloadKind::DaemonSet => ResourceKind::DaemonSet,
			WorkloadKind::StatefulSet => ResourceKind::StatefulSet,
		}
	}

	pub fn descriptor_kind(self) -> DescriptorKind {
		match self {
			WorkloadKind::Job => DescriptorKind::Job,
			WorkloadKind::CronJob => DescriptorKind::CronJob,
			WorkloadKind::Deployment => DescriptorKind::Deployment,
			WorkloadKind::DaemonSet => DescriptorKind::DaemonSet,
			WorkloadKind::StatefulSet => DescriptorKind::StatefulSet,
		}
	}
}

/// Scope references and access settings shared by every descriptor kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
	/// Descriptor name. Workload descriptors use it as the workload name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cluster_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cluster_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub project_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub project_id: Option<String>,
	/// Default namespace for namespaced entries that do not name one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rancher_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secret_key: Option<String>,
}

/// Any parsed descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Descriptor {
	Cluster(ClusterDescriptor),
	Project(ProjectDescriptor),
	Workload(WorkloadDescriptor),
}

impl Descriptor {
	pub fn kind(&self) -> DescriptorKind {
		match self {
			Descriptor::Cluster(_) => DescriptorKind::Cluster,
			Descriptor::Project(_) => DescriptorKind::Project,
			Descriptor::Workload(workload) => workload.kind.descriptor_kind(),
		}
	}

	pub fn metadata(&self) -> &Metadata {
		match self {
			Descriptor::Cluster(cluster) => &cluster.metadata,
			Descriptor::Project(project) => &project.metadata,
			Descriptor::Workload(workload) => &workload.metadata,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
	#[serde(default = "default_api_version")]
	pub api_version: String,
	pub kind: DescriptorKind,
	#[serde(default)]
	pub metadata: Metadata,
	#[serde(default)]
	pub spec: ClusterSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub storage_classes: Vec<StorageClass>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub persistent_volumes: Vec<PersistentVolume>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub projects: Vec<ProjectSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
	#[serde(default = "default_api_version")]
	pub api_version: String,
	pub kind: DescriptorKind,
	#[serde(default)]
	pub metadata: Metadata,
	#[serde(default)]
	pub spec: ProjectSpec,
}

impl ProjectDescriptor {
	/// `metadata.projectName`, falling back to `spec.name`.
	pub fn project_name(&self) -> Option<&str> {
		self.metadata
			.project_name
			.as_deref()
			.or(Some(self.spec.name.as_str()).filter(|name| !name.is_empty()))
	}
}

/// Project contents. Inside a cluster descriptor `name` is required; a
/// project descriptor may take it from `metadata.projectName` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Default namespace for this project's namespaced entries.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub namespaces: Vec<Namespace>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub certificates: Vec<Certificate>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub config_maps: Vec<ConfigMap>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub secrets: Vec<Secret>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub docker_credentials: Vec<DockerCredential>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub apps: Vec<App>,
}

impl Named for ProjectSpec {
	fn name(&self) -> &str {
		&self.name
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDescriptor {
	#[serde(default = "default_api_version")]
	pub api_version: String,
	pub kind: WorkloadKind,
	#[serde(default)]
	pub metadata: Metadata,
	/// Workload body in the API's shape. Must be a mapping once merged.
	#[serde(default)]
	pub spec: serde_json::Value,
}

/// Namespace attached to the selected project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
	pub name: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
	#[serde(default)]
	pub data: BTreeMap<String, String>,
}

/// Opaque secret. `data` holds plain-text values; they are base64 encoded
/// on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
	#[serde(default)]
	pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerCredential {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
	/// Registry host to login.
	#[serde(default)]
	pub registries: BTreeMap<String, RegistryLogin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryLogin {
	pub username: String,
	pub password: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
}

/// TLS certificate stored in a namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	pub certs: String,
	pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClass {
	pub name: String,
	pub provisioner: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub parameters: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reclaim_policy: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub volume_binding_mode: Option<String>,
	#[serde(default)]
	pub allow_volume_expansion: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolume {
	pub name: String,
	/// Storage quantity, e.g. `10Gi`.
	pub capacity: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub access_modes: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub storage_class_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reclaim_policy: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host_path: Option<HostPathVolume>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nfs: Option<NfsVolume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPathVolume {
	pub path: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfsVolume {
	pub server: String,
	pub path: String,
	#[serde(default)]
	pub read_only: bool,
}

/// Catalog app installed into the selected project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
	pub name: String,
	pub target_namespace: String,
	pub catalog: String,
	pub template: String,
	pub version: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub answers: BTreeMap<String, String>,
}

impl App {
	/// Catalog reference in the API's `externalId` form.
	pub fn external_id(&self) -> String {
		format!(
			"catalog://?catalog={}&template={}&version={}",
			self.catalog, self.template, self.version
		)
	}
}

/// A workload ready for convergence, built from a [`WorkloadDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workload {
	pub kind: WorkloadKind,
	pub name: String,
	pub namespace: Option<String>,
	pub body: serde_json::Map<String, serde_json::Value>,
}

macro_rules! named {
	($($ty:ty),* $(,)?) => {
		$(
			impl Named for $ty {
				fn name(&self) -> &str {
					&self.name
				}
			}
		)*
	};
}

named!(
	Namespace,
	ConfigMap,
	Secret,
	DockerCredential,
	Certificate,
	StorageClass,
	PersistentVolume,
	App,
	Workload,
);

macro_rules! namespaced {
	($($ty:ty),* $(,)?) => {
		$(
			impl Namespaced for $ty {
				fn namespace(&self) -> Option<&str> {
					self.namespace.as_deref()
				}

				fn default_namespace(&mut self, namespace: &str) {
					if self.namespace.is_none() {
						self.namespace = Some(namespace.to_string());
					}
				}
			}
		)*
	};
}

namespaced!(ConfigMap, Secret, DockerCredential, Certificate, Workload);

impl Resource for Namespace {
	fn kind(&self) -> ResourceKind {
		ResourceKind::Namespace
	}
}

impl Resource for ConfigMap {
	fn kind(&self) -> ResourceKind {
		ResourceKind::ConfigMap
	}

	fn on_exists(&self) -> OnExists {
		OnExists::Update
	}
}

impl Resource for Secret {
	fn kind(&self) -> ResourceKind {
		ResourceKind::Secret
	}

	fn on_exists(&self) -> OnExists {
		OnExists::Update
	}
}

impl Resource for DockerCredential {
	fn kind(&self) -> ResourceKind {
		ResourceKind::DockerCredential
	}

	fn on_exists(&self) -> OnExists {
		OnExists::Update
	}
}

impl Resource for Certificate {
	fn kind(&self) -> ResourceKind {
		ResourceKind::Certificate
	}
}

impl Resource for StorageClass {
	fn kind(&self) -> ResourceKind {
		ResourceKind::StorageClass
	}
}

impl Resource for PersistentVolume {
	fn kind(&self) -> ResourceKind {
		ResourceKind::PersistentVolume
	}
}

impl Resource for App {
	fn kind(&self) -> ResourceKind {
		ResourceKind::App
	}

	fn on_exists(&self) -> OnExists {
		OnExists::Update
	}
}

impl Resource for Workload {
	fn kind(&self) -> ResourceKind {
		self.kind.resource_kind()
	}

	fn on_exists(&self) -> OnExists {
		OnExists::RequireManual
	}
}
