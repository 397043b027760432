//! Resource Client Interface.
//!
//! The engine only knows, per resource kind, how to ask whether a named
//! object exists in the current scope, how to create it and (for some kinds)
//! how to update it. [`Session`] is the implementation backed by the remote
//! API; tests substitute their own.

mod resources;
mod session;

use std::fmt;

use async_trait::async_trait;
pub use session::{ConnectionSettings, Session};
use thiserror::Error;

use crate::{
	api::ApiError,
	descriptor::{
		App, Certificate, ConfigMap, DockerCredential, Named, Namespace, PersistentVolume,
		ProjectSpec, Secret, StorageClass, Workload,
	},
};

/// Remote resource kinds the engine addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
	Cluster,
	Project,
	Namespace,
	ConfigMap,
	Secret,
	DockerCredential,
	Certificate,
	StorageClass,
	PersistentVolume,
	App,
	Job,
	CronJob,
	Deployment,
	DaemonSet,
	StatefulSet,
}

impl ResourceKind {
	/// Collection name relative to the scoped endpoint.
	pub fn collection(self) -> &'static str {
		match self {
			ResourceKind::Cluster => "clusters",
			ResourceKind::Project => "projects",
			ResourceKind::Namespace => "namespaces",
			ResourceKind::ConfigMap => "configMaps",
			ResourceKind::Secret => "namespacedSecrets",
			ResourceKind::DockerCredential => "namespacedDockerCredentials",
			ResourceKind::Certificate => "namespacedCertificates",
			ResourceKind::StorageClass => "storageClasses",
			ResourceKind::PersistentVolume => "persistentVolumes",
			ResourceKind::App => "apps",
			ResourceKind::Job => "jobs",
			ResourceKind::CronJob => "cronJobs",
			ResourceKind::Deployment => "deployments",
			ResourceKind::DaemonSet => "daemonSets",
			ResourceKind::StatefulSet => "statefulSets",
		}
	}

	/// Value of the `type` field on create.
	pub fn wire_type(self) -> &'static str {
		match self {
			ResourceKind::Cluster => "cluster",
			ResourceKind::Project => "project",
			ResourceKind::Namespace => "namespace",
			ResourceKind::ConfigMap => "configMap",
			ResourceKind::Secret => "namespacedSecret",
			ResourceKind::DockerCredential => "namespacedDockerCredential",
			ResourceKind::Certificate => "namespacedCertificate",
			ResourceKind::StorageClass => "storageClass",
			ResourceKind::PersistentVolume => "persistentVolume",
			ResourceKind::App => "app",
			ResourceKind::Job => "job",
			ResourceKind::CronJob => "cronJob",
			ResourceKind::Deployment => "deployment",
			ResourceKind::DaemonSet => "daemonSet",
			ResourceKind::StatefulSet => "statefulSet",
		}
	}
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// What convergence does with an entry that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExists {
	/// Existing means converged.
	Keep,
	/// Call [`ResourceClient::update`]; the client decides whether anything
	/// changed.
	Update,
	/// Never touched automatically. A warning asks for manual removal so the
	/// next run can re-create it.
	RequireManual,
}

/// A desired entry the engine can converge.
pub trait Resource: Named + Send + Sync {
	fn kind(&self) -> ResourceKind;

	fn on_exists(&self) -> OnExists {
		OnExists::Keep
	}
}

#[derive(Debug, Error)]
pub enum ClientError {
	#[error("looking up {kind} `{name}`")]
	Lookup {
		kind: ResourceKind,
		name: String,
		#[source]
		source: ApiError,
	},

	#[error("creating {kind} `{name}`")]
	Create {
		kind: ResourceKind,
		name: String,
		#[source]
		source: ApiError,
	},

	#[error("updating {kind} `{name}`")]
	Update {
		kind: ResourceKind,
		name: String,
		#[source]
		source: ApiError,
	},

	#[error("{kind} `{name}` disappeared before it could be updated")]
	NotFound { kind: ResourceKind, name: String },

	#[error("{kind} `{name}` returned by the API has no id")]
	MissingId { kind: ResourceKind, name: String },

	#[error("namespace `{0}` not found in the selected cluster")]
	NamespaceNotFound(String),

	#[error("{kind} `{name}` names no namespace and the descriptor sets no default")]
	MissingNamespace { kind: ResourceKind, name: String },

	#[error("no cluster selected")]
	NoClusterSelected,

	#[error("no project selected")]
	NoProjectSelected,

	#[error("{kind} `{name}` cannot be updated in place")]
	UpdateUnsupported { kind: ResourceKind, name: String },

	#[error("connecting to {endpoint}")]
	Connect {
		endpoint: String,
		#[source]
		source: ApiError,
	},

	#[error("fingerprinting {kind} `{name}`")]
	Fingerprint {
		kind: ResourceKind,
		name: String,
		#[source]
		source: serde_json::Error,
	},
}

/// has/create/update over one resource kind in the current scope.
#[async_trait]
pub trait ResourceClient<R: Resource>: Send {
	/// Whether an object named like `desired` exists in scope.
	async fn has(&mut self, desired: &R) -> Result<bool, ClientError>;

	async fn create(&mut self, desired: &R) -> Result<(), ClientError>;

	/// Bring an existing object in line with `desired`. Only valid after a
	/// positive [`has`](Self::has).
	async fn update(&mut self, desired: &R) -> Result<(), ClientError> {
		Err(ClientError::UpdateUnsupported {
			kind: desired.kind(),
			name: desired.name().to_string(),
		})
	}
}

/// Cluster and project selection.
#[async_trait]
pub trait ContextClient: Send {
	fn cluster_id(&self) -> Option<&str>;

	fn project_id(&self) -> Option<&str>;

	async fn find_cluster(&mut self, name: &str) -> Result<Option<String>, ClientError>;

	async fn select_cluster(&mut self, id: &str) -> Result<(), ClientError>;

	/// Look a project up by name inside the selected cluster.
	async fn find_project(&mut self, name: &str) -> Result<Option<String>, ClientError>;

	/// Create a project in the selected cluster, returning its id.
	async fn create_project(&mut self, project: &ProjectSpec) -> Result<String, ClientError>;

	async fn select_project(&mut self, id: &str) -> Result<(), ClientError>;
}

/// Everything a descriptor converger may ask of its client.
pub trait RancherClient:
	ContextClient
	+ ResourceClient<Namespace>
	+ ResourceClient<ConfigMap>
	+ ResourceClient<Secret>
	+ ResourceClient<DockerCredential>
	+ ResourceClient<Certificate>
	+ ResourceClient<StorageClass>
	+ ResourceClient<PersistentVolume>
	+ ResourceClient<App>
	+ ResourceClient<Workload>
{
}

impl<T> RancherClient for T where
	T: ContextClient
		+ ResourceClient<Namespace>
		+ ResourceClient<ConfigMap>
		+ ResourceClient<Secret>
		+ ResourceClient<DockerCredential>
		+ ResourceClient<Certificate>
		+ ResourceClient<StorageClass>
		+ ResourceClient<PersistentVolume>
		+ ResourceClient<App>
		+ ResourceClient<Workload>
{
}
