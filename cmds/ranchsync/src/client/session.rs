//! Remote session: scoped sub-clients and lookup caches for one run.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::json;

use super::{ClientError, ContextClient, ResourceKind};
use crate::{
	api::{
		cluster_endpoint, management_endpoint, project_endpoint, ApiClient, ClientFactory,
		Credentials, ListFilter, RemoteObject,
	},
	descriptor::ProjectSpec,
};

/// Where to reach the API and how to authenticate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
	/// Server URL without the `/v3` suffix.
	pub url: String,
	pub credentials: Credentials,
}

/// Endpoint a remote call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Scope {
	Cluster,
	Project,
}

/// A selected cluster or project with its sub-client.
struct Scoped {
	id: String,
	api: Arc<dyn ApiClient>,
}

pub(super) type NamespacedCache = HashMap<(String, String), RemoteObject>;

/// Objects seen by a positive `has`, keyed by name (and namespace name for
/// namespaced kinds). Entries are written once and never refreshed.
#[derive(Default)]
pub(super) struct LookupCache {
	pub(super) namespaces: HashMap<String, RemoteObject>,
	pub(super) config_maps: NamespacedCache,
	pub(super) docker_credentials: NamespacedCache,
	pub(super) apps: HashMap<String, RemoteObject>,
}

impl LookupCache {
	fn clear(&mut self) {
		*self = Self::default();
	}

	/// Namespace entries go too: the next project may live elsewhere.
	fn clear_project(&mut self) {
		self.namespaces.clear();
		self.config_maps.clear();
		self.docker_credentials.clear();
		self.apps.clear();
	}
}

/// Remote state of one run.
///
/// Owns the management client, the currently selected cluster and project
/// sub-clients, and the lookup cache. Sub-clients are built on selection by
/// the injected [`ClientFactory`].
pub struct Session {
	settings: ConnectionSettings,
	factory: Arc<dyn ClientFactory>,
	management: Arc<dyn ApiClient>,
	cluster: Option<Scoped>,
	project: Option<Scoped>,
	pub(super) cache: LookupCache,
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("url", &self.settings.url)
			.field("cluster", &self.cluster.as_ref().map(|c| &c.id))
			.field("project", &self.project.as_ref().map(|p| &p.id))
			.finish_non_exhaustive()
	}
}

impl Session {
	pub fn connect(
		settings: ConnectionSettings,
		factory: Arc<dyn ClientFactory>,
	) -> Result<Self, ClientError> {
		let endpoint = management_endpoint(&settings.url);
		let management = factory
			.connect(&endpoint, &settings.credentials)
			.map_err(|source| ClientError::Connect { endpoint, source })?;
		Ok(Self {
			settings,
			factory,
			management,
			cluster: None,
			project: None,
			cache: LookupCache::default(),
		})
	}

	fn scoped(&self, endpoint: String, id: &str) -> Result<Scoped, ClientError> {
		let api = self
			.factory
			.connect(&endpoint, &self.settings.credentials)
			.map_err(|source| ClientError::Connect { endpoint, source })?;
		Ok(Scoped {
			id: id.to_string(),
			api,
		})
	}

	fn selected_cluster(&self) -> Result<&Scoped, ClientError> {
		self.cluster.as_ref().ok_or(ClientError::NoClusterSelected)
	}

	fn selected_project(&self) -> Result<&Scoped, ClientError> {
		self.project.as_ref().ok_or(ClientError::NoProjectSelected)
	}

	pub(super) fn require_project_id(&self) -> Result<String, ClientError> {
		Ok(self.selected_project()?.id.clone())
	}

	pub(super) fn api(&self, scope: Scope) -> Result<Arc<dyn ApiClient>, ClientError> {
		let scoped = match scope {
			Scope::Cluster => self.selected_cluster()?,
			Scope::Project => self.selected_project()?,
		};
		Ok(Arc::clone(&scoped.api))
	}

	/// List `kind` in `scope` and pick the object with exactly `name`.
	pub(super) async fn lookup(
		&self,
		scope: Scope,
		kind: ResourceKind,
		name: &str,
		filter: ListFilter,
	) -> Result<Option<RemoteObject>, ClientError> {
		let api = self.api(scope)?;
		let collection = api
			.list(kind.collection(), &filter)
			.await
			.map_err(|source| ClientError::Lookup {
				kind,
				name: name.to_string(),
				source,
			})?;
		Ok(collection.find(name))
	}

	pub(super) async fn insert(
		&self,
		scope: Scope,
		kind: ResourceKind,
		name: &str,
		body: serde_json::Value,
	) -> Result<RemoteObject, ClientError> {
		let api = self.api(scope)?;
		api.create(kind.collection(), &body)
			.await
			.map_err(|source| ClientError::Create {
				kind,
				name: name.to_string(),
				source,
			})
	}

	pub(super) async fn replace(
		&self,
		scope: Scope,
		kind: ResourceKind,
		existing: &RemoteObject,
	) -> Result<RemoteObject, ClientError> {
		let id = existing.id().ok_or_else(|| ClientError::MissingId {
			kind,
			name: existing.name.clone(),
		})?;
		let api = self.api(scope)?;
		api.replace(kind.collection(), id, &existing.to_value())
			.await
			.map_err(|source| ClientError::Update {
				kind,
				name: existing.name.clone(),
				source,
			})
	}

	/// Namespace object for `name` in the selected cluster, filling the cache
	/// on a hit.
	pub(super) async fn find_namespace(
		&mut self,
		name: &str,
	) -> Result<Option<RemoteObject>, ClientError> {
		if let Some(cached) = self.cache.namespaces.get(name) {
			return Ok(Some(cached.clone()));
		}
		let found = self
			.lookup(
				Scope::Cluster,
				ResourceKind::Namespace,
				name,
				ListFilter::by_name(name),
			)
			.await?;
		if let Some(object) = &found {
			self.cache
				.namespaces
				.entry(name.to_string())
				.or_insert_with(|| object.clone());
		}
		Ok(found)
	}

	/// Remote id of the namespace a namespaced entry lives in.
	pub(super) async fn namespace_id(
		&mut self,
		kind: ResourceKind,
		entry: &str,
		namespace: Option<&str>,
	) -> Result<String, ClientError> {
		let namespace = namespace.ok_or_else(|| ClientError::MissingNamespace {
			kind,
			name: entry.to_string(),
		})?;
		let object = self
			.find_namespace(namespace)
			.await?
			.ok_or_else(|| ClientError::NamespaceNotFound(namespace.to_string()))?;
		let id = object.id().ok_or_else(|| ClientError::MissingId {
			kind: ResourceKind::Namespace,
			name: namespace.to_string(),
		})?;
		Ok(id.to_string())
	}
}

fn object_id(kind: ResourceKind, object: RemoteObject) -> Result<String, ClientError> {
	object.id.ok_or(ClientError::MissingId {
		kind,
		name: object.name,
	})
}

#[async_trait]
impl ContextClient for Session {
	fn cluster_id(&self) -> Option<&str> {
		self.cluster.as_ref().map(|c| c.id.as_str())
	}

	fn project_id(&self) -> Option<&str> {
		self.project.as_ref().map(|p| p.id.as_str())
	}

	async fn find_cluster(&mut self, name: &str) -> Result<Option<String>, ClientError> {
		let kind = ResourceKind::Cluster;
		let collection = self
			.management
			.list(kind.collection(), &ListFilter::by_name(name))
			.await
			.map_err(|source| ClientError::Lookup {
				kind,
				name: name.to_string(),
				source,
			})?;
		collection
			.find(name)
			.map(|object| object_id(kind, object))
			.transpose()
	}

	async fn select_cluster(&mut self, id: &str) -> Result<(), ClientError> {
		let scoped = self.scoped(cluster_endpoint(&self.settings.url, id), id)?;
		tracing::debug!(cluster = %id, endpoint = %scoped.api.endpoint(), "selected cluster");
		self.cluster = Some(scoped);
		self.project = None;
		self.cache.clear();
		Ok(())
	}

	async fn find_project(&mut self, name: &str) -> Result<Option<String>, ClientError> {
		let kind = ResourceKind::Project;
		let cluster_id = self.selected_cluster()?.id.clone();
		let collection = self
			.management
			.list(
				kind.collection(),
				&ListFilter::by_name(name).in_cluster(&cluster_id),
			)
			.await
			.map_err(|source| ClientError::Lookup {
				kind,
				name: name.to_string(),
				source,
			})?;
		collection
			.find(name)
			.map(|object| object_id(kind, object))
			.transpose()
	}

	async fn create_project(&mut self, project: &ProjectSpec) -> Result<String, ClientError> {
		let kind = ResourceKind::Project;
		let cluster_id = self.selected_cluster()?.id.clone();
		let mut body = json!({
			"type": kind.wire_type(),
			"name": project.name,
			"clusterId": cluster_id,
		});
		if let Some(description) = &project.description {
			body["description"] = json!(description);
		}
		let created = self
			.management
			.create(kind.collection(), &body)
			.await
			.map_err(|source| ClientError::Create {
				kind,
				name: project.name.clone(),
				source,
			})?;
		object_id(kind, created)
	}

	async fn select_project(&mut self, id: &str) -> Result<(), ClientError> {
		let scoped = self.scoped(project_endpoint(&self.settings.url, id), id)?;
		tracing::debug!(project = %id, endpoint = %scoped.api.endpoint(), "selected project");
		self.project = Some(scoped);
		self.cache.clear_project();
		Ok(())
	}
}
