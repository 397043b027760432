//! Per-kind `has`/`create`/`update` on [`Session`].
//!
//! Each kind maps its desired entry to the API's wire shape. Nothing here
//! mutates the desired entry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{
	session::{NamespacedCache, Scope, Session},
	ClientError, Resource, ResourceClient, ResourceKind,
};
use crate::{
	api::{ListFilter, RemoteObject},
	descriptor::{
		App, Certificate, ConfigMap, DockerCredential, Named, Namespace, Namespaced,
		PersistentVolume, Secret, StorageClass, Workload,
	},
	fingerprint::{self, FINGERPRINT_LABEL},
};

/// Skeleton shared by every created object.
fn wire_object(kind: ResourceKind, name: &str) -> Map<String, Value> {
	let mut body = Map::new();
	body.insert("type".to_string(), json!(kind.wire_type()));
	body.insert("name".to_string(), json!(name));
	body
}

fn fingerprint_of<R: Resource + Serialize>(desired: &R) -> Result<String, ClientError> {
	fingerprint::of(desired).map_err(|source| ClientError::Fingerprint {
		kind: desired.kind(),
		name: desired.name().to_string(),
		source,
	})
}

/// Desired labels plus the fingerprint label.
fn labels_with_fingerprint(
	labels: &BTreeMap<String, String>,
	fingerprint: &str,
) -> BTreeMap<String, String> {
	let mut labels = labels.clone();
	labels.insert(FINGERPRINT_LABEL.to_string(), fingerprint.to_string());
	labels
}

fn encode_data(data: &BTreeMap<String, String>) -> Map<String, Value> {
	data.iter()
		.map(|(k, v)| (k.clone(), json!(STANDARD.encode(v))))
		.collect()
}

fn registries(credential: &DockerCredential) -> Map<String, Value> {
	credential
		.registries
		.iter()
		.map(|(host, login)| {
			let mut entry = Map::new();
			entry.insert("username".to_string(), json!(login.username));
			entry.insert("password".to_string(), json!(login.password));
			if let Some(email) = &login.email {
				entry.insert("email".to_string(), json!(email));
			}
			(host.clone(), Value::Object(entry))
		})
		.collect()
}

/// Namespaced kinds that store a fingerprint label and are replaced when it
/// differs.
trait Fingerprinted: Resource + Namespaced + Serialize {
	fn labels(&self) -> &BTreeMap<String, String>;

	/// Mutable fields sent on create and on replace.
	fn payload(&self) -> Map<String, Value>;

	/// Where positive lookups are remembered, if anywhere.
	fn cache(session: &mut Session) -> Option<&mut NamespacedCache>;
}

impl Fingerprinted for ConfigMap {
	fn labels(&self) -> &BTreeMap<String, String> {
		&self.labels
	}

	fn payload(&self) -> Map<String, Value> {
		let data: Map<String, Value> = self
			.data
			.iter()
			.map(|(k, v)| (k.clone(), json!(v)))
			.collect();
		Map::from_iter([("data".to_string(), Value::Object(data))])
	}

	fn cache(session: &mut Session) -> Option<&mut NamespacedCache> {
		Some(&mut session.cache.config_maps)
	}
}

impl Fingerprinted for Secret {
	fn labels(&self) -> &BTreeMap<String, String> {
		&self.labels
	}

	fn payload(&self) -> Map<String, Value> {
		Map::from_iter([
			("kind".to_string(), json!("Opaque")),
			("data".to_string(), Value::Object(encode_data(&self.data))),
		])
	}

	fn cache(_: &mut Session) -> Option<&mut NamespacedCache> {
		None
	}
}

impl Fingerprinted for DockerCredential {
	fn labels(&self) -> &BTreeMap<String, String> {
		&self.labels
	}

	fn payload(&self) -> Map<String, Value> {
		Map::from_iter([(
			"registries".to_string(),
			Value::Object(registries(self)),
		)])
	}

	fn cache(session: &mut Session) -> Option<&mut NamespacedCache> {
		Some(&mut session.cache.docker_credentials)
	}
}

fn cache_key<R: Named + Namespaced>(desired: &R) -> (String, String) {
	(
		desired.namespace().unwrap_or_default().to_string(),
		desired.name().to_string(),
	)
}

impl Session {
	/// `has` for namespaced kinds living in the selected project.
	async fn has_namespaced<R>(
		&mut self,
		desired: &R,
		cached: impl Fn(&mut Session) -> Option<&mut NamespacedCache>,
	) -> Result<bool, ClientError>
	where
		R: Resource + Namespaced,
	{
		let kind = desired.kind();
		let key = cache_key(desired);
		if cached(self).is_some_and(|cache| cache.contains_key(&key)) {
			return Ok(true);
		}

		let namespace_id = self
			.namespace_id(kind, desired.name(), desired.namespace())
			.await?;
		let found = self
			.lookup(
				Scope::Project,
				kind,
				desired.name(),
				ListFilter::by_name(desired.name()).in_namespace(&namespace_id),
			)
			.await?;

		let Some(object) = found else {
			return Ok(false);
		};
		if let Some(cache) = cached(self) {
			cache.entry(key).or_insert(object);
		}
		Ok(true)
	}

	/// Create a namespaced object in the selected project.
	async fn create_namespaced<R>(
		&mut self,
		desired: &R,
		fields: Map<String, Value>,
	) -> Result<RemoteObject, ClientError>
	where
		R: Resource + Namespaced,
	{
		let kind = desired.kind();
		let namespace_id = self
			.namespace_id(kind, desired.name(), desired.namespace())
			.await?;
		let project_id = self.require_project_id()?;

		// Identity and scope fields override anything the body carries.
		let mut body = fields;
		body.extend(wire_object(kind, desired.name()));
		body.insert("namespaceId".to_string(), json!(namespace_id));
		body.insert("projectId".to_string(), json!(project_id));

		tracing::debug!(%kind, name = desired.name(), namespace = %namespace_id, "creating");
		self.insert(Scope::Project, kind, desired.name(), Value::Object(body))
			.await
	}

	/// Existing object for an update: cached if seen, otherwise a fresh
	/// lookup.
	async fn existing_namespaced<R>(
		&mut self,
		desired: &R,
		cached: Option<RemoteObject>,
	) -> Result<RemoteObject, ClientError>
	where
		R: Resource + Namespaced,
	{
		if let Some(object) = cached {
			return Ok(object);
		}
		let kind = desired.kind();
		let namespace_id = self
			.namespace_id(kind, desired.name(), desired.namespace())
			.await?;
		self.lookup(
			Scope::Project,
			kind,
			desired.name(),
			ListFilter::by_name(desired.name()).in_namespace(&namespace_id),
		)
		.await?
		.ok_or_else(|| ClientError::NotFound {
			kind,
			name: desired.name().to_string(),
		})
	}

	async fn has_fingerprinted<R: Fingerprinted>(
		&mut self,
		desired: &R,
	) -> Result<bool, ClientError> {
		self.has_namespaced(desired, R::cache).await
	}

	async fn create_fingerprinted<R: Fingerprinted>(
		&mut self,
		desired: &R,
	) -> Result<(), ClientError> {
		let fingerprint = fingerprint_of(desired)?;
		let mut fields = desired.payload();
		fields.insert(
			"labels".to_string(),
			json!(labels_with_fingerprint(desired.labels(), &fingerprint)),
		);
		self.create_namespaced(desired, fields).await?;
		Ok(())
	}

	async fn update_fingerprinted<R: Fingerprinted>(
		&mut self,
		desired: &R,
	) -> Result<(), ClientError> {
		let kind = desired.kind();
		let fingerprint = fingerprint_of(desired)?;
		let cached = R::cache(self).and_then(|cache| cache.get(&cache_key(desired)).cloned());
		let mut existing = self.existing_namespaced(desired, cached).await?;

		if fingerprint::matches(&existing.labels, &fingerprint) {
			tracing::debug!(%kind, name = desired.name(), "unchanged, skipping update");
			return Ok(());
		}

		existing.labels = labels_with_fingerprint(desired.labels(), &fingerprint);
		for (key, value) in desired.payload() {
			existing.set(&key, value);
		}
		tracing::debug!(%kind, name = desired.name(), "replacing");
		self.replace(Scope::Project, kind, &existing).await?;
		Ok(())
	}

	/// `has` for kinds living directly in the selected cluster.
	async fn has_in_cluster<R: Resource>(&mut self, desired: &R) -> Result<bool, ClientError> {
		let found = self
			.lookup(
				Scope::Cluster,
				desired.kind(),
				desired.name(),
				ListFilter::by_name(desired.name()),
			)
			.await?;
		Ok(found.is_some())
	}
}

#[async_trait]
impl ResourceClient<Namespace> for Session {
	async fn has(&mut self, desired: &Namespace) -> Result<bool, ClientError> {
		Ok(self.find_namespace(&desired.name).await?.is_some())
	}

	async fn create(&mut self, desired: &Namespace) -> Result<(), ClientError> {
		let kind = desired.kind();
		let project_id = self.require_project_id()?;
		let mut body = wire_object(kind, &desired.name);
		body.insert("projectId".to_string(), json!(project_id));
		if !desired.labels.is_empty() {
			body.insert("labels".to_string(), json!(desired.labels));
		}
		if !desired.annotations.is_empty() {
			body.insert("annotations".to_string(), json!(desired.annotations));
		}
		tracing::debug!(%kind, name = %desired.name, project = %project_id, "creating");
		self.insert(Scope::Cluster, kind, &desired.name, Value::Object(body))
			.await?;
		Ok(())
	}
}

#[async_trait]
impl ResourceClient<ConfigMap> for Session {
	async fn has(&mut self, desired: &ConfigMap) -> Result<bool, ClientError> {
		self.has_fingerprinted(desired).await
	}

	async fn create(&mut self, desired: &ConfigMap) -> Result<(), ClientError> {
		self.create_fingerprinted(desired).await
	}

	async fn update(&mut self, desired: &ConfigMap) -> Result<(), ClientError> {
		self.update_fingerprinted(desired).await
	}
}

#[async_trait]
impl ResourceClient<Secret> for Session {
	async fn has(&mut self, desired: &Secret) -> Result<bool, ClientError> {
		self.has_fingerprinted(desired).await
	}

	async fn create(&mut self, desired: &Secret) -> Result<(), ClientError> {
		self.create_fingerprinted(desired).await
	}

	async fn update(&mut self, desired: &Secret) -> Result<(), ClientError> {
		self.update_fingerprinted(desired).await
	}
}

#[async_trait]
impl ResourceClient<DockerCredential> for Session {
	async fn has(&mut self, desired: &DockerCredential) -> Result<bool, ClientError> {
		self.has_fingerprinted(desired).await
	}

	async fn create(&mut self, desired: &DockerCredential) -> Result<(), ClientError> {
		self.create_fingerprinted(desired).await
	}

	async fn update(&mut self, desired: &DockerCredential) -> Result<(), ClientError> {
		self.update_fingerprinted(desired).await
	}
}

#[async_trait]
impl ResourceClient<Certificate> for Session {
	async fn has(&mut self, desired: &Certificate) -> Result<bool, ClientError> {
		self.has_namespaced(desired, |_| None).await
	}

	async fn create(&mut self, desired: &Certificate) -> Result<(), ClientError> {
		let fields = Map::from_iter([
			("certs".to_string(), json!(desired.certs)),
			("key".to_string(), json!(desired.key)),
		]);
		self.create_namespaced(desired, fields).await?;
		Ok(())
	}
}

#[async_trait]
impl ResourceClient<StorageClass> for Session {
	async fn has(&mut self, desired: &StorageClass) -> Result<bool, ClientError> {
		self.has_in_cluster(desired).await
	}

	async fn create(&mut self, desired: &StorageClass) -> Result<(), ClientError> {
		let kind = desired.kind();
		let mut body = wire_object(kind, &desired.name);
		body.insert("provisioner".to_string(), json!(desired.provisioner));
		if !desired.parameters.is_empty() {
			body.insert("parameters".to_string(), json!(desired.parameters));
		}
		if let Some(policy) = &desired.reclaim_policy {
			body.insert("reclaimPolicy".to_string(), json!(policy));
		}
		if let Some(mode) = &desired.volume_binding_mode {
			body.insert("volumeBindingMode".to_string(), json!(mode));
		}
		body.insert(
			"allowVolumeExpansion".to_string(),
			json!(desired.allow_volume_expansion),
		);
		tracing::debug!(%kind, name = %desired.name, "creating");
		self.insert(Scope::Cluster, kind, &desired.name, Value::Object(body))
			.await?;
		Ok(())
	}
}

#[async_trait]
impl ResourceClient<PersistentVolume> for Session {
	async fn has(&mut self, desired: &PersistentVolume) -> Result<bool, ClientError> {
		self.has_in_cluster(desired).await
	}

	async fn create(&mut self, desired: &PersistentVolume) -> Result<(), ClientError> {
		let kind = desired.kind();
		let mut body = wire_object(kind, &desired.name);
		body.insert(
			"capacity".to_string(),
			json!({ "storage": desired.capacity }),
		);
		if !desired.access_modes.is_empty() {
			body.insert("accessModes".to_string(), json!(desired.access_modes));
		}
		if let Some(class) = &desired.storage_class_name {
			body.insert("storageClassId".to_string(), json!(class));
		}
		if let Some(policy) = &desired.reclaim_policy {
			body.insert(
				"persistentVolumeReclaimPolicy".to_string(),
				json!(policy),
			);
		}
		if let Some(host_path) = &desired.host_path {
			let mut source = json!({ "path": host_path.path });
			if let Some(path_kind) = &host_path.kind {
				source["kind"] = json!(path_kind);
			}
			body.insert("hostPath".to_string(), source);
		}
		if let Some(nfs) = &desired.nfs {
			body.insert(
				"nfs".to_string(),
				json!({
					"server": nfs.server,
					"path": nfs.path,
					"readOnly": nfs.read_only,
				}),
			);
		}
		tracing::debug!(%kind, name = %desired.name, "creating");
		self.insert(Scope::Cluster, kind, &desired.name, Value::Object(body))
			.await?;
		Ok(())
	}
}

fn app_answers(app: &App) -> Value {
	json!(app.answers)
}

/// Whether an existing app already runs this catalog version with these
/// answers. Absent answers equal empty answers.
fn app_matches(existing: &RemoteObject, desired: &App) -> bool {
	let external_id = existing.field("externalId").and_then(Value::as_str);
	let answers = existing
		.field("answers")
		.filter(|answers| !answers.is_null())
		.cloned()
		.unwrap_or_else(|| json!({}));
	external_id == Some(desired.external_id().as_str()) && answers == app_answers(desired)
}

#[async_trait]
impl ResourceClient<App> for Session {
	async fn has(&mut self, desired: &App) -> Result<bool, ClientError> {
		if self.cache.apps.contains_key(&desired.name) {
			return Ok(true);
		}
		let found = self
			.lookup(
				Scope::Project,
				desired.kind(),
				&desired.name,
				ListFilter::by_name(&desired.name),
			)
			.await?;
		let Some(object) = found else {
			return Ok(false);
		};
		self.cache
			.apps
			.entry(desired.name.clone())
			.or_insert(object);
		Ok(true)
	}

	async fn create(&mut self, desired: &App) -> Result<(), ClientError> {
		let kind = desired.kind();
		let project_id = self.require_project_id()?;
		let mut body = wire_object(kind, &desired.name);
		body.insert("projectId".to_string(), json!(project_id));
		body.insert(
			"targetNamespace".to_string(),
			json!(desired.target_namespace),
		);
		body.insert("externalId".to_string(), json!(desired.external_id()));
		body.insert("answers".to_string(), app_answers(desired));
		tracing::debug!(%kind, name = %desired.name, external_id = %desired.external_id(), "creating");
		self.insert(Scope::Project, kind, &desired.name, Value::Object(body))
			.await?;
		Ok(())
	}

	async fn update(&mut self, desired: &App) -> Result<(), ClientError> {
		let kind = desired.kind();
		let mut existing = match self.cache.apps.get(&desired.name).cloned() {
			Some(object) => object,
			None => self
				.lookup(
					Scope::Project,
					kind,
					&desired.name,
					ListFilter::by_name(&desired.name),
				)
				.await?
				.ok_or_else(|| ClientError::NotFound {
					kind,
					name: desired.name.clone(),
				})?,
		};

		if app_matches(&existing, desired) {
			tracing::debug!(%kind, name = %desired.name, "unchanged, skipping update");
			return Ok(());
		}

		existing.set("externalId", json!(desired.external_id()));
		existing.set("answers", app_answers(desired));
		tracing::debug!(%kind, name = %desired.name, external_id = %desired.external_id(), "replacing");
		self.replace(Scope::Project, kind, &existing).await?;
		Ok(())
	}
}

#[async_trait]
impl ResourceClient<Workload> for Session {
	async fn has(&mut self, desired: &Workload) -> Result<bool, ClientError> {
		self.has_namespaced(desired, |_| None).await
	}

	async fn create(&mut self, desired: &Workload) -> Result<(), ClientError> {
		self.create_namespaced(desired, desired.body.clone()).await?;
		Ok(())
	}
}
