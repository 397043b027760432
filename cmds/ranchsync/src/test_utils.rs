//! Common test utilities.

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	io::{self, ErrorKind, Write},
	sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
	api::{ApiClient, ApiError, ClientFactory, Collection, Credentials, ListFilter, RemoteObject},
	client::{ClientError, ContextClient, Resource, ResourceClient, ResourceKind},
	descriptor::ProjectSpec,
};

/// A writer that simulates a broken pipe (SIGPIPE scenario).
pub struct BrokenPipeWriter;

impl Write for BrokenPipeWriter {
	fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}

	fn flush(&mut self) -> io::Result<()> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}
}

/// A remote call observed by [`MemoryFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	List {
		endpoint: String,
		collection: String,
		filter: ListFilter,
	},
	Create {
		endpoint: String,
		collection: String,
		name: String,
	},
	Replace {
		endpoint: String,
		collection: String,
		id: String,
	},
}

impl Call {
	pub fn is_list(&self) -> bool {
		matches!(self, Call::List { .. })
	}

	pub fn is_create(&self) -> bool {
		matches!(self, Call::Create { .. })
	}

	pub fn is_replace(&self) -> bool {
		matches!(self, Call::Replace { .. })
	}
}

#[derive(Default)]
struct Store {
	objects: BTreeMap<(String, String), Vec<RemoteObject>>,
	calls: Vec<Call>,
	endpoints: Vec<String>,
	next_id: usize,
}

/// An in-memory API shared by every client it hands out.
///
/// Objects are stored per (endpoint, collection); listing honors the same
/// filters the server does.
#[derive(Clone, Default)]
pub struct MemoryFactory {
	store: Arc<Mutex<Store>>,
}

impl MemoryFactory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Put an object into a collection without recording a call.
	pub fn seed(&self, endpoint: &str, collection: &str, object: serde_json::Value) {
		let object: RemoteObject = serde_json::from_value(object).expect("seed object");
		let mut store = self.store.lock().unwrap();
		store
			.objects
			.entry((endpoint.to_string(), collection.to_string()))
			.or_default()
			.push(object);
	}

	pub fn objects(&self, endpoint: &str, collection: &str) -> Vec<RemoteObject> {
		let store = self.store.lock().unwrap();
		store
			.objects
			.get(&(endpoint.to_string(), collection.to_string()))
			.cloned()
			.unwrap_or_default()
	}

	pub fn calls(&self) -> Vec<Call> {
		self.store.lock().unwrap().calls.clone()
	}

	/// Endpoints clients were built for, in order.
	pub fn endpoints(&self) -> Vec<String> {
		self.store.lock().unwrap().endpoints.clone()
	}
}

impl ClientFactory for MemoryFactory {
	fn connect(
		&self,
		endpoint: &str,
		_credentials: &Credentials,
	) -> Result<Arc<dyn ApiClient>, ApiError> {
		self.store
			.lock()
			.unwrap()
			.endpoints
			.push(endpoint.to_string());
		Ok(Arc::new(MemoryApi {
			endpoint: endpoint.to_string(),
			store: Arc::clone(&self.store),
		}))
	}
}

struct MemoryApi {
	endpoint: String,
	store: Arc<Mutex<Store>>,
}

fn field_is(object: &RemoteObject, key: &str, expected: Option<&String>) -> bool {
	expected.is_none_or(|expected| {
		object.field(key).and_then(serde_json::Value::as_str) == Some(expected.as_str())
	})
}

#[async_trait]
impl ApiClient for MemoryApi {
	fn endpoint(&self) -> &str {
		&self.endpoint
	}

	async fn list(&self, collection: &str, filter: &ListFilter) -> Result<Collection, ApiError> {
		let mut store = self.store.lock().unwrap();
		store.calls.push(Call::List {
			endpoint: self.endpoint.clone(),
			collection: collection.to_string(),
			filter: filter.clone(),
		});
		let data = store
			.objects
			.get(&(self.endpoint.clone(), collection.to_string()))
			.map(|objects| {
				objects
					.iter()
					.filter(|o| filter.name.as_ref().is_none_or(|name| &o.name == name))
					.filter(|o| field_is(o, "namespaceId", filter.namespace_id.as_ref()))
					.filter(|o| field_is(o, "clusterId", filter.cluster_id.as_ref()))
					.cloned()
					.collect()
			})
			.unwrap_or_default();
		Ok(Collection { data })
	}

	async fn create(
		&self,
		collection: &str,
		object: &serde_json::Value,
	) -> Result<RemoteObject, ApiError> {
		let mut object: RemoteObject =
			serde_json::from_value(object.clone()).map_err(|source| ApiError::Decode {
				url: format!("{}/{collection}", self.endpoint),
				source,
			})?;
		let mut store = self.store.lock().unwrap();
		store.next_id += 1;
		let serial = store.next_id;
		if object.id.is_none() {
			let scope = object
				.field("namespaceId")
				.or_else(|| object.field("clusterId"))
				.and_then(serde_json::Value::as_str)
				.map(str::to_string);
			object.id = Some(match scope {
				Some(scope) if collection == "projects" => format!("{scope}:p-{serial}"),
				Some(scope) => format!("{scope}:{}", object.name),
				None => object.name.clone(),
			});
		}
		store.calls.push(Call::Create {
			endpoint: self.endpoint.clone(),
			collection: collection.to_string(),
			name: object.name.clone(),
		});
		store
			.objects
			.entry((self.endpoint.clone(), collection.to_string()))
			.or_default()
			.push(object.clone());
		Ok(object)
	}

	async fn replace(
		&self,
		collection: &str,
		id: &str,
		object: &serde_json::Value,
	) -> Result<RemoteObject, ApiError> {
		let url = format!("{}/{collection}/{id}", self.endpoint);
		let replacement: RemoteObject =
			serde_json::from_value(object.clone()).map_err(|source| ApiError::Decode {
				url: url.clone(),
				source,
			})?;
		let mut store = self.store.lock().unwrap();
		store.calls.push(Call::Replace {
			endpoint: self.endpoint.clone(),
			collection: collection.to_string(),
			id: id.to_string(),
		});
		let slot = store
			.objects
			.get_mut(&(self.endpoint.clone(), collection.to_string()))
			.and_then(|objects| objects.iter_mut().find(|o| o.id() == Some(id)))
			.ok_or_else(|| ApiError::Status {
				method: "PUT".to_string(),
				url,
				status: 404,
				message: "not found".to_string(),
			})?;
		*slot = replacement.clone();
		Ok(replacement)
	}
}

/// What the engine asked of a [`RecordingClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	FindCluster(String),
	SelectCluster(String),
	FindProject(String),
	CreateProject(String),
	SelectProject(String),
	Has(ResourceKind, String),
	Create(ResourceKind, String),
	Update(ResourceKind, String),
}

/// A resource client that only remembers names and records every call.
#[derive(Debug, Default)]
pub struct RecordingClient {
	clusters: HashMap<String, String>,
	projects: HashMap<String, String>,
	existing: HashSet<(ResourceKind, String)>,
	failing: HashSet<(ResourceKind, String)>,
	cluster: Option<String>,
	project: Option<String>,
	pub events: Vec<Event>,
}

impl RecordingClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cluster(mut self, name: &str, id: &str) -> Self {
		self.clusters.insert(name.to_string(), id.to_string());
		self
	}

	pub fn with_project(mut self, name: &str, id: &str) -> Self {
		self.projects.insert(name.to_string(), id.to_string());
		self
	}

	pub fn with_existing(mut self, kind: ResourceKind, name: &str) -> Self {
		self.existing.insert((kind, name.to_string()));
		self
	}

	/// Make `create` fail for this entry.
	pub fn failing_create(mut self, kind: ResourceKind, name: &str) -> Self {
		self.failing.insert((kind, name.to_string()));
		self
	}

	pub fn creates(&self) -> Vec<(ResourceKind, String)> {
		self.events
			.iter()
			.filter_map(|event| match event {
				Event::Create(kind, name) => Some((*kind, name.clone())),
				_ => None,
			})
			.collect()
	}

	pub fn updates(&self) -> Vec<(ResourceKind, String)> {
		self.events
			.iter()
			.filter_map(|event| match event {
				Event::Update(kind, name) => Some((*kind, name.clone())),
				_ => None,
			})
			.collect()
	}
}

#[async_trait]
impl ContextClient for RecordingClient {
	fn cluster_id(&self) -> Option<&str> {
		self.cluster.as_deref()
	}

	fn project_id(&self) -> Option<&str> {
		self.project.as_deref()
	}

	async fn find_cluster(&mut self, name: &str) -> Result<Option<String>, ClientError> {
		self.events.push(Event::FindCluster(name.to_string()));
		Ok(self.clusters.get(name).cloned())
	}

	async fn select_cluster(&mut self, id: &str) -> Result<(), ClientError> {
		self.events.push(Event::SelectCluster(id.to_string()));
		self.cluster = Some(id.to_string());
		self.project = None;
		Ok(())
	}

	async fn find_project(&mut self, name: &str) -> Result<Option<String>, ClientError> {
		if self.cluster.is_none() {
			return Err(ClientError::NoClusterSelected);
		}
		self.events.push(Event::FindProject(name.to_string()));
		Ok(self.projects.get(name).cloned())
	}

	async fn create_project(&mut self, project: &ProjectSpec) -> Result<String, ClientError> {
		self.events.push(Event::CreateProject(project.name.clone()));
		let id = format!("p-{}", project.name);
		self.projects.insert(project.name.clone(), id.clone());
		Ok(id)
	}

	async fn select_project(&mut self, id: &str) -> Result<(), ClientError> {
		self.events.push(Event::SelectProject(id.to_string()));
		self.project = Some(id.to_string());
		Ok(())
	}
}

#[async_trait]
impl<R: Resource> ResourceClient<R> for RecordingClient {
	async fn has(&mut self, desired: &R) -> Result<bool, ClientError> {
		let key = (desired.kind(), desired.name().to_string());
		self.events.push(Event::Has(key.0, key.1.clone()));
		Ok(self.existing.contains(&key))
	}

	async fn create(&mut self, desired: &R) -> Result<(), ClientError> {
		let key = (desired.kind(), desired.name().to_string());
		self.events.push(Event::Create(key.0, key.1.clone()));
		if self.failing.contains(&key) {
			return Err(ClientError::Create {
				kind: key.0,
				name: key.1,
				source: ApiError::Status {
					method: "POST".to_string(),
					url: "memory://".to_string(),
					status: 422,
					message: "rejected".to_string(),
				},
			});
		}
		self.existing.insert(key);
		Ok(())
	}

	async fn update(&mut self, desired: &R) -> Result<(), ClientError> {
		self.events.push(Event::Update(
			desired.kind(),
			desired.name().to_string(),
		));
		Ok(())
	}
}
