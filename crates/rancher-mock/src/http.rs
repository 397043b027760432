//! HTTP mock Rancher server using wiremock.
//!
//! Collections are addressed by their full path below `/v3`: `GET` lists
//! (honouring `name`, `namespaceId` and `clusterId` query filters), `POST`
//! creates and `PUT <collection>/<id>` replaces. Errors use Rancher's error
//! body shape.

use std::sync::{Arc, PoisonError, RwLock};

use bon::Builder;
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use crate::store::{Seed, Store, Write};

/// Shared mutable store.
type SharedStore = Arc<RwLock<Store>>;

/// A mock Rancher server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockRancherServer {
	/// Objects served from the start.
	#[builder(default)]
	objects: Vec<Seed>,
	/// When set, requests without `Authorization: Bearer <token>` get a 401.
	#[builder(into)]
	token: Option<String>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockRancherServer {
	server: MockServer,
	store: SharedStore,
}

fn error(status: u16, code: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(status).set_body_json(serde_json::json!({
		"type": "error",
		"status": status,
		"code": code,
		"message": message,
	}))
}

fn unauthorized(req: &Request, token: Option<&str>) -> Option<ResponseTemplate> {
	let expected = format!("Bearer {}", token?);
	let given = req
		.headers
		.get("authorization")
		.and_then(|value| value.to_str().ok());
	if given == Some(expected.as_str()) {
		None
	} else {
		Some(error(401, "Unauthorized", "must authenticate"))
	}
}

fn json_body(req: &Request) -> Option<serde_json::Value> {
	serde_json::from_slice::<serde_json::Value>(&req.body)
		.ok()
		.filter(serde_json::Value::is_object)
}

fn write_response(result: Write, created: bool) -> ResponseTemplate {
	match result {
		Write::Stored(object) => {
			ResponseTemplate::new(if created { 201 } else { 200 }).set_body_json(object)
		}
		Write::Conflict(message) => error(409, "AlreadyExists", &message),
		Write::Missing(message) => error(404, "NotFound", &message),
	}
}

impl HttpMockRancherServer {
	/// Start the mock server with all configured objects.
	pub async fn start(self) -> RunningHttpMockRancherServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "Started mock Rancher server");

		let store = Arc::new(RwLock::new(Store::new(self.objects)));
		mount_collections(&server, &store, self.token.as_deref()).await;

		RunningHttpMockRancherServer { server, store }
	}
}

impl RunningHttpMockRancherServer {
	/// Server URL to use as the Rancher URL (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Current contents of a collection, in insertion order.
	pub fn objects(&self, path: &str) -> Vec<serde_json::Value> {
		self.store
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.objects(path)
	}

	/// Every request received so far.
	pub async fn requests(&self) -> Vec<Request> {
		self.server.received_requests().await.unwrap_or_default()
	}

	/// `(method, path)` of every request that changed state.
	pub async fn writes(&self) -> Vec<(String, String)> {
		self.requests()
			.await
			.into_iter()
			.filter(|req| req.method.as_str() != "GET")
			.map(|req| (req.method.to_string(), req.url.path().to_string()))
			.collect()
	}
}

async fn mount_collections(server: &MockServer, store: &SharedStore, token: Option<&str>) {
	let list_store = Arc::clone(store);
	let create_store = Arc::clone(store);
	let replace_store = Arc::clone(store);
	let list_token = token.map(str::to_string);
	let create_token = list_token.clone();
	let replace_token = list_token.clone();

	Mock::given(method("GET"))
		.and(path_regex(r"^/v3/.+"))
		.respond_with(move |req: &Request| {
			if let Some(denied) = unauthorized(req, list_token.as_deref()) {
				return denied;
			}
			let filters: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
			let data = list_store
				.read()
				.unwrap_or_else(PoisonError::into_inner)
				.list(req.url.path(), &filters);
			trace!(path = req.url.path(), ?filters, found = data.len(), "list");
			ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"type": "collection",
				"data": data,
			}))
		})
		.mount(server)
		.await;

	Mock::given(method("POST"))
		.and(path_regex(r"^/v3/.+"))
		.respond_with(move |req: &Request| {
			if let Some(denied) = unauthorized(req, create_token.as_deref()) {
				return denied;
			}
			let Some(body) = json_body(req) else {
				return error(422, "InvalidBodyContent", "body must be a JSON object");
			};
			let result = create_store
				.write()
				.unwrap_or_else(PoisonError::into_inner)
				.create(req.url.path(), body);
			trace!(path = req.url.path(), ?result, "create");
			write_response(result, true)
		})
		.mount(server)
		.await;

	Mock::given(method("PUT"))
		.and(path_regex(r"^/v3/.+/[^/]+$"))
		.respond_with(move |req: &Request| {
			if let Some(denied) = unauthorized(req, replace_token.as_deref()) {
				return denied;
			}
			let Some(body) = json_body(req) else {
				return error(422, "InvalidBodyContent", "body must be a JSON object");
			};
			let Some((collection, id)) = req.url.path().rsplit_once('/') else {
				return error(404, "NotFound", "no such object");
			};
			let result = replace_store
				.write()
				.unwrap_or_else(PoisonError::into_inner)
				.replace(collection, id, body);
			trace!(path = req.url.path(), ?result, "replace");
			write_response(result, false)
		})
		.mount(server)
		.await;
}
