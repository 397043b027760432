//! reqwest-backed [`ApiClient`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Method, Url};
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{ApiClient, ApiError, ClientFactory, Collection, Credentials, ListFilter, RemoteObject};

/// Default timeout for API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Factory sharing one connection pool across every scoped client.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
	http: reqwest::Client,
}

impl HttpClientFactory {
	pub fn new() -> Result<Self, ApiError> {
		let http = reqwest::Client::builder()
			.timeout(DEFAULT_API_TIMEOUT)
			.build()
			.map_err(ApiError::Client)?;
		Ok(Self { http })
	}
}

impl ClientFactory for HttpClientFactory {
	fn connect(
		&self,
		endpoint: &str,
		credentials: &Credentials,
	) -> Result<Arc<dyn ApiClient>, ApiError> {
		let client = HttpApiClient::new(self.http.clone(), endpoint, credentials.clone())?;
		Ok(Arc::new(client))
	}
}

/// Client bound to a single endpoint.
#[derive(Debug)]
pub struct HttpApiClient {
	http: reqwest::Client,
	endpoint: String,
	credentials: Credentials,
}

impl HttpApiClient {
	pub fn new(
		http: reqwest::Client,
		endpoint: &str,
		credentials: Credentials,
	) -> Result<Self, ApiError> {
		let endpoint = endpoint.trim_end_matches('/');
		Url::parse(endpoint).map_err(|_| ApiError::InvalidEndpoint(endpoint.to_string()))?;
		Ok(Self {
			http,
			endpoint: endpoint.to_string(),
			credentials,
		})
	}

	fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
		let raw = format!("{}/{}", self.endpoint, segments.join("/"));
		Url::parse(&raw).map_err(|_| ApiError::InvalidEndpoint(raw))
	}

	async fn send<T: DeserializeOwned>(
		&self,
		method: Method,
		url: Url,
		query: &[(&'static str, String)],
		body: Option<&serde_json::Value>,
	) -> Result<T, ApiError> {
		let mut request = self
			.http
			.request(method.clone(), url.clone())
			.header(ACCEPT, "application/json");
		if !query.is_empty() {
			request = request.query(query);
		}
		request = match &self.credentials {
			Credentials::Anonymous => request,
			Credentials::Token(token) => request.bearer_auth(token),
			Credentials::KeyPair {
				access_key,
				secret_key,
			} => request.basic_auth(access_key, Some(secret_key)),
		};
		if let Some(body) = body {
			request = request.json(body);
		}

		let response = request.send().await.map_err(|source| ApiError::Request {
			url: url.to_string(),
			source,
		})?;
		let status = response.status();
		let text = response.text().await.map_err(|source| ApiError::Request {
			url: url.to_string(),
			source,
		})?;

		if !status.is_success() {
			return Err(ApiError::Status {
				method: method.to_string(),
				url: url.to_string(),
				status: status.as_u16(),
				message: error_message(&text),
			});
		}

		serde_json::from_str(&text).map_err(|source| ApiError::Decode {
			url: url.to_string(),
			source,
		})
	}
}

#[async_trait]
impl ApiClient for HttpApiClient {
	fn endpoint(&self) -> &str {
		&self.endpoint
	}

	#[instrument(skip(self, filter), fields(endpoint = %self.endpoint))]
	async fn list(&self, collection: &str, filter: &ListFilter) -> Result<Collection, ApiError> {
		let url = self.url(&[collection])?;
		self.send(Method::GET, url, &filter.query(), None).await
	}

	#[instrument(skip(self, object), fields(endpoint = %self.endpoint))]
	async fn create(
		&self,
		collection: &str,
		object: &serde_json::Value,
	) -> Result<RemoteObject, ApiError> {
		let url = self.url(&[collection])?;
		self.send(Method::POST, url, &[], Some(object)).await
	}

	#[instrument(skip(self, object), fields(endpoint = %self.endpoint))]
	async fn replace(
		&self,
		collection: &str,
		id: &str,
		object: &serde_json::Value,
	) -> Result<RemoteObject, ApiError> {
		let url = self.url(&[collection, id])?;
		self.send(Method::PUT, url, &[], Some(object)).await
	}
}

/// Pull the human message out of a Rancher error body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
	serde_json::from_str::<serde_json::Value>(body)
		.ok()
		.and_then(|value| {
			value
				.get("message")
				.and_then(|m| m.as_str())
				.map(str::to_string)
		})
		.unwrap_or_else(|| body.trim().to_string())
}
