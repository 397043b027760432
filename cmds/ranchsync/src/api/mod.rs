//! Remote transport for the Rancher v3 API.
//!
//! The engine never talks HTTP directly. Every remote call goes through an
//! [`ApiClient`] bound to one endpoint (management, cluster or project), and
//! scoped clients are built by a [`ClientFactory`] handed to the session, so
//! the transport can be replaced in tests.

pub mod http;
mod types;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
pub use types::{Collection, ListFilter, RemoteObject};

/// Errors produced by the transport layer.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("invalid API endpoint `{0}`")]
	InvalidEndpoint(String),

	#[error("building HTTP client")]
	Client(#[source] reqwest::Error),

	#[error("request to {url} failed")]
	Request {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("{method} {url} returned {status}: {message}")]
	Status {
		method: String,
		url: String,
		status: u16,
		message: String,
	},

	#[error("decoding response from {url}")]
	Decode {
		url: String,
		#[source]
		source: serde_json::Error,
	},
}

/// Credentials attached to every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
	#[default]
	Anonymous,
	/// Bearer token, usually `token-xxxxx:secret`.
	Token(String),
	/// API key pair, sent as basic auth.
	KeyPair {
		access_key: String,
		secret_key: String,
	},
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Credentials::Anonymous => f.write_str("Anonymous"),
			Credentials::Token(_) => f.write_str("Token(<redacted>)"),
			Credentials::KeyPair { access_key, .. } => f
				.debug_struct("KeyPair")
				.field("access_key", access_key)
				.finish_non_exhaustive(),
		}
	}
}

/// Collection-level operations against one API endpoint.
///
/// `collection` is the plural collection name relative to the endpoint
/// (`projects`, `namespaces`, `configMaps`, ...).
#[async_trait]
pub trait ApiClient: Send + Sync {
	/// The endpoint URL this client is bound to.
	fn endpoint(&self) -> &str;

	async fn list(&self, collection: &str, filter: &ListFilter) -> Result<Collection, ApiError>;

	async fn create(
		&self,
		collection: &str,
		object: &serde_json::Value,
	) -> Result<RemoteObject, ApiError>;

	async fn replace(
		&self,
		collection: &str,
		id: &str,
		object: &serde_json::Value,
	) -> Result<RemoteObject, ApiError>;
}

/// Builds [`ApiClient`]s for derived endpoints.
pub trait ClientFactory: Send + Sync {
	fn connect(
		&self,
		endpoint: &str,
		credentials: &Credentials,
	) -> Result<Arc<dyn ApiClient>, ApiError>;
}

/// Management endpoint for a Rancher server URL.
pub fn management_endpoint(url: &str) -> String {
	format!("{}/v3", url.trim_end_matches('/'))
}

/// Cluster-scoped endpoint.
pub fn cluster_endpoint(url: &str, cluster_id: &str) -> String {
	format!("{}/clusters/{}", management_endpoint(url), cluster_id)
}

/// Project-scoped endpoint.
pub fn project_endpoint(url: &str, project_id: &str) -> String {
	format!("{}/projects/{}", management_endpoint(url), project_id)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_endpoints_strip_trailing_slash() {
		assert_eq!(
			management_endpoint("https://rancher.example/"),
			"https://rancher.example/v3"
		);
		assert_eq!(
			cluster_endpoint("https://rancher.example", "c-abc12"),
			"https://rancher.example/v3/clusters/c-abc12"
		);
		assert_eq!(
			project_endpoint("https://rancher.example", "c-abc12:p-xyz"),
			"https://rancher.example/v3/projects/c-abc12:p-xyz"
		);
	}

	#[test]
	fn test_credentials_debug_redacts_secrets() {
		let token = Credentials::Token("token-abc:supersecret".to_string());
		assert!(!format!("{token:?}").contains("supersecret"));

		let pair = Credentials::KeyPair {
			access_key: "token-abc".to_string(),
			secret_key: "supersecret".to_string(),
		};
		let rendered = format!("{pair:?}");
		assert!(rendered.contains("token-abc"));
		assert!(!rendered.contains("supersecret"));
	}
}
