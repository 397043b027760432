//! Wire types shared by every collection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Query filter for collection listings.
///
/// System objects are always excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
	pub name: Option<String>,
	pub namespace_id: Option<String>,
	pub cluster_id: Option<String>,
}

impl ListFilter {
	pub fn by_name(name: &str) -> Self {
		Self {
			name: Some(name.to_string()),
			..Self::default()
		}
	}

	pub fn in_namespace(mut self, namespace_id: &str) -> Self {
		self.namespace_id = Some(namespace_id.to_string());
		self
	}

	pub fn in_cluster(mut self, cluster_id: &str) -> Self {
		self.cluster_id = Some(cluster_id.to_string());
		self
	}

	/// Query string pairs in the order they are sent.
	pub fn query(&self) -> Vec<(&'static str, String)> {
		let mut query = Vec::with_capacity(4);
		if let Some(name) = &self.name {
			query.push(("name", name.clone()));
		}
		if let Some(namespace_id) = &self.namespace_id {
			query.push(("namespaceId", namespace_id.clone()));
		}
		if let Some(cluster_id) = &self.cluster_id {
			query.push(("clusterId", cluster_id.clone()));
		}
		query.push(("system", "false".to_string()));
		query
	}
}

/// A collection listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
	#[serde(default)]
	pub data: Vec<RemoteObject>,
}

impl Collection {
	/// First object with exactly this name.
	///
	/// The server-side filter is not trusted to be exact.
	pub fn find(self, name: &str) -> Option<RemoteObject> {
		self.data.into_iter().find(|object| object.name == name)
	}
}

/// An object as returned by the API.
///
/// Only the fields the engine reads are typed; everything else is kept in
/// `fields` so that a replace sends back what it received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
	#[serde(flatten)]
	pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RemoteObject {
	pub fn id(&self) -> Option<&str> {
		self.id.as_deref()
	}

	pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
		self.fields.get(key)
	}

	pub fn set(&mut self, key: &str, value: serde_json::Value) {
		self.fields.insert(key.to_string(), value);
	}

	/// Request body for a replace: the object as received, with local edits.
	pub fn to_value(&self) -> serde_json::Value {
		let mut body = serde_json::Map::new();
		if let Some(id) = &self.id {
			body.insert("id".to_string(), id.clone().into());
		}
		body.insert("name".to_string(), self.name.clone().into());
		body.insert(
			"labels".to_string(),
			self.labels
				.iter()
				.map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
				.collect(),
		);
		body.extend(self.fields.clone());
		serde_json::Value::Object(body)
	}
}
