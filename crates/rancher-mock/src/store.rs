//! In-memory collections keyed by their URL path.

use std::collections::BTreeMap;

/// An object to serve from a collection at startup.
#[derive(Debug, Clone)]
pub struct Seed {
	/// Collection path, e.g. `/v3/clusters` or `/v3/projects/c-1:p-1/configMaps`.
	pub path: String,
	pub object: serde_json::Value,
}

/// Shorthand for a [`Seed`].
pub fn seed(path: impl Into<String>, object: serde_json::Value) -> Seed {
	Seed {
		path: path.into(),
		object,
	}
}

/// Outcome of a write against the store.
#[derive(Debug)]
pub(crate) enum Write {
	Stored(serde_json::Value),
	Conflict(String),
	Missing(String),
}

#[derive(Debug, Default)]
pub(crate) struct Store {
	collections: BTreeMap<String, Vec<serde_json::Value>>,
	serial: u64,
}

fn str_field<'a>(object: &'a serde_json::Value, key: &str) -> Option<&'a str> {
	object.get(key).and_then(serde_json::Value::as_str)
}

impl Store {
	pub(crate) fn new(seeds: Vec<Seed>) -> Self {
		let mut store = Store::default();
		for Seed { path, object } in seeds {
			store.collections.entry(path).or_default().push(object);
		}
		store
	}

	pub(crate) fn objects(&self, path: &str) -> Vec<serde_json::Value> {
		self.collections.get(path).cloned().unwrap_or_default()
	}

	/// Objects in `path` whose fields equal every filter pair. Unknown filter
	/// keys such as `system` are ignored.
	pub(crate) fn list(&self, path: &str, filters: &[(String, String)]) -> Vec<serde_json::Value> {
		let Some(objects) = self.collections.get(path) else {
			return Vec::new();
		};
		objects
			.iter()
			.filter(|object| {
				filters.iter().all(|(key, value)| match key.as_str() {
					"name" | "namespaceId" | "clusterId" => {
						str_field(object, key) == Some(value.as_str())
					}
					_ => true,
				})
			})
			.cloned()
			.collect()
	}

	/// Store a new object, assigning an id when it carries none.
	pub(crate) fn create(&mut self, path: &str, mut object: serde_json::Value) -> Write {
		let name = str_field(&object, "name").unwrap_or_default().to_string();
		let namespace = str_field(&object, "namespaceId").map(str::to_string);
		let objects = self.collections.entry(path.to_string()).or_default();

		if objects.iter().any(|existing| {
			str_field(existing, "name") == Some(name.as_str())
				&& str_field(existing, "namespaceId") == namespace.as_deref()
		}) {
			return Write::Conflict(format!("{name} already exists"));
		}

		if object.get("id").is_none() {
			self.serial += 1;
			let id = if path.ends_with("/projects") {
				let cluster = str_field(&object, "clusterId").unwrap_or("local");
				format!("{cluster}:p-{}", self.serial)
			} else if let Some(namespace) = &namespace {
				format!("{namespace}:{name}")
			} else {
				name.clone()
			};
			object["id"] = id.into();
		}

		objects.push(object.clone());
		Write::Stored(object)
	}

	/// Replace the object with this id, keeping the id.
	pub(crate) fn replace(&mut self, path: &str, id: &str, mut object: serde_json::Value) -> Write {
		let Some(existing) = self
			.collections
			.get_mut(path)
			.and_then(|objects| objects.iter_mut().find(|o| str_field(o, "id") == Some(id)))
		else {
			return Write::Missing(format!("{id} not found"));
		};
		object["id"] = id.into();
		existing.clone_from(&object);
		Write::Stored(object)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	const PROJECTS: &str = "/v3/projects";

	#[test]
	fn test_list_filters_on_known_fields() {
		let store = Store::new(vec![
			seed(PROJECTS, json!({"id": "c-1:p-1", "name": "web", "clusterId": "c-1"})),
			seed(PROJECTS, json!({"id": "c-2:p-1", "name": "web", "clusterId": "c-2"})),
		]);

		let found = store.list(
			PROJECTS,
			&[
				("name".to_string(), "web".to_string()),
				("clusterId".to_string(), "c-2".to_string()),
				("system".to_string(), "false".to_string()),
			],
		);
		assert_eq!(found, vec![json!({"id": "c-2:p-1", "name": "web", "clusterId": "c-2"})]);
	}

	#[test]
	fn test_create_assigns_ids() {
		let mut store = Store::default();
		let Write::Stored(project) = store.create(PROJECTS, json!({"name": "web", "clusterId": "c-1"}))
		else {
			panic!("project not stored");
		};
		assert_eq!(project["id"], "c-1:p-1");

		let path = "/v3/projects/c-1:p-1/configMaps";
		let Write::Stored(config_map) =
			store.create(path, json!({"name": "settings", "namespaceId": "web"}))
		else {
			panic!("config map not stored");
		};
		assert_eq!(config_map["id"], "web:settings");
	}

	#[test]
	fn test_create_rejects_duplicates_in_namespace() {
		let path = "/v3/projects/c-1:p-1/configMaps";
		let mut store = Store::new(vec![seed(
			path,
			json!({"id": "web:settings", "name": "settings", "namespaceId": "web"}),
		)]);

		assert!(matches!(
			store.create(path, json!({"name": "settings", "namespaceId": "web"})),
			Write::Conflict(_)
		));
		assert!(matches!(
			store.create(path, json!({"name": "settings", "namespaceId": "api"})),
			Write::Stored(_)
		));
	}

	#[test]
	fn test_replace_requires_existing_id() {
		let path = "/v3/clusters/c-1/namespaces";
		let mut store = Store::new(vec![seed(path, json!({"id": "web", "name": "web"}))]);

		assert!(matches!(
			store.replace(path, "api", json!({"name": "api"})),
			Write::Missing(_)
		));
		assert!(matches!(
			store.replace(path, "web", json!({"name": "web", "labels": {"a": "b"}})),
			Write::Stored(_)
		));
		assert_eq!(store.objects(path)[0]["labels"]["a"], "b");
	}
}
