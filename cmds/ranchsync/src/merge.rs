//! Parent/child descriptor merge.
//!
//! The parent is the base. A child value only lands where the parent holds a
//! zero value (empty string, `None`, `false`, empty body), maps gain the keys
//! the parent lacks, and named lists are unioned by name: parent entries
//! first and untouched, then child entries with new names in child order.
//! Inputs are never modified.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::descriptor::{
	ClusterDescriptor, ClusterSpec, Descriptor, DescriptorKind, Metadata, Named,
	ProjectDescriptor, ProjectSpec, WorkloadDescriptor,
};

#[derive(Debug, Error)]
pub enum MergeError {
	#[error("cannot merge a {child} descriptor into a {parent} descriptor")]
	KindMismatch {
		child: DescriptorKind,
		parent: DescriptorKind,
	},
}

/// Fill zero values of `self` (a copy of the parent) from the child.
trait FillFrom {
	fn fill_from(&mut self, child: &Self);
}

impl FillFrom for String {
	fn fill_from(&mut self, child: &Self) {
		if self.is_empty() {
			self.clone_from(child);
		}
	}
}

impl<T: Clone> FillFrom for Option<T> {
	fn fill_from(&mut self, child: &Self) {
		if self.is_none() {
			self.clone_from(child);
		}
	}
}

impl FillFrom for bool {
	fn fill_from(&mut self, child: &Self) {
		*self = *self || *child;
	}
}

impl<V: Clone> FillFrom for BTreeMap<String, V> {
	fn fill_from(&mut self, child: &Self) {
		for (key, value) in child {
			self.entry(key.clone()).or_insert_with(|| value.clone());
		}
	}
}

impl<T: Named + Clone> FillFrom for Vec<T> {
	fn fill_from(&mut self, child: &Self) {
		let known: HashSet<String> = self.iter().map(|e| e.name().to_string()).collect();
		self.extend(
			child
				.iter()
				.filter(|entry| !known.contains(entry.name()))
				.cloned(),
		);
	}
}

impl FillFrom for serde_json::Value {
	fn fill_from(&mut self, child: &Self) {
		let empty = match self {
			serde_json::Value::Null => true,
			serde_json::Value::Object(map) => map.is_empty(),
			_ => false,
		};
		if empty {
			self.clone_from(child);
		}
	}
}

macro_rules! fill_fields {
	($base:expr, $child:expr, [$($field:ident),* $(,)?]) => {
		$( $base.$field.fill_from(&$child.$field); )*
	};
}

impl FillFrom for Metadata {
	fn fill_from(&mut self, child: &Self) {
		fill_fields!(
			self,
			child,
			[
				name,
				cluster_name,
				cluster_id,
				project_name,
				project_id,
				namespace,
				rancher_url,
				token,
				access_key,
				secret_key,
			]
		);
	}
}

impl FillFrom for ProjectSpec {
	fn fill_from(&mut self, child: &Self) {
		fill_fields!(
			self,
			child,
			[
				name,
				description,
				namespace,
				namespaces,
				certificates,
				config_maps,
				secrets,
				docker_credentials,
				apps,
			]
		);
	}
}

impl FillFrom for ClusterSpec {
	fn fill_from(&mut self, child: &Self) {
		fill_fields!(self, child, [storage_classes, persistent_volumes, projects]);
	}
}

pub fn merge_project(child: &ProjectDescriptor, parent: &ProjectDescriptor) -> ProjectDescriptor {
	let mut merged = parent.clone();
	merged.api_version.fill_from(&child.api_version);
	merged.metadata.fill_from(&child.metadata);
	merged.spec.fill_from(&child.spec);
	merged
}

pub fn merge_cluster(child: &ClusterDescriptor, parent: &ClusterDescriptor) -> ClusterDescriptor {
	let mut merged = parent.clone();
	merged.api_version.fill_from(&child.api_version);
	merged.metadata.fill_from(&child.metadata);
	merged.spec.fill_from(&child.spec);
	merged
}

/// Workloads merge their metadata; the parent body is kept unless it is
/// empty.
pub fn merge_workload(
	child: &WorkloadDescriptor,
	parent: &WorkloadDescriptor,
) -> WorkloadDescriptor {
	let mut merged = parent.clone();
	merged.api_version.fill_from(&child.api_version);
	merged.metadata.fill_from(&child.metadata);
	merged.spec.fill_from(&child.spec);
	merged
}

/// Merge two descriptors of the same kind.
pub fn merge(child: &Descriptor, parent: &Descriptor) -> Result<Descriptor, MergeError> {
	match (child, parent) {
		(Descriptor::Cluster(c), Descriptor::Cluster(p)) => {
			Ok(Descriptor::Cluster(merge_cluster(c, p)))
		}
		(Descriptor::Project(c), Descriptor::Project(p)) => {
			Ok(Descriptor::Project(merge_project(c, p)))
		}
		(Descriptor::Workload(c), Descriptor::Workload(p)) if c.kind == p.kind => {
			Ok(Descriptor::Workload(merge_workload(c, p)))
		}
		_ => Err(MergeError::KindMismatch {
			child: child.kind(),
			parent: parent.kind(),
		}),
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;
	use crate::descriptor::{ConfigMap, Namespace, WorkloadKind};

	fn project(metadata: Metadata, spec: ProjectSpec) -> ProjectDescriptor {
		ProjectDescriptor {
			api_version: String::new(),
			kind: DescriptorKind::Project,
			metadata,
			spec,
		}
	}

	fn config_map(name: &str, value: &str) -> ConfigMap {
		ConfigMap {
			name: name.to_string(),
			data: BTreeMap::from([("x".to_string(), value.to_string())]),
			..ConfigMap::default()
		}
	}

	#[test]
	fn test_empty_child_is_identity() {
		let parent = project(
			Metadata {
				cluster_name: Some("prod".to_string()),
				..Metadata::default()
			},
			ProjectSpec {
				name: "payments".to_string(),
				config_maps: vec![config_map("a", "1")],
				..ProjectSpec::default()
			},
		);
		let child = project(Metadata::default(), ProjectSpec::default());

		assert_eq!(merge_project(&child, &parent), parent);
	}

	#[test]
	fn test_empty_parent_takes_child() {
		let child = project(
			Metadata {
				namespace: Some("payments".to_string()),
				..Metadata::default()
			},
			ProjectSpec {
				namespaces: vec![Namespace {
					name: "payments".to_string(),
					..Namespace::default()
				}],
				..ProjectSpec::default()
			},
		);
		let parent = project(Metadata::default(), ProjectSpec::default());

		assert_eq!(merge_project(&child, &parent), child);
	}

	#[test]
	fn test_named_lists_union_with_parent_winning() {
		let parent = project(
			Metadata::default(),
			ProjectSpec {
				config_maps: vec![config_map("a", "1"), config_map("b", "1")],
				..ProjectSpec::default()
			},
		);
		let child = project(
			Metadata::default(),
			ProjectSpec {
				config_maps: vec![config_map("b", "2"), config_map("c", "1")],
				..ProjectSpec::default()
			},
		);

		let merged = merge_project(&child, &parent);
		assert_eq!(
			merged.spec.config_maps,
			vec![config_map("a", "1"), config_map("b", "1"), config_map("c", "1")]
		);
		assert_eq!(parent.spec.config_maps.len(), 2, "inputs are untouched");
	}

	#[test]
	fn test_parent_scalars_win_where_set() {
		let parent = project(
			Metadata {
				cluster_name: Some("prod".to_string()),
				..Metadata::default()
			},
			ProjectSpec::default(),
		);
		let child = project(
			Metadata {
				cluster_name: Some("staging".to_string()),
				project_name: Some("payments".to_string()),
				..Metadata::default()
			},
			ProjectSpec::default(),
		);

		let merged = merge_project(&child, &parent);
		assert_eq!(merged.metadata.cluster_name.as_deref(), Some("prod"));
		assert_eq!(merged.metadata.project_name.as_deref(), Some("payments"));
	}

	#[test]
	fn test_cluster_projects_merge_by_name() {
		let named = |name: &str, description: &str| ProjectSpec {
			name: name.to_string(),
			description: Some(description.to_string()),
			..ProjectSpec::default()
		};
		let cluster = |projects| ClusterDescriptor {
			api_version: String::new(),
			kind: DescriptorKind::Cluster,
			metadata: Metadata::default(),
			spec: ClusterSpec {
				projects,
				..ClusterSpec::default()
			},
		};
		let parent = cluster(vec![named("web", "parent")]);
		let child = cluster(vec![named("web", "child"), named("api", "child")]);

		let merged = merge_cluster(&child, &parent);
		assert_eq!(
			merged.spec.projects,
			vec![named("web", "parent"), named("api", "child")]
		);
	}

	#[test]
	fn test_workload_body_parent_wins_unless_empty() {
		let workload = |spec| WorkloadDescriptor {
			api_version: String::new(),
			kind: WorkloadKind::Deployment,
			metadata: Metadata::default(),
			spec,
		};
		let child = workload(json!({"replicas": 2}));

		let merged = merge_workload(&child, &workload(json!({"replicas": 1})));
		assert_eq!(merged.spec, json!({"replicas": 1}));

		let merged = merge_workload(&child, &workload(serde_json::Value::Null));
		assert_eq!(merged.spec, json!({"replicas": 2}));
	}

	#[test]
	fn test_merge_rejects_mismatched_kinds() {
		let project = Descriptor::Project(project(Metadata::default(), ProjectSpec::default()));
		let job = Descriptor::Workload(WorkloadDescriptor {
			api_version: String::new(),
			kind: WorkloadKind::Job,
			metadata: Metadata::default(),
			spec: serde_json::Value::Null,
		});

		assert_matches!(
			merge(&project, &job),
			Err(MergeError::KindMismatch {
				child: DescriptorKind::Project,
				parent: DescriptorKind::Job,
			})
		);
	}
}
