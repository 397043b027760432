//! Converger trees for parsed descriptors.
//!
//! Children are ordered in tiers, each tier in declaration order. Namespaced
//! entries that do not name a namespace get the project's (or descriptor's)
//! default.

use super::{
	ClusterRef, Converge, ConvergeError, DescriptorConverger, PartConverger, ProjectConverger,
	ProjectRef, TreeConverger,
};
use crate::{
	client::{RancherClient, Resource, ResourceClient},
	descriptor::{
		ClusterDescriptor, Descriptor, Metadata, Namespaced, ProjectDescriptor, ProjectSpec,
		Workload, WorkloadDescriptor,
	},
};

fn part<R, C>(desired: R) -> Box<dyn Converge<C>>
where
	R: Resource + 'static,
	C: ResourceClient<R> + 'static,
{
	Box::new(PartConverger::new(desired))
}

fn push_all<R, C>(tree: &mut TreeConverger<C>, entries: &[R], namespace: Option<&str>)
where
	R: Resource + Namespaced + Clone + 'static,
	C: ResourceClient<R> + 'static,
{
	for entry in entries {
		let mut entry = entry.clone();
		if let Some(namespace) = namespace {
			entry.default_namespace(namespace);
		}
		tree.push(part(entry));
	}
}

fn cluster_ref(metadata: &Metadata) -> ClusterRef {
	ClusterRef {
		id: metadata.cluster_id.clone(),
		name: metadata.cluster_name.clone(),
	}
}

/// Only what is needed to create the project.
fn creation_spec(name: &str, spec: &ProjectSpec) -> ProjectSpec {
	ProjectSpec {
		name: name.to_string(),
		description: spec.description.clone(),
		..ProjectSpec::default()
	}
}

/// Entries of one project: namespaces, then certificates, config maps,
/// secrets and docker credentials, then apps.
fn project_body<C: RancherClient + 'static>(
	spec: &ProjectSpec,
	default_namespace: Option<&str>,
) -> TreeConverger<C> {
	let namespace = spec.namespace.as_deref().or(default_namespace);
	let mut tree = TreeConverger::default();
	for entry in &spec.namespaces {
		tree.push(part(entry.clone()));
	}
	push_all(&mut tree, &spec.certificates, namespace);
	push_all(&mut tree, &spec.config_maps, namespace);
	push_all(&mut tree, &spec.secrets, namespace);
	push_all(&mut tree, &spec.docker_credentials, namespace);
	for entry in &spec.apps {
		tree.push(part(entry.clone()));
	}
	tree
}

pub fn cluster_converger<C: RancherClient + 'static>(
	descriptor: &ClusterDescriptor,
) -> DescriptorConverger<C> {
	let mut tree = TreeConverger::default();
	for entry in &descriptor.spec.storage_classes {
		tree.push(part(entry.clone()));
	}
	for entry in &descriptor.spec.persistent_volumes {
		tree.push(part(entry.clone()));
	}
	for project in &descriptor.spec.projects {
		let body = project_body(project, descriptor.metadata.namespace.as_deref());
		let reference = ProjectRef {
			id: None,
			spec: creation_spec(&project.name, project),
		};
		tree.push(Box::new(ProjectConverger::new(reference, body)));
	}
	DescriptorConverger::new(cluster_ref(&descriptor.metadata), Box::new(tree))
}

pub fn project_converger<C: RancherClient + 'static>(
	descriptor: &ProjectDescriptor,
) -> DescriptorConverger<C> {
	let metadata = &descriptor.metadata;
	let name = descriptor.project_name().unwrap_or_default();
	let reference = ProjectRef {
		id: metadata.project_id.clone(),
		spec: creation_spec(name, &descriptor.spec),
	};
	let body = project_body(&descriptor.spec, metadata.namespace.as_deref());
	DescriptorConverger::new(
		cluster_ref(metadata),
		Box::new(ProjectConverger::new(reference, body)),
	)
}

/// The workload a descriptor describes, once merged.
fn workload(descriptor: &WorkloadDescriptor) -> Result<Workload, ConvergeError> {
	let kind = descriptor.kind.resource_kind();
	let name = descriptor
		.metadata
		.name
		.clone()
		.filter(|name| !name.is_empty())
		.ok_or(ConvergeError::MissingWorkloadName(kind))?;
	let serde_json::Value::Object(body) = &descriptor.spec else {
		return Err(ConvergeError::InvalidWorkloadSpec { kind, name });
	};
	Ok(Workload {
		kind: descriptor.kind,
		name,
		namespace: descriptor.metadata.namespace.clone(),
		body: body.clone(),
	})
}

/// Fails when the workload has no name or no spec mapping.
pub fn workload_converger<C: RancherClient + 'static>(
	descriptor: &WorkloadDescriptor,
) -> Result<DescriptorConverger<C>, ConvergeError> {
	let metadata = &descriptor.metadata;
	let reference = ProjectRef {
		id: metadata.project_id.clone(),
		..ProjectRef::named(metadata.project_name.as_deref().unwrap_or_default())
	};
	let body = TreeConverger::new(Some(part(workload(descriptor)?)));
	Ok(DescriptorConverger::new(
		cluster_ref(metadata),
		Box::new(ProjectConverger::new(reference, body)),
	))
}

/// Converger for any descriptor.
pub fn descriptor_converger<C: RancherClient + 'static>(
	descriptor: &Descriptor,
) -> Result<DescriptorConverger<C>, ConvergeError> {
	match descriptor {
		Descriptor::Cluster(cluster) => Ok(cluster_converger(cluster)),
		Descriptor::Project(project) => Ok(project_converger(project)),
		Descriptor::Workload(workload) => workload_converger(workload),
	}
}
