//! Cluster and project preconditions.

use async_trait::async_trait;
use tracing::instrument;

use super::{Converge, ConvergeError, TreeConverger};
use crate::{client::ContextClient, descriptor::ProjectSpec};

/// How a descriptor names its cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterRef {
	pub id: Option<String>,
	pub name: Option<String>,
}

/// How a descriptor names its project. `spec` is what gets created when no
/// project with that name exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectRef {
	pub id: Option<String>,
	pub spec: ProjectSpec,
}

impl ProjectRef {
	pub fn named(name: &str) -> Self {
		Self {
			id: None,
			spec: ProjectSpec {
				name: name.to_string(),
				..ProjectSpec::default()
			},
		}
	}
}

/// Root of a project subtree: makes sure the project exists and is selected,
/// then converges the project's entries.
pub struct ProjectConverger<C> {
	project: ProjectRef,
	body: TreeConverger<C>,
}

impl<C> ProjectConverger<C> {
	pub fn new(project: ProjectRef, body: TreeConverger<C>) -> Self {
		Self { project, body }
	}

	pub fn project(&self) -> &ProjectRef {
		&self.project
	}
}

async fn ensure_project<C: ContextClient>(
	client: &mut C,
	project: &ProjectRef,
) -> Result<String, ConvergeError> {
	if let Some(id) = &project.id {
		return Ok(id.clone());
	}
	let name = project.spec.name.as_str();
	if name.is_empty() {
		return Err(ConvergeError::MissingProjectReference);
	}
	if let Some(id) = client.find_project(name).await? {
		tracing::debug!(project = name, %id, "found project");
		return Ok(id);
	}
	let id = client.create_project(&project.spec).await?;
	tracing::info!(project = name, %id, "created project");
	Ok(id)
}

#[async_trait]
impl<C: ContextClient> Converge<C> for ProjectConverger<C> {
	#[instrument(skip_all, fields(project = %self.project.spec.name))]
	async fn converge(&self, client: &mut C) -> Result<(), ConvergeError> {
		let id = ensure_project(client, &self.project).await?;
		client.select_project(&id).await?;
		self.body.converge(client).await
	}
}

/// Resolves the cluster a descriptor targets, then runs its body.
///
/// Clusters are never created: a name that matches nothing is an error.
pub struct DescriptorConverger<C> {
	cluster: ClusterRef,
	body: Box<dyn Converge<C>>,
}

impl<C> DescriptorConverger<C> {
	pub fn new(cluster: ClusterRef, body: Box<dyn Converge<C>>) -> Self {
		Self { cluster, body }
	}

	pub fn cluster(&self) -> &ClusterRef {
		&self.cluster
	}
}

async fn resolve_cluster<C: ContextClient>(
	client: &mut C,
	cluster: &ClusterRef,
) -> Result<String, ConvergeError> {
	match (&cluster.id, &cluster.name) {
		(Some(id), _) => Ok(id.clone()),
		(None, Some(name)) => client
			.find_cluster(name)
			.await?
			.ok_or_else(|| ConvergeError::ClusterNotFound(name.clone())),
		(None, None) => Err(ConvergeError::MissingClusterReference),
	}
}

#[async_trait]
impl<C: ContextClient> Converge<C> for DescriptorConverger<C> {
	#[instrument(skip_all, fields(cluster_id = ?self.cluster.id, cluster_name = ?self.cluster.name))]
	async fn converge(&self, client: &mut C) -> Result<(), ConvergeError> {
		let id = resolve_cluster(client, &self.cluster).await?;
		client.select_cluster(&id).await?;
		self.body.converge(client).await
	}
}
