//! Convergence of desired state against the remote API.
//!
//! Every node of a descriptor becomes a converger. A [`PartConverger`]
//! reconciles one entry, a [`TreeConverger`] runs a root and its children in
//! order, and a [`DescriptorConverger`] resolves the cluster and project a
//! descriptor targets before running its body. Remote calls are issued one at
//! a time; the first failure stops the rest of the tree.

mod build;
mod scope;

use async_trait::async_trait;
pub use build::{cluster_converger, descriptor_converger, project_converger, workload_converger};
pub use scope::{ClusterRef, DescriptorConverger, ProjectConverger, ProjectRef};
use thiserror::Error;

use crate::client::{ClientError, OnExists, Resource, ResourceClient, ResourceKind};

#[derive(Debug, Error)]
pub enum ConvergeError {
	#[error("cluster `{0}` not found")]
	ClusterNotFound(String),

	#[error("descriptor names no cluster, set metadata.clusterName or metadata.clusterId")]
	MissingClusterReference,

	#[error("descriptor names no project, set metadata.projectName or metadata.projectId")]
	MissingProjectReference,

	#[error("{0} descriptor has no metadata.name")]
	MissingWorkloadName(ResourceKind),

	#[error("{kind} `{name}` has no spec mapping")]
	InvalidWorkloadSpec { kind: ResourceKind, name: String },

	#[error(transparent)]
	Client(#[from] ClientError),
}

/// Something that can bring remote state in line with desired state.
#[async_trait]
pub trait Converge<C>: Send + Sync {
	async fn converge(&self, client: &mut C) -> Result<(), ConvergeError>;
}

/// Observed state of a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
	Exists,
	Missing,
}

/// Reconciles one desired entry.
#[derive(Debug, Clone)]
pub struct PartConverger<R> {
	desired: R,
}

impl<R: Resource> PartConverger<R> {
	pub fn new(desired: R) -> Self {
		Self { desired }
	}

	pub fn desired(&self) -> &R {
		&self.desired
	}
}

#[async_trait]
impl<R, C> Converge<C> for PartConverger<R>
where
	R: Resource + 'static,
	C: ResourceClient<R>,
{
	async fn converge(&self, client: &mut C) -> Result<(), ConvergeError> {
		let kind = self.desired.kind();
		let name = self.desired.name();

		let state = if client.has(&self.desired).await? {
			PartState::Exists
		} else {
			PartState::Missing
		};
		tracing::debug!(%kind, name, ?state, "checked");

		match (state, self.desired.on_exists()) {
			(PartState::Missing, _) => {
				client.create(&self.desired).await?;
				tracing::info!(%kind, name, "created");
			}
			(PartState::Exists, OnExists::Update) => {
				client.update(&self.desired).await?;
				tracing::debug!(%kind, name, "updated");
			}
			(PartState::Exists, OnExists::Keep) => tracing::debug!(%kind, name, "exists"),
			(PartState::Exists, OnExists::RequireManual) => {
				tracing::warn!(%kind, name, "exists, remove it manually to re-create");
			}
		}
		Ok(())
	}
}

/// A root converger followed by ordered children.
pub struct TreeConverger<C> {
	root: Option<Box<dyn Converge<C>>>,
	children: Vec<Box<dyn Converge<C>>>,
}

impl<C> Default for TreeConverger<C> {
	fn default() -> Self {
		Self {
			root: None,
			children: Vec::new(),
		}
	}
}

impl<C> TreeConverger<C> {
	pub fn new(root: Option<Box<dyn Converge<C>>>) -> Self {
		Self {
			root,
			children: Vec::new(),
		}
	}

	pub fn push(&mut self, child: Box<dyn Converge<C>>) {
		self.children.push(child);
	}

	pub fn len(&self) -> usize {
		self.children.len()
	}

	pub fn is_empty(&self) -> bool {
		self.children.is_empty()
	}
}

#[async_trait]
impl<C: Send> Converge<C> for TreeConverger<C> {
	async fn converge(&self, client: &mut C) -> Result<(), ConvergeError> {
		if let Some(root) = &self.root {
			root.converge(client).await?;
		}
		for child in &self.children {
			child.converge(client).await?;
		}
		Ok(())
	}
}
