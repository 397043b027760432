//! Apply command handler.
//!
//! Parses each descriptor, merges it into the parent when one is given and
//! converges it against Rancher. Descriptors are applied one after another,
//! each with its own session.

use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Args;
use tracing::instrument;

use super::util::{load_descriptor, ConnectionArgs, LoadedDescriptor, ValuesArgs};
use crate::{
	api::{http::HttpClientFactory, ClientFactory},
	client::Session,
	config::{resolve_connection, ConnectionOverrides},
	converge::{descriptor_converger, Converge},
};

#[derive(Args, Debug, Clone, Default)]
pub struct ApplyArgs {
	/// Descriptor files to apply, in order
	#[arg(required = true)]
	pub files: Vec<PathBuf>,

	/// Parent descriptor merged under every file
	#[arg(long)]
	pub parent: Option<PathBuf>,

	#[command(flatten)]
	pub values: ValuesArgs,

	#[command(flatten)]
	pub connection: ConnectionArgs,

	/// Keep applying the remaining files after a failure
	#[arg(long)]
	pub keep_going: bool,
}

/// Outcome of an apply run.
#[derive(Debug, Default)]
pub struct ApplyReport {
	pub applied: Vec<PathBuf>,
	pub failed: Vec<(PathBuf, anyhow::Error)>,
}

impl ApplyReport {
	pub fn is_success(&self) -> bool {
		self.failed.is_empty()
	}
}

/// Run the apply command.
pub fn run<W: Write>(args: ApplyArgs, writer: W) -> Result<()> {
	let factory = HttpClientFactory::new().context("creating HTTP client")?;

	// Create a tokio runtime for async operations
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	let report = runtime.block_on(apply_files(&args, Arc::new(factory), writer))?;
	if !report.is_success() {
		for (path, err) in &report.failed {
			tracing::error!(path = %path.display(), "{err:#}");
		}
		anyhow::bail!(
			"{} of {} descriptors failed to apply",
			report.failed.len(),
			report.failed.len() + report.applied.len()
		);
	}
	Ok(())
}

/// Converge one loaded descriptor with a fresh session.
#[instrument(skip_all, fields(path = %loaded.path.display(), kind = %loaded.descriptor.kind()))]
async fn apply_descriptor(
	loaded: &LoadedDescriptor,
	overrides: &ConnectionOverrides,
	factory: Arc<dyn ClientFactory>,
) -> Result<()> {
	let converger = descriptor_converger::<Session>(&loaded.descriptor)?;
	let settings = resolve_connection(overrides, loaded.descriptor.metadata(), &loaded.config)?;
	tracing::debug!(url = %settings.url, "connecting");
	let mut session = Session::connect(settings, factory)?;
	converger.converge(&mut session).await?;
	Ok(())
}

/// Apply every file in `args`, writing one line per applied descriptor.
///
/// Without `keep_going` the first failure is returned as an error. With it,
/// failures are collected into the report and the remaining files still run.
pub async fn apply_files<W: Write>(
	args: &ApplyArgs,
	factory: Arc<dyn ClientFactory>,
	mut writer: W,
) -> Result<ApplyReport> {
	let overrides = ConnectionOverrides::from(&args.connection);
	let mut report = ApplyReport::default();

	for path in &args.files {
		let result = async {
			let loaded = load_descriptor(path, args.parent.as_deref(), &args.values)?;
			apply_descriptor(&loaded, &overrides, factory.clone()).await
		}
		.await
		.with_context(|| format!("applying {}", path.display()));

		match result {
			Ok(()) => {
				writeln!(writer, "applied {}", path.display())?;
				report.applied.push(path.clone());
			}
			Err(err) if args.keep_going => {
				tracing::warn!(path = %path.display(), "{err:#}");
				report.failed.push((path.clone(), err));
			}
			Err(err) => return Err(err),
		}
	}

	Ok(report)
}
