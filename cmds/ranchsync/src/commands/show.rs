//! Show command handler.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::util::{load_descriptor, ValuesArgs};

#[derive(Args, Debug, Clone, Default)]
pub struct ShowArgs {
	/// Descriptor file to show
	pub file: PathBuf,

	/// Parent descriptor to merge the file into
	#[arg(long)]
	pub parent: Option<PathBuf>,

	#[command(flatten)]
	pub values: ValuesArgs,
}

/// Print the rendered and merged descriptor as YAML.
pub fn run<W: Write>(args: ShowArgs, mut writer: W) -> Result<()> {
	let loaded = load_descriptor(&args.file, args.parent.as_deref(), &args.values)?;
	let yaml = serde_yaml_with_quirks::to_string(&loaded.descriptor)
		.context("serializing descriptor")?;
	writer.write_all(yaml.as_bytes())?;
	if !yaml.ends_with('\n') {
		writeln!(writer)?;
	}
	Ok(())
}
