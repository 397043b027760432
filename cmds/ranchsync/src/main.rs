use anyhow::Result;
use clap::{Parser, Subcommand};
use ranchsync::{
	commands::{self, util::BrokenPipeGuard},
	telemetry::{self, LogFormat},
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "ranchsync")]
#[command(about = "Converge Rancher clusters and projects to their descriptors", long_about = None)]
#[command(version)]
struct Cli {
	/// Log level (error, warn, info, debug, trace). Overrides RUST_LOG
	#[arg(long, global = true)]
	log_level: Option<Level>,

	/// Log format on stderr
	#[arg(long, global = true, value_enum, default_value_t)]
	log_format: LogFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Converge descriptors against Rancher
	Apply(commands::apply::ApplyArgs),

	/// Print a descriptor after templating and merging
	Show(commands::show::ShowArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let _telemetry = telemetry::init(cli.log_level, cli.log_format)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Apply(args) => commands::apply::run(args, stdout),
		Commands::Show(args) => commands::show::run(args, stdout),
	}
}
