//! kiln-cli: Command-line interface for kiln.
//!
//! Provides the `kiln` command with subcommands:
//! - `kiln build` - Plan and execute an incremental build of the package
//! - `kiln info` - Show the libraries kiln discovers in the package

mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cmd::{BuildOpts, cmd_build, cmd_info};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Package-aware incremental builds for native code")]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Plan and execute an incremental build of the package
  Build(BuildOpts),

  /// Show the libraries kiln discovers in the package
  Info {
    /// Package root directory
    #[arg(long, default_value = ".")]
    project: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  // Logs go to stderr; stdout carries the build summary and forwarded
  // compiler diagnostics.
  let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
  FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .without_time()
    .with_writer(std::io::stderr)
    .init();

  match cli.command {
    Commands::Build(opts) => cmd_build(&opts),
    Commands::Info { project } => cmd_info(&project),
  }
}
