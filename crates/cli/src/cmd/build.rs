//! Implementation of the `kiln build` command.
//!
//! Discovers the package's libraries, constructs the build plan, and runs
//! the plan executor against the configured toolchain and the build's
//! metadata store. Prints a summary with counts of compiled, reused, and
//! failed nodes.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Args;
use owo_colors::OwoColorize;

use kiln_lib::db::{DB_FILE_NAME, Database};
use kiln_lib::execute::{ExecuteConfig, execute_plan};
use kiln_lib::library::collect_libraries;
use kiln_lib::pkg::PackageManifest;
use kiln_lib::plan::{BuildPlan, LibraryBuildParams};
use kiln_lib::toolchain::{Toolchain, ToolchainConfig};

use crate::output::{format_duration, symbols};

#[derive(Debug, Args)]
pub struct BuildOpts {
  /// Package root directory
  #[arg(long, default_value = ".")]
  pub project: PathBuf,

  /// Build output directory (relative paths resolve against the project)
  #[arg(long, default_value = "_build")]
  pub out: PathBuf,

  /// Toolchain: "gnu", "msvc", or a path to a toolchain JSON file
  #[arg(long, default_value = "gnu")]
  pub toolchain: String,

  /// Maximum number of parallel toolchain processes
  #[arg(short = 'j', long)]
  pub jobs: Option<usize>,

  /// Skip test executables and header-independence checks
  #[arg(long)]
  pub no_tests: bool,

  /// Skip application executables
  #[arg(long)]
  pub no_apps: bool,

  /// Disable the toolchain's warning flags
  #[arg(long)]
  pub no_warnings: bool,
}

/// Execute the build command.
pub fn cmd_build(opts: &BuildOpts) -> Result<()> {
  let started = Instant::now();

  let project = opts
    .project
    .canonicalize()
    .with_context(|| format!("cannot open project directory {}", opts.project.display()))?;

  let package = match PackageManifest::load_from_directory(&project)? {
    Some(manifest) => manifest,
    None => {
      let name = project
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
      PackageManifest::synthesize(name)
    }
  };

  let libraries = collect_libraries(&project).context("collecting libraries")?;
  if libraries.is_empty() {
    bail!("no libraries found under {} (expected src/ or include/)", project.display());
  }

  let out_subdir = if opts.out.is_absolute() {
    opts.out.clone()
  } else {
    project.join(&opts.out)
  };
  let params = LibraryBuildParams {
    out_subdir,
    build_tests: !opts.no_tests,
    build_apps: !opts.no_apps,
    enable_warnings: !opts.no_warnings,
    test_uses: Vec::new(),
  };

  let plan = BuildPlan::create(&package.name, &package.version.to_string(), libraries, &params)?;
  let tc = select_toolchain(&opts.toolchain)?;
  let db = Database::open(&params.out_subdir.join(DB_FILE_NAME))?;

  let mut config = ExecuteConfig::default();
  if let Some(jobs) = opts.jobs {
    config.parallelism = jobs.max(1);
  }

  let rt = tokio::runtime::Runtime::new().context("cannot create async runtime")?;
  let summary = rt.block_on(execute_plan(&plan, &tc, &db, &config))?;

  println!();
  if summary.is_success() {
    println!(
      "{} {}",
      symbols::SUCCESS.green(),
      format!("Build complete in {}", format_duration(started.elapsed())).bold()
    );
  } else {
    println!("{} {}", symbols::ERROR.red(), "Build failed".bold());
  }
  println!("  Rendered: {}", summary.rendered.len());
  println!("  Compiled: {}", summary.compiled.len());
  println!("  Reused: {}", summary.reused.len());

  if !summary.is_success() {
    println!("  Failed: {}", summary.failed.len());
    println!("  Skipped: {}", summary.skipped.len());
    for (output, error) in &summary.failed {
      eprintln!("{} {}: {}", symbols::ERROR.red(), output.display(), error);
    }
    bail!("build failed");
  }
  Ok(())
}

fn select_toolchain(spec: &str) -> Result<Toolchain> {
  match spec {
    "gnu" => {
      let compiler = std::env::var_os("CXX").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("c++"));
      Ok(Toolchain::gnu(compiler))
    }
    "msvc" => Ok(Toolchain::msvc()),
    path => {
      let config =
        ToolchainConfig::load(Path::new(path)).with_context(|| format!("loading toolchain file {path}"))?;
      Ok(config.into_toolchain())
    }
  }
}
