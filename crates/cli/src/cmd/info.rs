//! Implementation of the `kiln info` command.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use kiln_lib::library::collect_libraries;
use kiln_lib::pkg::PackageManifest;
use kiln_lib::source::SourceKind;

use crate::output::symbols;

/// Show the libraries kiln discovers in a package.
pub fn cmd_info(project: &Path) -> Result<()> {
  let project = project
    .canonicalize()
    .with_context(|| format!("cannot open project directory {}", project.display()))?;

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

  println!("{} {} {}", "Package".bold(), package.name, package.version);

  let libraries = collect_libraries(&project).context("collecting libraries")?;
  if libraries.is_empty() {
    println!("  (no libraries found)");
    return Ok(());
  }

  for lib in &libraries {
    let count = |kind: SourceKind| lib.all_sources().filter(|s| s.kind == kind).count();
    let namespace = if lib.path_namespace().as_os_str().is_empty() {
      ".".to_string()
    } else {
      lib.path_namespace().display().to_string()
    };

    println!();
    println!("  {} {}", symbols::INFO.cyan(), lib.manifest().name.bold());
    println!("    path: {namespace}");
    println!(
      "    sources: {} compiled, {} headers, {} templates, {} apps, {} tests",
      count(SourceKind::Source),
      count(SourceKind::Header),
      count(SourceKind::HeaderTemplate),
      count(SourceKind::App),
      count(SourceKind::Test),
    );
    if !lib.manifest().uses.is_empty() {
      let uses: Vec<String> = lib.manifest().uses.iter().map(|u| u.to_string()).collect();
      println!("    uses: {}", uses.join(", "));
    }
    if !lib.manifest().links.is_empty() {
      let links: Vec<String> = lib.manifest().links.iter().map(|u| u.to_string()).collect();
      println!("    links: {}", links.join(", "));
    }
  }
  Ok(())
}
