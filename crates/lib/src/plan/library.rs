//! The materialized plan for one library.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::library::{LibraryRoot, UsageRef};
use crate::source::{SourceFile, SourceKind};

use super::archive::CreateArchivePlan;
use super::compile_file::{CompileFilePlan, CompileRules};
use super::exe::LinkExecutablePlan;
use super::template::RenderTemplatePlan;
use super::{GEN_SUBDIR, LibraryBuildParams, LibraryKey};

/// Everything planned for one library: compiles, an optional archive, link
/// nodes for apps and tests, template renders, and header-independence
/// checks. Construction is pure; the plan is a value.
#[derive(Debug, Clone)]
pub struct LibraryPlan {
  /// Handle of the owning library in the build's library arena.
  pub library: LibraryKey,
  pub qual_name: String,
  /// This library's output tree: `<out_subdir>/<path_namespace>`.
  pub out_subdir: PathBuf,
  pub archive: Option<CreateArchivePlan>,
  pub executables: Vec<LinkExecutablePlan>,
  pub templates: Vec<RenderTemplatePlan>,
  /// Syntax-only compiles proving each header builds standalone. Never
  /// archived or linked.
  pub header_checks: Vec<CompileFilePlan>,
}

impl LibraryPlan {
  /// The codegen include directory rendered templates appear under, if this
  /// library has any templates.
  pub fn generated_include_dir(&self) -> Option<PathBuf> {
    self.templates.first().map(|t| t.out_dir.clone())
  }

  /// Every compile node of this plan, in deterministic order: archived
  /// sources, executable entry sources, header checks.
  pub fn compile_files(&self) -> impl Iterator<Item = &CompileFilePlan> {
    self
      .archive
      .iter()
      .flat_map(|a| a.compile_files.iter())
      .chain(self.executables.iter().map(|e| &e.main_compile))
      .chain(self.header_checks.iter())
  }

  /// Build the plan for `lib`.
  ///
  /// `usage_include_dirs` are the public include directories of the
  /// libraries this one uses (resolved by the package-level planner,
  /// transitively, in usage order).
  pub fn create(
    lib: &LibraryRoot,
    key: LibraryKey,
    params: &LibraryBuildParams,
    qual_name: Option<String>,
    usage_include_dirs: &[PathBuf],
  ) -> LibraryPlan {
    let out_dir = params.out_subdir.join(lib.path_namespace());
    let qual_name = qual_name.unwrap_or_else(|| lib.manifest().name.clone());

    // Partition the src/ sources by the role each file plays.
    let mut lib_sources: Vec<&SourceFile> = Vec::new();
    let mut app_sources: Vec<&SourceFile> = Vec::new();
    let mut test_sources: Vec<&SourceFile> = Vec::new();
    let mut template_sources: Vec<&SourceFile> = Vec::new();
    let mut header_sources: Vec<&SourceFile> = Vec::new();
    for sfile in lib.src_sources() {
      match sfile.kind {
        SourceKind::Source => lib_sources.push(sfile),
        SourceKind::App => app_sources.push(sfile),
        SourceKind::Test => test_sources.push(sfile),
        SourceKind::HeaderTemplate => template_sources.push(sfile),
        SourceKind::Header => header_sources.push(sfile),
        // Classified, but contributes to no plan node.
        SourceKind::HeaderImpl => {}
      }
    }

    let mut public_header_sources: Vec<&SourceFile> = Vec::new();
    for sfile in lib.include_sources() {
      if !sfile.kind.is_header() {
        warn!(
          file = %sfile.path.display(),
          "public include/ should only contain header or header template files"
        );
      } else if sfile.kind == SourceKind::Header {
        public_header_sources.push(sfile);
      }
    }

    if !params.build_tests {
      header_sources.clear();
      public_header_sources.clear();
    }

    // Base compile rules for the library's own sources.
    let mut compile_rules = CompileRules::default();
    compile_rules.add_include_dir(lib.public_include_dir());
    for dir in usage_include_dirs {
      compile_rules.add_include_dir(dir.clone());
    }
    compile_rules.enable_warnings = params.enable_warnings;
    compile_rules.uses = lib.manifest().uses.clone();

    let codegen_dir = params.out_subdir.join(GEN_SUBDIR).join(lib.path_namespace());
    if !template_sources.is_empty() {
      compile_rules.add_include_dir(&codegen_dir);
    }

    // Public-header checks see only the public face of the library; private
    // headers and library sources additionally see src/.
    let mut public_header_rules = compile_rules.clone();
    public_header_rules.syntax_only = true;
    let mut src_header_rules = public_header_rules.clone();
    src_header_rules.add_include_dir(lib.private_include_dir());
    compile_rules.add_include_dir(lib.private_include_dir());

    let obj_dir = out_dir.join("obj");
    let lib_compile_files: Vec<CompileFilePlan> = lib_sources
      .iter()
      .map(|sf| CompileFilePlan::new(compile_rules.clone(), (*sf).clone(), qual_name.clone(), obj_dir.clone()))
      .collect();

    // Syntax-only pass proving each header compiles in isolation.
    let timestamps_dir = out_dir.join("timestamps");
    let mut header_checks: Vec<CompileFilePlan> = header_sources
      .iter()
      .map(|sf| CompileFilePlan::new(src_header_rules.clone(), (*sf).clone(), qual_name.clone(), timestamps_dir.clone()))
      .collect();
    header_checks.extend(public_header_sources.iter().map(|sf| {
      CompileFilePlan::new(
        public_header_rules.clone(),
        (*sf).clone(),
        qual_name.clone(),
        timestamps_dir.clone(),
      )
    }));

    let archive = if lib_compile_files.is_empty() {
      debug!(library = %qual_name, "no compiled inputs, no archive will be generated");
      None
    } else {
      debug!(library = %qual_name, objects = lib_compile_files.len(), "planning static archive");
      Some(CreateArchivePlan {
        name: lib.manifest().name.clone(),
        qual_name: qual_name.clone(),
        out_dir: out_dir.clone(),
        compile_files: lib_compile_files,
      })
    };

    // Link inputs: manifest uses, then link-only usages, first occurrence
    // wins.
    let mut links: Vec<UsageRef> = Vec::new();
    extend_usages(&mut links, lib.manifest().uses.iter().cloned());
    extend_usages(&mut links, lib.manifest().links.iter().cloned());

    // Tests may carry additional usage requirements.
    let mut test_rules = compile_rules.clone();
    extend_usages(&mut test_rules.uses, params.test_uses.iter().cloned());
    let mut test_links = links.clone();
    extend_usages(&mut test_links, params.test_uses.iter().cloned());

    let mut executables: Vec<LinkExecutablePlan> = Vec::new();
    for source in app_sources.iter().chain(test_sources.iter()) {
      let is_test = source.kind == SourceKind::Test;
      if is_test && !params.build_tests {
        continue;
      }
      if !is_test && !params.build_apps {
        continue;
      }
      let subdir_base = if is_test { out_dir.join("test") } else { out_dir.clone() };
      let subdir = match source.relative.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => subdir_base.join(parent),
        _ => subdir_base,
      };
      let rules = if is_test { test_rules.clone() } else { compile_rules.clone() };
      let exe_links = if is_test { test_links.clone() } else { links.clone() };
      executables.push(LinkExecutablePlan {
        links: exe_links,
        main_compile: CompileFilePlan::new(rules, (*source).clone(), qual_name.clone(), obj_dir.clone()),
        out_subdir: subdir,
        name: source.stem(),
        is_test,
      });
    }

    let templates: Vec<RenderTemplatePlan> = template_sources
      .iter()
      .map(|sf| RenderTemplatePlan {
        source: (*sf).clone(),
        out_dir: codegen_dir.clone(),
      })
      .collect();

    LibraryPlan {
      library: key,
      qual_name,
      out_subdir: out_dir,
      archive,
      executables,
      templates,
      header_checks,
    }
  }
}

/// Append usages, keeping the first occurrence of each.
fn extend_usages(target: &mut Vec<UsageRef>, extra: impl IntoIterator<Item = UsageRef>) {
  for usage in extra {
    if !target.contains(&usage) {
      target.push(usage);
    }
  }
}
