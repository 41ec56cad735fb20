//! Compile rules and the leaf compile node of a plan.

use std::path::{Path, PathBuf};

use crate::library::UsageRef;
use crate::source::SourceFile;
use crate::toolchain::Toolchain;

/// Rules applied to a group of compiled files.
///
/// Cloned and specialized per file group: a library's own sources, its
/// public-header checks, its private-header checks, and its tests each get
/// their own variant of the base rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileRules {
  /// Include search directories, in order, deduplicated by first occurrence.
  pub include_dirs: Vec<PathBuf>,
  /// Libraries whose headers these files consume.
  pub uses: Vec<UsageRef>,
  pub enable_warnings: bool,
  /// Exercise the compiler front-end only; the node's artifact is a
  /// sentinel file, not an object.
  pub syntax_only: bool,
}

impl CompileRules {
  /// Append an include directory unless it is already present.
  pub fn add_include_dir(&mut self, dir: impl Into<PathBuf>) {
    let dir = dir.into();
    if !self.include_dirs.contains(&dir) {
      self.include_dirs.push(dir);
    }
  }
}

/// A planned compilation of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFilePlan {
  pub rules: CompileRules,
  pub source: SourceFile,
  /// Qualified name of the owning library (diagnostics only).
  pub qual_name: String,
  /// Directory the artifact lands in (an `obj/` or `timestamps/` tree).
  pub out_dir: PathBuf,
}

impl CompileFilePlan {
  pub fn new(rules: CompileRules, source: SourceFile, qual_name: impl Into<String>, out_dir: PathBuf) -> Self {
    Self {
      rules,
      source,
      qual_name: qual_name.into(),
      out_dir,
    }
  }

  /// Path of the artifact this node produces: the source's relative path
  /// under `out_dir`, with the object (or sentinel) suffix appended to the
  /// full filename so `foo.c` and `foo.cpp` never collide.
  pub fn output_path(&self, tc: &Toolchain) -> PathBuf {
    let suffix: &str = if self.rules.syntax_only { ".stamp" } else { &tc.object_suffix };
    let mut path = self.out_dir.join(&self.source.relative);
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    path.set_file_name(format!("{file_name}{suffix}"));
    path
  }

  /// The argv this node runs.
  pub fn command(&self, tc: &Toolchain) -> Vec<String> {
    tc.compile_command(&self.rules, &self.source.path, &self.output_path(tc))
  }

  pub fn source_path(&self) -> &Path {
    &self.source.path
  }
}
