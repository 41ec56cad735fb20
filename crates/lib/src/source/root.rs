//! A single source directory and its collected files.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{SourceFile, classify};

/// One of a library's source directories (`src/` or `include/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
  path: PathBuf,
}

impl SourceRoot {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn exists(&self) -> bool {
    self.path.is_dir()
  }

  /// Walk the root and classify every regular file.
  ///
  /// Unclassifiable files are skipped. Results are ordered lexicographically
  /// by absolute path so that plans built from them are deterministic.
  pub fn collect_sources(&self) -> io::Result<Vec<SourceFile>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(&self.path).follow_links(true) {
      let entry = entry.map_err(io::Error::other)?;
      if !entry.file_type().is_file() {
        continue;
      }
      let Some(kind) = classify(entry.path()) else {
        continue;
      };
      let relative = entry
        .path()
        .strip_prefix(&self.path)
        .expect("walked entries live under the walk root")
        .to_path_buf();
      sources.push(SourceFile {
        path: entry.path().to_path_buf(),
        kind,
        relative,
      });
    }
    sources.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(sources)
  }
}
