//! The archive node of a library plan.

use std::path::PathBuf;

use crate::toolchain::Toolchain;

use super::compile_file::CompileFilePlan;

/// Plan to collect a library's compiled objects into a static archive.
/// Exists iff the library has at least one compiled source.
#[derive(Debug, Clone)]
pub struct CreateArchivePlan {
  /// The library's short name (names the archive file).
  pub name: String,
  pub qual_name: String,
  pub out_dir: PathBuf,
  /// The compile nodes whose objects feed the archive.
  pub compile_files: Vec<CompileFilePlan>,
}

impl CreateArchivePlan {
  pub fn archive_file_path(&self, tc: &Toolchain) -> PathBuf {
    self.out_dir.join(tc.archive_file_name(&self.name))
  }

  /// Object files feeding the archive, in plan order.
  pub fn object_paths(&self, tc: &Toolchain) -> Vec<PathBuf> {
    self.compile_files.iter().map(|c| c.output_path(tc)).collect()
  }

  pub fn command(&self, tc: &Toolchain) -> Vec<String> {
    tc.archive_command(&self.object_paths(tc), &self.archive_file_path(tc))
  }
}
