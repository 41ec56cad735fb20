//! Types for plan execution.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DbError;
use crate::plan::RenderError;
use crate::proc::ProcError;

/// Errors attached to individual nodes or, for store errors, aborting the
/// whole build.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// Toolchain process exited nonzero (or died to a signal).
  #[error("command failed with exit code {code:?}: {command}")]
  CommandFailed { command: String, code: Option<i32> },

  /// Toolchain process could not be spawned at all.
  #[error(transparent)]
  Proc(#[from] ProcError),

  /// Metadata-store failure. Fatal: reuse decisions cannot be trusted.
  #[error("metadata store error: {0}")]
  Db(#[from] DbError),

  /// Template rendering failed.
  #[error(transparent)]
  Render(#[from] RenderError),

  /// Filesystem error preparing or finalizing a node's artifact.
  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Why a node was never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// An earlier node failed; no new nodes are scheduled after the first
  /// failure.
  Cancelled,
}

impl std::fmt::Display for SkipReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SkipReason::Cancelled => write!(f, "cancelled after earlier failure"),
    }
  }
}

/// Aggregate result of one executor run.
#[derive(Debug, Default)]
pub struct BuildSummary {
  /// Template outputs rewritten this run.
  pub rendered: Vec<PathBuf>,
  /// Artifacts produced by actually running the toolchain.
  pub compiled: Vec<PathBuf>,
  /// Artifacts reused because the staleness oracle proved them fresh.
  pub reused: Vec<PathBuf>,
  /// Nodes that ran and failed, with their errors.
  pub failed: Vec<(PathBuf, ExecuteError)>,
  /// Nodes never attempted.
  pub skipped: Vec<(PathBuf, SkipReason)>,
}

impl BuildSummary {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  /// Total number of nodes accounted for.
  pub fn total(&self) -> usize {
    self.rendered.len() + self.compiled.len() + self.reused.len() + self.failed.len() + self.skipped.len()
  }
}

/// Configuration for one executor run.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Upper bound on concurrently running toolchain processes.
  pub parallelism: usize,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
    }
  }
}
