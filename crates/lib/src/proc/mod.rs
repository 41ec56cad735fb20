//! Subprocess spawn-and-wait.
//!
//! The executor's only interaction with the toolchain is through here:
//! spawn an argv, wait for it, capture both output streams.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tracing::debug;

/// Errors spawning a toolchain process (distinct from the process itself
/// exiting nonzero, which is reported through [`ProcessOutput`]).
#[derive(Debug, Error)]
pub enum ProcError {
  #[error("cannot spawn '{program}': {source}")]
  Spawn {
    program: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("empty command")]
  EmptyCommand,
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
  /// Exit code; `None` when the process was killed by a signal.
  pub status_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.status_code == Some(0)
  }
}

/// Run an argv to completion, capturing stdout and stderr.
pub async fn run_command(argv: &[String]) -> Result<ProcessOutput, ProcError> {
  let [program, args @ ..] = argv else {
    return Err(ProcError::EmptyCommand);
  };

  debug!(program = %program, args = args.len(), "spawning");

  let output = tokio::process::Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await
    .map_err(|e| ProcError::Spawn {
      program: PathBuf::from(program),
      source: e,
    })?;

  Ok(ProcessOutput {
    status_code: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}
