//! Header-dependency discovery and the staleness oracle.
//!
//! Compilers report which headers a translation unit consumed in one of two
//! dialects: a Make-style listing (`out: in1 in2 ...`, GNU family, written to
//! a sidecar file) or prefix lines on stdout (`Note: including file: ...`,
//! MSVC family). This module normalizes both into a [`FileDepsInfo`],
//! persists it through the metadata store, and answers the question the
//! executor asks before every compile: can the existing artifact be reused?

use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::db::{Database, DbError};
use crate::util::paths::weakly_canonical;
use crate::util::shlex;

/// Which dialect of dependency report a toolchain emits, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepsMode {
  /// No dependency information; every build is stale.
  None,
  /// Make-style listing written to a sidecar file.
  Gnu,
  /// Prefix lines on stdout, marked by a toolchain-supplied leader string.
  Msvc { leader: String },
}

/// Normalized dependency information for one output artifact. This is the
/// unit persisted to the metadata store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDepsInfo {
  /// The artifact that was produced.
  pub output: PathBuf,
  /// Every input consumed while producing it, in reported order.
  pub inputs: Vec<PathBuf>,
  /// The command that produced it, byte-for-byte as invoked.
  pub command: String,
}

/// Result of parsing MSVC-style output: the dependency information plus the
/// compiler's remaining diagnostics with the dependency chatter removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsvcDepsInfo {
  pub deps: FileDepsInfo,
  pub cleaned_output: String,
}

/// A prior build of an output, as remembered by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorCompilation {
  /// Recorded inputs whose mtime no longer matches (or that no longer
  /// exist, or could not be stat'ed).
  pub newer_inputs: Vec<PathBuf>,
  /// The command that produced the artifact last time.
  pub previous_command: String,
}

/// Read and parse a Make-style dependency sidecar file.
pub fn parse_mkfile_deps_file(path: &Path) -> std::io::Result<FileDepsInfo> {
  let content = std::fs::read_to_string(path)?;
  Ok(parse_mkfile_deps_str(&content))
}

/// Parse a Make-style dependency listing: `<output>: <input1> <input2> ...`
/// with `\<newline>` continuations.
///
/// A malformed listing (empty after tokenization, or a head without the
/// trailing colon) is logged and produces the empty value; downstream that
/// reads as "no dependency information", which conservatively forces a
/// recompile on the next invocation.
pub fn parse_mkfile_deps_str(input: &str) -> FileDepsInfo {
  // Collapse escaped newlines, then tokenize the collapsed form.
  let collapsed = input.replace("\\\r\n", " ").replace("\\\n", " ");
  let mut tokens = shlex::split(&collapsed).into_iter();

  let Some(head) = tokens.next() else {
    error!("invalid dependency listing: shell split was empty");
    return FileDepsInfo::default();
  };
  let Some(output) = head.strip_suffix(':') else {
    error!("invalid dependency listing: leader item '{head}' is not colon-terminated");
    return FileDepsInfo::default();
  };

  FileDepsInfo {
    output: PathBuf::from(output),
    inputs: tokens.map(PathBuf::from).collect(),
    command: String::new(),
  }
}

/// Parse MSVC-style output for dependency lines.
///
/// Every line whose trimmed form starts with `leader` contributes one input
/// (weakly canonicalized). All other lines are preserved verbatim, in order,
/// as the cleaned output the executor forwards to the user's console.
pub fn parse_msvc_output_for_deps(output: &str, leader: &str) -> MsvcDepsInfo {
  let mut deps = FileDepsInfo::default();
  let mut cleaned_output = String::new();

  for full_line in output.lines() {
    let trimmed = full_line.trim();
    match trimmed.strip_prefix(leader) {
      Some(rest) => deps.inputs.push(weakly_canonical(Path::new(rest.trim()))),
      None => {
        cleaned_output.push_str(full_line);
        cleaned_output.push('\n');
      }
    }
  }
  if !cleaned_output.is_empty() {
    cleaned_output.pop();
  }

  MsvcDepsInfo { deps, cleaned_output }
}

/// Commit fresh dependency information to the store.
///
/// Records the command, forgets the prior inputs, and records each new
/// `(input, mtime)` pair — as one atomic unit. A crash mid-update leaves
/// either the full prior record or the full new record.
pub fn update_deps_info(db: &Database, deps: &FileDepsInfo) -> Result<(), DbError> {
  db.transact(|tx| {
    tx.record_compilation(&deps.output, &deps.command)?;
    tx.forget_inputs_of(&deps.output)?;
    for input in &deps.inputs {
      let mtime = file_mtime_ns(input);
      if mtime.is_none() {
        warn!(input = %input.display(), "cannot stat reported input; it will always read as changed");
      }
      tx.record_dep(input, &deps.output, mtime)?;
    }
    Ok(())
  })
}

/// The staleness oracle.
///
/// Returns `None` when the store has no complete record for `output_path`
/// (no prior build). Otherwise returns the previous command together with
/// the recorded inputs that have changed since: missing, un-stat-able, or
/// carrying a different mtime.
pub fn get_prior_compilation(db: &Database, output_path: &Path) -> Result<Option<PriorCompilation>, DbError> {
  db.transact(|tx| {
    let Some(previous_command) = tx.command_of(output_path)? else {
      return Ok(None);
    };
    let Some(inputs) = tx.inputs_of(output_path)? else {
      return Ok(None);
    };

    let newer_inputs = inputs
      .into_iter()
      .filter(|input| input.last_mtime.is_none() || file_mtime_ns(&input.path) != input.last_mtime)
      .map(|input| input.path)
      .collect();

    Ok(Some(PriorCompilation {
      newer_inputs,
      previous_command,
    }))
  })
}

/// Modification time of a file in nanoseconds since the Unix epoch, or
/// `None` when the file cannot be stat'ed.
pub fn file_mtime_ns(path: &Path) -> Option<i64> {
  let metadata = std::fs::metadata(path).ok()?;
  let mtime = metadata.modified().ok()?;
  match mtime.duration_since(std::time::UNIX_EPOCH) {
    Ok(after) => i64::try_from(after.as_nanos()).ok(),
    Err(before) => Some(-i64::try_from(before.duration().as_nanos()).ok()?),
  }
}
