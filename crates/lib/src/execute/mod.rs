//! Plan execution.
//!
//! Walks a build plan in dependency order:
//! 1. Render header templates (rewritten only when content changes).
//! 2. Compile nodes, concurrently up to the configured parallelism.
//! 3. Archive nodes, once every compile they consume has completed.
//! 4. Link nodes, once the archives they consume exist.
//!
//! Before every node the staleness oracle is consulted; a node whose inputs
//! are unchanged and whose intended command matches the stored one is reused
//! without touching the toolchain. After every successful node the metadata
//! store is updated atomically.
//!
//! On the first failure no new node is started; in-flight subprocesses are
//! not interrupted and their results are still committed.

pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::deps::{
  DepsMode, FileDepsInfo, get_prior_compilation, parse_mkfile_deps_file, parse_msvc_output_for_deps, update_deps_info,
};
use crate::plan::{BuildPlan, CompileFilePlan, LibraryPlan, LinkExecutablePlan, RenderTemplatePlan, TemplateContext};
use crate::proc;
use crate::toolchain::Toolchain;
use crate::util::shlex;

pub use types::{BuildSummary, ExecuteConfig, ExecuteError, SkipReason};

/// What happened to one node.
enum NodeOutcome {
  /// The toolchain ran and produced the artifact.
  Compiled,
  /// The artifact was fresh and reused.
  Reused,
  /// The node ran and failed; the error stays local to the node.
  Failed(ExecuteError),
  /// The node was never started (cancellation).
  Skipped,
}

/// An archive or link node: a plain command whose inputs are known exactly,
/// cached through the store like any compile.
struct CachedCommandNode {
  output: PathBuf,
  argv: Vec<String>,
  inputs: Vec<PathBuf>,
}

/// Execute a build plan against a toolchain and metadata store.
///
/// Node failures (toolchain exit, I/O on a node's artifact) are collected in
/// the returned [`BuildSummary`]; only metadata-store errors abort the build
/// with an `Err`, because without the store reuse decisions cannot be
/// trusted.
pub async fn execute_plan(
  plan: &BuildPlan,
  tc: &Toolchain,
  db: &Database,
  config: &ExecuteConfig,
) -> Result<BuildSummary, ExecuteError> {
  info!(
    package = plan.package_name(),
    libraries = plan.plans().count(),
    parallelism = config.parallelism,
    "executing build plan"
  );

  let mut summary = BuildSummary::default();
  let mut cancelled = false;

  render_phase(plan, &mut summary, &mut cancelled).await;

  let compile_nodes: Vec<CompileFilePlan> = plan.plans().flat_map(|p| p.compile_files().cloned()).collect();
  let fatal = compile_phase(compile_nodes, tc, db, config, &mut summary, &mut cancelled).await;
  if let Some(e) = fatal {
    return Err(e);
  }

  let archive_nodes: Vec<CachedCommandNode> = plan
    .plans()
    .filter_map(|p| p.archive.as_ref())
    .map(|archive| CachedCommandNode {
      output: archive.archive_file_path(tc),
      argv: archive.command(tc),
      inputs: archive.object_paths(tc),
    })
    .collect();
  let fatal = cached_phase(archive_nodes, db, config, &mut summary, &mut cancelled).await;
  if let Some(e) = fatal {
    return Err(e);
  }

  let link_nodes: Vec<CachedCommandNode> = plan
    .plans()
    .flat_map(|lib_plan| {
      lib_plan.executables.iter().map(move |exe| {
        let inputs = link_inputs(plan, lib_plan, exe, tc);
        let output = exe.output_path(tc);
        CachedCommandNode {
          argv: tc.link_command(&inputs, &output),
          output,
          inputs,
        }
      })
    })
    .collect();
  let fatal = cached_phase(link_nodes, db, config, &mut summary, &mut cancelled).await;
  if let Some(e) = fatal {
    return Err(e);
  }

  info!(
    rendered = summary.rendered.len(),
    compiled = summary.compiled.len(),
    reused = summary.reused.len(),
    failed = summary.failed.len(),
    skipped = summary.skipped.len(),
    "build plan execution complete"
  );
  Ok(summary)
}

/// Everything an executable links against, in order: its own object, its
/// library's archive, then the archives of its usage closure.
fn link_inputs(plan: &BuildPlan, lib_plan: &LibraryPlan, exe: &LinkExecutablePlan, tc: &Toolchain) -> Vec<PathBuf> {
  let mut inputs = vec![exe.main_compile.output_path(tc)];
  if let Some(archive) = &lib_plan.archive {
    inputs.push(archive.archive_file_path(tc));
  }
  for archive in plan.resolve_link_archives(&exe.links, tc) {
    if !inputs.contains(&archive) {
      inputs.push(archive);
    }
  }
  inputs
}

/// Render every template, rewriting outputs only on content change so that
/// mtimes of unchanged headers stay stable and dependent compiles stay
/// fresh.
async fn render_phase(plan: &BuildPlan, summary: &mut BuildSummary, cancelled: &mut bool) {
  'plans: for lib_plan in plan.plans() {
    if lib_plan.templates.is_empty() {
      continue;
    }
    let lib = plan.library(lib_plan.library);
    let ctx = TemplateContext {
      package: plan.package_name().to_string(),
      version: plan.package_version().to_string(),
      library: lib.manifest().name.clone(),
      qual_name: lib_plan.qual_name.clone(),
    };
    for template in &lib_plan.templates {
      let output = template.output_path();
      match render_one(template, &ctx, &output).await {
        Ok(true) => {
          debug!(output = %output.display(), "rendered template");
          summary.rendered.push(output);
        }
        Ok(false) => summary.reused.push(output),
        Err(e) => {
          error!(output = %output.display(), error = %e, "template render failed");
          summary.failed.push((output, e));
          *cancelled = true;
          break 'plans;
        }
      }
    }
  }
}

async fn render_one(template: &RenderTemplatePlan, ctx: &TemplateContext, output: &Path) -> Result<bool, ExecuteError> {
  let content = template.render(ctx)?;
  if let Ok(existing) = tokio::fs::read_to_string(output).await
    && existing == content
  {
    return Ok(false);
  }
  if let Some(parent) = output.parent() {
    tokio::fs::create_dir_all(parent).await.map_err(|e| ExecuteError::Io {
      path: parent.to_path_buf(),
      source: e,
    })?;
  }
  tokio::fs::write(output, &content).await.map_err(|e| ExecuteError::Io {
    path: output.to_path_buf(),
    source: e,
  })?;
  Ok(true)
}

/// Run all compile nodes concurrently under the worker-pool bound.
///
/// Returns a fatal store error, if one occurred; node-local failures land in
/// the summary and flip the cancellation flag.
async fn compile_phase(
  nodes: Vec<CompileFilePlan>,
  tc: &Toolchain,
  db: &Database,
  config: &ExecuteConfig,
  summary: &mut BuildSummary,
  cancelled: &mut bool,
) -> Option<ExecuteError> {
  if *cancelled {
    for node in nodes {
      summary.skipped.push((node.output_path(tc), SkipReason::Cancelled));
    }
    return None;
  }

  let cancel = Arc::new(AtomicBool::new(false));
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set: JoinSet<(PathBuf, Result<NodeOutcome, ExecuteError>)> = JoinSet::new();

  for node in nodes {
    let tc = tc.clone();
    let db = db.clone();
    let cancel = cancel.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      let _permit = semaphore.acquire().await.unwrap();
      let output = node.output_path(&tc);

      // Cancellation stops nodes that have not spawned their subprocess;
      // it never interrupts one that has.
      if cancel.load(Ordering::SeqCst) {
        return (output, Ok(NodeOutcome::Skipped));
      }

      let result = run_compile_node(&node, &tc, &db).await;
      if matches!(&result, Ok(NodeOutcome::Failed(_)) | Err(_)) {
        cancel.store(true, Ordering::SeqCst);
      }
      (output, result)
    });
  }

  let fatal = collect_phase_results(&mut join_set, summary, &cancel).await;
  if cancel.load(Ordering::SeqCst) {
    *cancelled = true;
  }
  fatal
}

/// Run archive or link nodes, each a cached command with explicit inputs.
async fn cached_phase(
  nodes: Vec<CachedCommandNode>,
  db: &Database,
  config: &ExecuteConfig,
  summary: &mut BuildSummary,
  cancelled: &mut bool,
) -> Option<ExecuteError> {
  if *cancelled {
    for node in nodes {
      summary.skipped.push((node.output, SkipReason::Cancelled));
    }
    return None;
  }

  let cancel = Arc::new(AtomicBool::new(false));
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set: JoinSet<(PathBuf, Result<NodeOutcome, ExecuteError>)> = JoinSet::new();

  for node in nodes {
    let db = db.clone();
    let cancel = cancel.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      let _permit = semaphore.acquire().await.unwrap();
      if cancel.load(Ordering::SeqCst) {
        return (node.output, Ok(NodeOutcome::Skipped));
      }
      let result = run_cached_node(&node, &db).await;
      if matches!(&result, Ok(NodeOutcome::Failed(_)) | Err(_)) {
        cancel.store(true, Ordering::SeqCst);
      }
      (node.output, result)
    });
  }

  let fatal = collect_phase_results(&mut join_set, summary, &cancel).await;
  if cancel.load(Ordering::SeqCst) {
    *cancelled = true;
  }
  fatal
}

/// Drain a phase's join set, recording every outcome. In-flight work always
/// completes and commits; the first fatal error is returned after the drain.
async fn collect_phase_results(
  join_set: &mut JoinSet<(PathBuf, Result<NodeOutcome, ExecuteError>)>,
  summary: &mut BuildSummary,
  cancel: &Arc<AtomicBool>,
) -> Option<ExecuteError> {
  let mut fatal = None;
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((output, Ok(outcome))) => record_outcome(summary, output, outcome),
      Ok((output, Err(e))) => {
        error!(output = %output.display(), error = %e, "metadata store failure");
        if fatal.is_none() {
          fatal = Some(e);
        }
      }
      Err(e) => {
        error!(error = %e, "executor task panicked");
        cancel.store(true, Ordering::SeqCst);
      }
    }
  }
  fatal
}

fn record_outcome(summary: &mut BuildSummary, output: PathBuf, outcome: NodeOutcome) {
  match outcome {
    NodeOutcome::Compiled => summary.compiled.push(output),
    NodeOutcome::Reused => summary.reused.push(output),
    NodeOutcome::Skipped => summary.skipped.push((output, SkipReason::Cancelled)),
    NodeOutcome::Failed(e) => {
      error!(output = %output.display(), error = %e, "build node failed");
      summary.failed.push((output, e));
    }
  }
}

/// Run one compile node: consult the oracle, invoke the toolchain, parse the
/// emitted dependency info, commit the update protocol.
async fn run_compile_node(node: &CompileFilePlan, tc: &Toolchain, db: &Database) -> Result<NodeOutcome, ExecuteError> {
  let output = node.output_path(tc);
  let argv = node.command(tc);
  let command = shlex::join(&argv);

  if let Some(prior) = get_prior_compilation(db, &output)?
    && prior.newer_inputs.is_empty()
    && prior.previous_command == command
    && output.exists()
  {
    debug!(output = %output.display(), "artifact is fresh, skipping compile");
    return Ok(NodeOutcome::Reused);
  }

  debug!(source = %node.source_path().display(), library = %node.qual_name, "compiling");
  if let Some(parent) = output.parent()
    && let Err(e) = tokio::fs::create_dir_all(parent).await
  {
    return Ok(NodeOutcome::Failed(ExecuteError::Io {
      path: parent.to_path_buf(),
      source: e,
    }));
  }

  let result = match proc::run_command(&argv).await {
    Ok(result) => result,
    Err(e) => return Ok(NodeOutcome::Failed(e.into())),
  };

  // MSVC-family compilers interleave dependency chatter with diagnostics on
  // stdout; separate the two before anything reaches the user's console.
  let mut reported_inputs: Vec<PathBuf> = Vec::new();
  match &tc.deps_mode {
    DepsMode::Msvc { leader } => {
      let parsed = parse_msvc_output_for_deps(&result.stdout, leader);
      forward_diagnostics(&parsed.cleaned_output, &result.stderr);
      reported_inputs = parsed.deps.inputs;
      // The report lists included headers only; the translation unit itself
      // is an input too.
      reported_inputs.insert(0, node.source_path().to_path_buf());
    }
    _ => forward_diagnostics(&result.stdout, &result.stderr),
  }

  if !result.success() {
    return Ok(NodeOutcome::Failed(ExecuteError::CommandFailed {
      command,
      code: result.status_code,
    }));
  }

  // A syntax-only node's artifact is its sentinel.
  if node.rules.syntax_only
    && let Err(e) = tokio::fs::write(&output, b"").await
  {
    return Ok(NodeOutcome::Failed(ExecuteError::Io {
      path: output.clone(),
      source: e,
    }));
  }

  if let DepsMode::Gnu = tc.deps_mode {
    let deps_file = tc.deps_file_for(&output);
    match parse_mkfile_deps_file(&deps_file) {
      Ok(info) if !info.inputs.is_empty() => reported_inputs = info.inputs,
      Ok(_) => {}
      Err(e) => error!(file = %deps_file.display(), error = %e, "cannot read dependency sidecar"),
    }
  }

  if reported_inputs.is_empty() {
    // No usable dependency information; leave no record so the next
    // invocation conservatively recompiles.
    debug!(output = %output.display(), "no dependency info recorded");
    return Ok(NodeOutcome::Compiled);
  }

  update_deps_info(
    db,
    &FileDepsInfo {
      output,
      inputs: reported_inputs,
      command,
    },
  )?;
  Ok(NodeOutcome::Compiled)
}

/// Run one archive/link node. Inputs are known exactly, so the record
/// written after success needs no parsing.
async fn run_cached_node(node: &CachedCommandNode, db: &Database) -> Result<NodeOutcome, ExecuteError> {
  let command = shlex::join(&node.argv);

  if let Some(prior) = get_prior_compilation(db, &node.output)?
    && prior.newer_inputs.is_empty()
    && prior.previous_command == command
    && node.output.exists()
  {
    debug!(output = %node.output.display(), "artifact is fresh, skipping");
    return Ok(NodeOutcome::Reused);
  }

  debug!(output = %node.output.display(), "producing");
  if let Some(parent) = node.output.parent()
    && let Err(e) = tokio::fs::create_dir_all(parent).await
  {
    return Ok(NodeOutcome::Failed(ExecuteError::Io {
      path: parent.to_path_buf(),
      source: e,
    }));
  }

  let result = match proc::run_command(&node.argv).await {
    Ok(result) => result,
    Err(e) => return Ok(NodeOutcome::Failed(e.into())),
  };
  forward_diagnostics(&result.stdout, &result.stderr);
  if !result.success() {
    return Ok(NodeOutcome::Failed(ExecuteError::CommandFailed {
      command,
      code: result.status_code,
    }));
  }

  update_deps_info(
    db,
    &FileDepsInfo {
      output: node.output.clone(),
      inputs: node.inputs.clone(),
      command,
    },
  )?;
  Ok(NodeOutcome::Compiled)
}

/// Forward toolchain output to the user's console. One write per stream so
/// interleaved worker output stays line-atomic.
fn forward_diagnostics(stdout: &str, stderr: &str) {
  if !stdout.trim().is_empty() {
    let mut buf = stdout.to_string();
    if !buf.ends_with('\n') {
      buf.push('\n');
    }
    print!("{buf}");
  }
  if !stderr.trim().is_empty() {
    let mut buf = stderr.to_string();
    if !buf.ends_with('\n') {
      buf.push('\n');
    }
    eprint!("{buf}");
  }
}
