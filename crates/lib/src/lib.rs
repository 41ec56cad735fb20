//! kiln-lib: core engine for the kiln build orchestrator.
//!
//! Given a source tree organized into libraries (conventional `src/` and
//! `include/` layouts) and a declarative manifest of inter-library uses,
//! kiln builds a plan of compile, archive, link, and template-render nodes,
//! executes it against a configured toolchain, and records per-artifact
//! dependency metadata so later invocations recompile only what changed.
//!
//! - `source` / `library`: discovery and classification of a package's files
//! - `plan`: pure build-plan construction
//! - `toolchain`: command synthesis and dependency-mode selection
//! - `deps`: dependency-report parsing and the staleness oracle
//! - `db`: the durable metadata store
//! - `execute`: the parallel plan executor
//! - `pkg`: package dependency ranges and the repository interface

pub mod db;
pub mod deps;
pub mod execute;
pub mod library;
pub mod pkg;
pub mod plan;
pub mod proc;
pub mod source;
pub mod toolchain;
pub mod util;
