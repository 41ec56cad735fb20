//! Toolchain description and command synthesis.
//!
//! A toolchain knows how to turn plan nodes into argv vectors: compile a
//! translation unit, archive objects into a static library, link an
//! executable. It also selects the dependency-report dialect the compiler
//! emits (the [`DepsMode`] the executor dispatches on).
//!
//! Command synthesis is deterministic and order-stable: the quoted-joined
//! argv is the executor's identity for a node, so any change to flags must
//! change the synthesized command.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::deps::DepsMode;
use crate::plan::CompileRules;

/// Leader string MSVC-family compilers print before each included file.
pub const MSVC_DEPS_LEADER: &str = "Note: including file:";

/// A configured toolchain.
#[derive(Debug, Clone)]
pub struct Toolchain {
  pub compiler: PathBuf,
  /// Base flags for an object-emitting compile (e.g. `-c`).
  pub compile_flags: Vec<String>,
  /// Flags for a syntax-only pass; replaces `compile_flags`.
  pub syntax_only_flags: Vec<String>,
  pub warning_flags: Vec<String>,
  /// Include-directory flag; fused with the directory (`-I<dir>`, `/I<dir>`).
  pub include_flag: String,
  /// Object-output flag. Slash-style flags are fused with the path
  /// (`/Fo<out>`); dash-style take the path as a separate argument.
  pub object_out_flag: String,
  pub archiver: PathBuf,
  pub archive_flags: Vec<String>,
  pub linker: PathBuf,
  pub link_out_flag: String,
  pub deps_mode: DepsMode,
  pub object_suffix: String,
  pub archive_prefix: String,
  pub archive_suffix: String,
  pub executable_suffix: String,
}

impl Toolchain {
  /// A GNU-family toolchain (gcc/clang driver interface).
  pub fn gnu(compiler: impl Into<PathBuf>) -> Self {
    let compiler = compiler.into();
    Self {
      linker: compiler.clone(),
      compiler,
      compile_flags: vec!["-c".into()],
      syntax_only_flags: vec!["-fsyntax-only".into()],
      warning_flags: vec!["-Wall".into(), "-Wextra".into(), "-Wpedantic".into()],
      include_flag: "-I".into(),
      object_out_flag: "-o".into(),
      archiver: PathBuf::from("ar"),
      archive_flags: vec!["rcs".into()],
      link_out_flag: "-o".into(),
      deps_mode: DepsMode::Gnu,
      object_suffix: ".o".into(),
      archive_prefix: "lib".into(),
      archive_suffix: ".a".into(),
      executable_suffix: String::new(),
    }
  }

  /// An MSVC-family toolchain (cl.exe interface).
  pub fn msvc() -> Self {
    Self {
      compiler: PathBuf::from("cl.exe"),
      compile_flags: vec!["/c".into(), "/nologo".into()],
      syntax_only_flags: vec!["/Zs".into(), "/nologo".into()],
      warning_flags: vec!["/W4".into()],
      include_flag: "/I".into(),
      object_out_flag: "/Fo".into(),
      archiver: PathBuf::from("lib.exe"),
      archive_flags: vec!["/nologo".into()],
      linker: PathBuf::from("link.exe"),
      link_out_flag: "/OUT:".into(),
      deps_mode: DepsMode::Msvc {
        leader: MSVC_DEPS_LEADER.to_string(),
      },
      object_suffix: ".obj".into(),
      archive_prefix: String::new(),
      archive_suffix: ".lib".into(),
      executable_suffix: ".exe".into(),
    }
  }

  /// Synthesize the argv for compiling `source` to `output` under `rules`.
  pub fn compile_command(&self, rules: &CompileRules, source: &Path, output: &Path) -> Vec<String> {
    let mut argv = vec![self.compiler.to_string_lossy().into_owned()];

    if rules.syntax_only {
      argv.extend(self.syntax_only_flags.iter().cloned());
    } else {
      argv.extend(self.compile_flags.iter().cloned());
    }
    if rules.enable_warnings {
      argv.extend(self.warning_flags.iter().cloned());
    }
    for dir in &rules.include_dirs {
      argv.push(format!("{}{}", self.include_flag, dir.display()));
    }

    match &self.deps_mode {
      DepsMode::None => {}
      DepsMode::Gnu => {
        argv.push("-MD".into());
        argv.push("-MF".into());
        argv.push(self.deps_file_for(output).to_string_lossy().into_owned());
      }
      DepsMode::Msvc { .. } => argv.push("/showIncludes".into()),
    }

    if !rules.syntax_only {
      argv.extend(self.out_args(&self.object_out_flag, output));
    }
    argv.push(source.to_string_lossy().into_owned());
    argv
  }

  /// Synthesize the argv for archiving `objects` into `output`.
  pub fn archive_command(&self, objects: &[PathBuf], output: &Path) -> Vec<String> {
    let mut argv = vec![self.archiver.to_string_lossy().into_owned()];
    argv.extend(self.archive_flags.iter().cloned());
    argv.push(output.to_string_lossy().into_owned());
    argv.extend(objects.iter().map(|o| o.to_string_lossy().into_owned()));
    argv
  }

  /// Synthesize the argv for linking `inputs` (objects and archives, in
  /// order) into the executable `output`.
  pub fn link_command(&self, inputs: &[PathBuf], output: &Path) -> Vec<String> {
    let mut argv = vec![self.linker.to_string_lossy().into_owned()];
    argv.extend(inputs.iter().map(|i| i.to_string_lossy().into_owned()));
    argv.extend(self.out_args(&self.link_out_flag, output));
    argv
  }

  /// Sidecar file a GNU-mode compile writes its dependency listing to.
  pub fn deps_file_for(&self, output: &Path) -> PathBuf {
    let mut os: OsString = output.as_os_str().to_os_string();
    os.push(".d");
    PathBuf::from(os)
  }

  /// File name of the archive for a library called `name`.
  pub fn archive_file_name(&self, name: &str) -> String {
    format!("{}{}{}", self.archive_prefix, name, self.archive_suffix)
  }

  fn out_args(&self, flag: &str, output: &Path) -> Vec<String> {
    // Slash-style (MSVC) options fuse the value onto the flag.
    if flag.starts_with('/') {
      vec![format!("{}{}", flag, output.display())]
    } else {
      vec![flag.to_string(), output.to_string_lossy().into_owned()]
    }
  }
}

/// Errors loading a toolchain description file.
#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("cannot read toolchain file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid toolchain file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Which compiler family a toolchain file starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainFamily {
  Gnu,
  Msvc,
}

/// Dependency-mode selection in a toolchain file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepsModeConfig {
  None,
  Gnu,
  Msvc,
}

/// A toolchain description file: a family preset plus overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
  pub family: ToolchainFamily,
  #[serde(default)]
  pub compiler: Option<PathBuf>,
  #[serde(default)]
  pub archiver: Option<PathBuf>,
  #[serde(default)]
  pub linker: Option<PathBuf>,
  #[serde(default)]
  pub compile_flags: Option<Vec<String>>,
  #[serde(default)]
  pub warning_flags: Option<Vec<String>>,
  #[serde(default)]
  pub deps_mode: Option<DepsModeConfig>,
  /// Leader string for MSVC-style dependency output.
  #[serde(default)]
  pub deps_leader: Option<String>,
}

impl ToolchainConfig {
  /// Load a toolchain description from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ToolchainError> {
    let content = std::fs::read_to_string(path).map_err(|e| ToolchainError::Io {
      path: path.to_path_buf(),
      source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ToolchainError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  /// Materialize the toolchain: family preset with overrides applied.
  pub fn into_toolchain(self) -> Toolchain {
    let mut tc = match self.family {
      ToolchainFamily::Gnu => Toolchain::gnu(self.compiler.unwrap_or_else(|| PathBuf::from("c++"))),
      ToolchainFamily::Msvc => {
        let mut tc = Toolchain::msvc();
        if let Some(compiler) = self.compiler {
          tc.compiler = compiler;
        }
        tc
      }
    };
    if let Some(archiver) = self.archiver {
      tc.archiver = archiver;
    }
    if let Some(linker) = self.linker {
      tc.linker = linker;
    }
    if let Some(flags) = self.compile_flags {
      tc.compile_flags = flags;
    }
    if let Some(flags) = self.warning_flags {
      tc.warning_flags = flags;
    }
    match self.deps_mode {
      Some(DepsModeConfig::None) => tc.deps_mode = DepsMode::None,
      Some(DepsModeConfig::Gnu) => tc.deps_mode = DepsMode::Gnu,
      Some(DepsModeConfig::Msvc) => {
        tc.deps_mode = DepsMode::Msvc {
          leader: self.deps_leader.unwrap_or_else(|| MSVC_DEPS_LEADER.to_string()),
        };
      }
      None => {
        if let (DepsMode::Msvc { leader }, Some(custom)) = (&mut tc.deps_mode, self.deps_leader) {
          *leader = custom;
        }
      }
    }
    tc
  }
}
