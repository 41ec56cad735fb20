//! Libraries on the filesystem and their manifests.
//!
//! A library is a directory with a `src/` tree (private sources and headers)
//! and/or an `include/` tree (public headers only). A package contains one
//! library at its root and any number under `libs/`. Each library carries a
//! manifest — loaded from `library.json` when present, synthesized from the
//! directory name otherwise — naming the library and the other libraries it
//! uses or links against.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::source::{SourceFile, SourceRoot};

/// Name of the per-library manifest file.
pub const LIBRARY_MANIFEST_FILE: &str = "library.json";

/// Subdirectory of a package root holding additional libraries.
pub const LIBS_SUBDIR: &str = "libs";

/// Errors raised while loading libraries from disk.
#[derive(Debug, Error)]
pub enum LibraryError {
  #[error("io error under {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid manifest {path}: {source}")]
  Manifest {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid usage reference '{text}': expected '<namespace>/<name>'")]
  BadUsageRef { text: String },

  #[error("library at {path} has neither src/ nor include/")]
  NotALibrary { path: PathBuf },
}

/// A reference to another library, as `<namespace>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsageRef {
  pub namespace: String,
  pub name: String,
}

impl UsageRef {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      namespace: namespace.into(),
      name: name.into(),
    }
  }
}

impl FromStr for UsageRef {
  type Err = LibraryError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once('/') {
      Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
        Ok(Self::new(namespace, name))
      }
      _ => Err(LibraryError::BadUsageRef { text: s.to_string() }),
    }
  }
}

impl TryFrom<String> for UsageRef {
  type Error = LibraryError;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    s.parse()
  }
}

impl From<UsageRef> for String {
  fn from(u: UsageRef) -> String {
    u.to_string()
  }
}

impl fmt::Display for UsageRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.namespace, self.name)
  }
}

/// The declarative manifest of a single library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryManifest {
  /// Library name, unique within its package.
  pub name: String,

  /// Libraries whose headers this library consumes at compile time.
  #[serde(default)]
  pub uses: Vec<UsageRef>,

  /// Additional link-time-only usages.
  #[serde(default)]
  pub links: Vec<UsageRef>,
}

impl LibraryManifest {
  /// Load `library.json` from a library directory, if present.
  pub fn load_from_directory(dir: &Path) -> Result<Option<Self>, LibraryError> {
    let path = dir.join(LIBRARY_MANIFEST_FILE);
    let content = match std::fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(LibraryError::Io { path, source: e }),
    };
    let manifest = serde_json::from_str(&content).map_err(|e| LibraryError::Manifest { path, source: e })?;
    Ok(Some(manifest))
  }

  /// Synthesize a manifest for a library with no `library.json`.
  pub fn synthesize(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }
}

/// A library that exists on the filesystem.
#[derive(Debug, Clone)]
pub struct LibraryRoot {
  /// Directory containing `src/` and/or `include/`.
  path: PathBuf,
  /// Path of this library relative to the package root. Used to namespace
  /// output artifacts; empty for the package-root library.
  path_namespace: PathBuf,
  /// Classified sources found under `src/`.
  src_sources: Vec<SourceFile>,
  /// Classified sources found under `include/`.
  include_sources: Vec<SourceFile>,
  /// The manifest (loaded or synthesized).
  manifest: LibraryManifest,
}

impl LibraryRoot {
  /// Load the library contained at `dir`.
  ///
  /// Collects sources from `src/` and `include/` and loads or synthesizes
  /// the manifest. Fails if neither source directory exists.
  pub fn from_directory(dir: &Path, path_namespace: impl Into<PathBuf>) -> Result<Self, LibraryError> {
    let path = dir.canonicalize().map_err(|e| LibraryError::Io {
      path: dir.to_path_buf(),
      source: e,
    })?;

    let manifest = match LibraryManifest::load_from_directory(&path)? {
      Some(manifest) => manifest,
      None => {
        let name = path
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_else(|| "library".to_string());
        debug!(library = %name, "no library manifest, synthesizing");
        LibraryManifest::synthesize(name)
      }
    };

    let mut lib = Self {
      path,
      path_namespace: path_namespace.into(),
      src_sources: Vec::new(),
      include_sources: Vec::new(),
      manifest,
    };

    let src = lib.src_source_root();
    let include = lib.include_source_root();
    if !src.exists() && !include.exists() {
      return Err(LibraryError::NotALibrary { path: lib.path });
    }

    let collect = |root: &SourceRoot| -> Result<Vec<SourceFile>, LibraryError> {
      if !root.exists() {
        return Ok(Vec::new());
      }
      root.collect_sources().map_err(|e| LibraryError::Io {
        path: root.path().to_path_buf(),
        source: e,
      })
    };
    lib.src_sources = collect(&src)?;
    lib.include_sources = collect(&include)?;
    Ok(lib)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Path of this library relative to the package root; prefix for all of
  /// its output artifacts.
  pub fn path_namespace(&self) -> &Path {
    &self.path_namespace
  }

  pub fn manifest(&self) -> &LibraryManifest {
    &self.manifest
  }

  /// Classified sources under `src/`.
  pub fn src_sources(&self) -> &[SourceFile] {
    &self.src_sources
  }

  /// Classified sources under `include/`.
  pub fn include_sources(&self) -> &[SourceFile] {
    &self.include_sources
  }

  /// All classified sources of this library.
  pub fn all_sources(&self) -> impl Iterator<Item = &SourceFile> {
    self.src_sources.iter().chain(self.include_sources.iter())
  }

  /// The `src/` tree: private sources and headers.
  pub fn src_source_root(&self) -> SourceRoot {
    SourceRoot::new(self.path.join("src"))
  }

  /// The `include/` tree: public headers only.
  pub fn include_source_root(&self) -> SourceRoot {
    SourceRoot::new(self.path.join("include"))
  }

  /// The directory dependees should add to their include search path.
  pub fn public_include_dir(&self) -> PathBuf {
    let include = self.path.join("include");
    if include.is_dir() { include } else { self.path.join("src") }
  }

  /// The directory added to the search path only while building this library
  /// itself.
  pub fn private_include_dir(&self) -> PathBuf {
    self.path.join("src")
  }
}

/// Collect every library of the package rooted at `where_`.
///
/// There may be a library directly at the root, and there may be more under
/// `libs/<name>/`. Results are ordered root-first, then lexicographically.
pub fn collect_libraries(where_: &Path) -> Result<Vec<LibraryRoot>, LibraryError> {
  let mut libraries = Vec::new();

  if where_.join("src").is_dir() || where_.join("include").is_dir() {
    libraries.push(LibraryRoot::from_directory(where_, PathBuf::new())?);
  }

  let libs_dir = where_.join(LIBS_SUBDIR);
  if libs_dir.is_dir() {
    let mut entries: Vec<_> = std::fs::read_dir(&libs_dir)
      .map_err(|e| LibraryError::Io {
        path: libs_dir.clone(),
        source: e,
      })?
      .collect::<Result<_, _>>()
      .map_err(|e| LibraryError::Io {
        path: libs_dir.clone(),
        source: e,
      })?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
      let path = entry.path();
      if !path.is_dir() {
        continue;
      }
      let namespace = PathBuf::from(LIBS_SUBDIR).join(entry.file_name());
      libraries.push(LibraryRoot::from_directory(&path, namespace)?);
    }
  }

  Ok(libraries)
}
