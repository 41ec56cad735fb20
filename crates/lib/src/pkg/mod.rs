//! Package manifests, dependency ranges, and the repository interface.
//!
//! A package manifest (`kiln.json`) names the package, its version, and the
//! packages it depends on. Dependency strings carry an acceptance strength:
//! `name@1.2.3` (exact), `name~1.2.3` (patch may move), `name^1.2.3`
//! (anything within the major), `name+1.2.3` (anything at least the base).
//! A repository — any implementor of [`Repository`] — answers candidate
//! queries; resolution picks the highest acceptable candidate and recurses
//! through its own dependencies.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the package manifest file at a package root.
pub const PACKAGE_MANIFEST_FILE: &str = "kiln.json";

/// Errors parsing or resolving package dependencies.
#[derive(Debug, Error)]
pub enum PkgError {
  #[error("invalid version '{text}': expected MAJOR.MINOR.PATCH")]
  BadVersion { text: String },

  #[error("invalid dependency '{text}': expected '<name>[@^~+]<version>'")]
  BadDependency { text: String },

  #[error("no candidate satisfies dependency '{dependency}'")]
  NoCandidate { dependency: Dependency },

  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid package manifest {path}: {source}")]
  Manifest {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// A `major.minor.patch` version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
  pub major: u64,
  pub minor: u64,
  pub patch: u64,
}

impl Version {
  pub fn new(major: u64, minor: u64, patch: u64) -> Self {
    Self { major, minor, patch }
  }
}

impl FromStr for Version {
  type Err = PkgError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bad = || PkgError::BadVersion { text: s.to_string() };
    let mut parts = s.split('.');
    let mut next = || -> Result<u64, PkgError> {
      parts.next().ok_or_else(|| bad())?.parse().map_err(|_| bad())
    };
    let version = Version::new(next()?, next()?, next()?);
    if parts.next().is_some() {
      return Err(bad());
    }
    Ok(version)
  }
}

impl TryFrom<String> for Version {
  type Error = PkgError;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    s.parse()
  }
}

impl From<Version> for String {
  fn from(v: Version) -> String {
    v.to_string()
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

/// How far from the base version a candidate may stray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStrength {
  /// Only the exact version.
  Exact,
  /// The patch component may move up (`~`).
  Patch,
  /// Minor and patch may move up within the major (`^`).
  Minor,
  /// Anything at least the base version (`+`).
  Major,
}

impl VersionStrength {
  fn marker(self) -> char {
    match self {
      VersionStrength::Exact => '@',
      VersionStrength::Patch => '~',
      VersionStrength::Minor => '^',
      VersionStrength::Major => '+',
    }
  }
}

/// A dependency on another package: a name, a base version, and a strength.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  pub name: String,
  pub version: Version,
  pub strength: VersionStrength,
}

impl Dependency {
  /// Parse a depends string: `fmt@6.0.0`, `zlib~1.2.0`, `spdlog^1.4.0`,
  /// `curl+7.60.2`.
  pub fn parse(text: &str) -> Result<Self, PkgError> {
    let bad = || PkgError::BadDependency { text: text.to_string() };
    let (marker_pos, marker) = text
      .char_indices()
      .find(|(_, c)| matches!(c, '@' | '~' | '^' | '+'))
      .ok_or_else(|| bad())?;
    let (name, marked_version) = text.split_at(marker_pos);
    if name.is_empty() {
      return Err(bad());
    }
    let strength = match marker {
      '@' => VersionStrength::Exact,
      '~' => VersionStrength::Patch,
      '^' => VersionStrength::Minor,
      '+' => VersionStrength::Major,
      _ => unreachable!("find matched one of the markers"),
    };
    let version: Version = marked_version[marker.len_utf8()..].parse().map_err(|_| bad())?;
    Ok(Self {
      name: name.to_string(),
      version,
      strength,
    })
  }

  /// Whether `candidate` satisfies this dependency.
  pub fn accepts(&self, candidate: &Version) -> bool {
    let base = &self.version;
    match self.strength {
      VersionStrength::Exact => candidate == base,
      VersionStrength::Patch => {
        candidate.major == base.major && candidate.minor == base.minor && candidate.patch >= base.patch
      }
      VersionStrength::Minor => candidate.major == base.major && candidate >= base,
      VersionStrength::Major => candidate >= base,
    }
  }
}

impl fmt::Display for Dependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}{}", self.name, self.strength.marker(), self.version)
  }
}

/// A package a repository can provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCandidate {
  pub name: String,
  pub version: Version,
  /// Root directory of the unpacked package.
  pub root: PathBuf,
}

/// A source of package candidates. Remote repositories and their transport
/// live outside the engine; the executor only ever sees this interface.
pub trait Repository {
  /// All known candidates for `dep`'s package name that satisfy it.
  fn find_candidates(&self, dep: &Dependency) -> Vec<PackageCandidate>;
}

/// Resolve a dependency list against a repository.
///
/// Picks the highest acceptable candidate for each dependency and recurses
/// into that candidate's own manifest, depth-first, skipping names already
/// resolved. There is no backtracking solver; the first resolution of a
/// name wins.
pub fn find_dependencies(repo: &dyn Repository, deps: &[Dependency]) -> Result<Vec<PackageCandidate>, PkgError> {
  let mut acc: Vec<PackageCandidate> = Vec::new();
  for dep in deps {
    do_find_deps(repo, dep, &mut acc)?;
  }
  Ok(acc)
}

fn do_find_deps(repo: &dyn Repository, dep: &Dependency, acc: &mut Vec<PackageCandidate>) -> Result<(), PkgError> {
  if acc.iter().any(|c| c.name == dep.name) {
    return Ok(());
  }

  let mut candidates = repo.find_candidates(dep);
  candidates.sort_by(|a, b| match a.version.cmp(&b.version) {
    Ordering::Equal => a.root.cmp(&b.root),
    other => other,
  });
  let Some(best) = candidates.pop() else {
    return Err(PkgError::NoCandidate { dependency: dep.clone() });
  };
  debug!(name = %best.name, version = %best.version, "resolved dependency");

  let transitive = match PackageManifest::load_from_directory(&best.root)? {
    Some(manifest) => manifest.dependencies()?,
    None => Vec::new(),
  };
  acc.push(best);
  for dep in &transitive {
    do_find_deps(repo, dep, acc)?;
  }
  Ok(())
}

/// The manifest of a package: `kiln.json` at its root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageManifest {
  pub name: String,
  pub version: Version,
  /// Depends strings, parsed on demand via [`PackageManifest::dependencies`].
  #[serde(default)]
  pub depends: Vec<String>,
}

impl PackageManifest {
  /// Load `kiln.json` from a package root, if present.
  pub fn load_from_directory(dir: &Path) -> Result<Option<Self>, PkgError> {
    let path = dir.join(PACKAGE_MANIFEST_FILE);
    let content = match std::fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(PkgError::Io { path, source: e }),
    };
    let manifest = serde_json::from_str(&content).map_err(|e| PkgError::Manifest { path, source: e })?;
    Ok(Some(manifest))
  }

  /// Synthesize a manifest for a package with no `kiln.json`.
  pub fn synthesize(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: Version::new(0, 0, 0),
      depends: Vec::new(),
    }
  }

  /// Parse the depends strings.
  pub fn dependencies(&self) -> Result<Vec<Dependency>, PkgError> {
    self.depends.iter().map(|d| Dependency::parse(d)).collect()
  }
}

/// A repository over a local directory of unpacked packages, laid out as
/// `<root>/<name>@<version>/`.
#[derive(Debug, Clone)]
pub struct DirRepository {
  root: PathBuf,
}

impl DirRepository {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

impl Repository for DirRepository {
  fn find_candidates(&self, dep: &Dependency) -> Vec<PackageCandidate> {
    let Ok(entries) = std::fs::read_dir(&self.root) else {
      return Vec::new();
    };
    let mut candidates = Vec::new();
    for entry in entries.flatten() {
      if !entry.path().is_dir() {
        continue;
      }
      let file_name = entry.file_name();
      let Some((name, version)) = file_name.to_string_lossy().split_once('@').map(|(n, v)| (n.to_string(), v.to_string()))
      else {
        continue;
      };
      let Ok(version) = version.parse::<Version>() else {
        continue;
      };
      if name == dep.name && dep.accepts(&version) {
        candidates.push(PackageCandidate {
          name,
          version,
          root: entry.path(),
        });
      }
    }
    candidates
  }
}
