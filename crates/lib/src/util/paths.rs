//! Path normalization helpers.
//!
//! Dependency reports from MSVC-family compilers contain paths that may not
//! exist on the machine consuming them (rebuilds from stored metadata on a
//! different host). Canonicalization therefore has to degrade gracefully:
//! lexical-first, with symlink resolution only for prefixes that exist.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: collapse `.` components and resolve `..`
/// against preceding components without touching the filesystem.
///
/// Leading `..` components (and `..` at a filesystem root) are preserved,
/// since there is nothing to pop them against.
pub fn lexically_normal(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if matches!(out.components().next_back(), Some(Component::Normal(_))) {
          out.pop();
        } else if !matches!(out.components().next_back(), Some(Component::RootDir | Component::Prefix(_))) {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Canonicalize a path as far as the filesystem allows.
///
/// If the whole path exists it is fully canonicalized. Otherwise the longest
/// existing prefix is canonicalized and the remainder is appended in
/// lexically-normalized form, so paths that do not exist on this machine keep
/// a stable spelling instead of producing an error.
pub fn weakly_canonical(path: &Path) -> PathBuf {
  if let Ok(canonical) = path.canonicalize() {
    return canonical;
  }

  let normal = lexically_normal(path);
  let mut prefix = PathBuf::new();
  let mut rest = PathBuf::new();
  let mut prefix_done = false;
  for component in normal.components() {
    if prefix_done {
      rest.push(component.as_os_str());
      continue;
    }
    let mut probe = prefix.clone();
    probe.push(component.as_os_str());
    if probe.exists() {
      prefix = probe;
    } else {
      prefix_done = true;
      rest.push(component.as_os_str());
    }
  }

  if prefix.as_os_str().is_empty() {
    return normal;
  }
  match prefix.canonicalize() {
    Ok(canonical) => canonical.join(rest),
    Err(_) => normal,
  }
}
