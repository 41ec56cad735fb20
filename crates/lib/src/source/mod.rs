//! Source file discovery and classification.
//!
//! A library's `src/` and `include/` trees are walked and every file is
//! classified by extension and directory role into exactly one
//! [`SourceKind`]. Classification is purely lexical; the planner decides
//! what each kind contributes to the build.

mod root;

pub use root::SourceRoot;

use std::path::{Path, PathBuf};

/// Extensions of compilable translation units.
const SOURCE_EXTS: &[&str] = &["c", "cc", "cpp", "cxx"];

/// Extensions of header files.
const HEADER_EXTS: &[&str] = &["h", "h++", "hh", "hpp", "hxx", "inc"];

/// Extensions of inline-implementation partners to headers.
const HEADER_IMPL_EXTS: &[&str] = &["inl", "ipp"];

/// The role a source file plays in a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
  /// A translation unit compiled into the library archive.
  Source,
  /// A header.
  Header,
  /// An inline-implementation partner to a header. Classified but never
  /// referenced by any plan.
  HeaderImpl,
  /// A header rendered from a template into the codegen tree.
  HeaderTemplate,
  /// A translation unit with its own `main`, linked as an application.
  App,
  /// A translation unit linked as a test executable.
  Test,
}

impl SourceKind {
  /// Whether this kind is acceptable in a public `include/` tree.
  pub fn is_header(self) -> bool {
    matches!(self, SourceKind::Header | SourceKind::HeaderTemplate)
  }
}

/// A classified file discovered under a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
  /// Absolute path of the file.
  pub path: PathBuf,
  /// The classification of the file.
  pub kind: SourceKind,
  /// Path of the file relative to the source root that discovered it.
  pub relative: PathBuf,
}

impl SourceFile {
  /// The executable stem for an app/test source: the filename with both the
  /// language extension and the role marker stripped (`foo.test.cpp` → `foo`).
  pub fn stem(&self) -> String {
    let once = self.path.file_stem().unwrap_or_default();
    let twice = Path::new(once).file_stem().unwrap_or(once);
    twice.to_string_lossy().into_owned()
  }
}

/// Classify a file by its name alone.
///
/// Returns `None` for files that play no role in a build (documentation,
/// build scripts, editor droppings); those are skipped during collection.
pub fn classify(path: &Path) -> Option<SourceKind> {
  let ext = extension_of(path)?;
  let penultimate = penultimate_extension_of(path);

  if HEADER_EXTS.contains(&ext.as_str()) {
    if penultimate.as_deref() == Some("in") {
      return Some(SourceKind::HeaderTemplate);
    }
    return Some(SourceKind::Header);
  }
  if HEADER_IMPL_EXTS.contains(&ext.as_str()) {
    return Some(SourceKind::HeaderImpl);
  }
  if SOURCE_EXTS.contains(&ext.as_str()) {
    if penultimate.as_deref() == Some("test") {
      return Some(SourceKind::Test);
    }
    // `foo.main.cpp` is an app entry, and so is a bare `main.cpp`.
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_lowercase());
    if penultimate.as_deref() == Some("main") || stem.as_deref() == Some("main") {
      return Some(SourceKind::App);
    }
    return Some(SourceKind::Source);
  }
  None
}

fn extension_of(path: &Path) -> Option<String> {
  path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn penultimate_extension_of(path: &Path) -> Option<String> {
  let stem = path.file_stem()?;
  Path::new(stem).extension().map(|e| e.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kind_of(name: &str) -> Option<SourceKind> {
    classify(Path::new(name))
  }

  #[test]
  fn classifies_translation_units() {
    assert_eq!(kind_of("a.c"), Some(SourceKind::Source));
    assert_eq!(kind_of("a.cc"), Some(SourceKind::Source));
    assert_eq!(kind_of("a.cpp"), Some(SourceKind::Source));
    assert_eq!(kind_of("a.cxx"), Some(SourceKind::Source));
  }

  #[test]
  fn classifies_tests_and_apps_by_penultimate_extension() {
    assert_eq!(kind_of("foo.test.cpp"), Some(SourceKind::Test));
    assert_eq!(kind_of("foo.test.c"), Some(SourceKind::Test));
    assert_eq!(kind_of("foo.main.cpp"), Some(SourceKind::App));
    assert_eq!(kind_of("foo.main.cc"), Some(SourceKind::App));
    // The marker has to be the penultimate extension, not a name fragment.
    assert_eq!(kind_of("maintest.cpp"), Some(SourceKind::Source));
    assert_eq!(kind_of("test_foo.cpp"), Some(SourceKind::Source));
  }

  #[test]
  fn bare_main_is_an_app_entry() {
    assert_eq!(kind_of("main.cpp"), Some(SourceKind::App));
    assert_eq!(kind_of("main.c"), Some(SourceKind::App));
    // Only `main` gets that treatment.
    assert_eq!(kind_of("test.cpp"), Some(SourceKind::Source));
    assert_eq!(kind_of("domain.cpp"), Some(SourceKind::Source));
  }

  #[test]
  fn classifies_headers() {
    assert_eq!(kind_of("a.h"), Some(SourceKind::Header));
    assert_eq!(kind_of("a.hpp"), Some(SourceKind::Header));
    assert_eq!(kind_of("a.hh"), Some(SourceKind::Header));
    assert_eq!(kind_of("a.inc"), Some(SourceKind::Header));
  }

  #[test]
  fn classifies_header_impls() {
    assert_eq!(kind_of("a.inl"), Some(SourceKind::HeaderImpl));
    assert_eq!(kind_of("a.ipp"), Some(SourceKind::HeaderImpl));
  }

  #[test]
  fn classifies_header_templates() {
    assert_eq!(kind_of("config.in.hpp"), Some(SourceKind::HeaderTemplate));
    assert_eq!(kind_of("version.in.h"), Some(SourceKind::HeaderTemplate));
    // `.in` only counts directly before the header extension.
    assert_eq!(kind_of("login.hpp"), Some(SourceKind::Header));
  }

  #[test]
  fn uppercase_extensions_are_recognized() {
    assert_eq!(kind_of("A.CPP"), Some(SourceKind::Source));
    assert_eq!(kind_of("A.HPP"), Some(SourceKind::Header));
  }

  #[test]
  fn unknown_files_are_unclassified() {
    assert_eq!(kind_of("README.md"), None);
    assert_eq!(kind_of("Makefile"), None);
    assert_eq!(kind_of("a.o"), None);
  }

  #[test]
  fn stem_strips_two_extensions() {
    let sf = SourceFile {
      path: PathBuf::from("/x/foo.test.cpp"),
      kind: SourceKind::Test,
      relative: PathBuf::from("foo.test.cpp"),
    };
    assert_eq!(sf.stem(), "foo");

    let sf = SourceFile {
      path: PathBuf::from("/x/app.main.c"),
      kind: SourceKind::App,
      relative: PathBuf::from("app.main.c"),
    };
    assert_eq!(sf.stem(), "app");

    let sf = SourceFile {
      path: PathBuf::from("/x/plain.cpp"),
      kind: SourceKind::Source,
      relative: PathBuf::from("plain.cpp"),
    };
    assert_eq!(sf.stem(), "plain");
  }

  #[test]
  fn header_kind_predicate() {
    assert!(SourceKind::Header.is_header());
    assert!(SourceKind::HeaderTemplate.is_header());
    assert!(!SourceKind::HeaderImpl.is_header());
    assert!(!SourceKind::Source.is_header());
    assert!(!SourceKind::Test.is_header());
  }
}
