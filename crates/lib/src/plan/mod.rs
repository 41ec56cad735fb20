//! Build-plan construction.
//!
//! Transforms a set of discovered libraries into a dependency-ordered set of
//! compile, archive, link, and template-render nodes. Plans are values:
//! construction touches no files and spawns nothing, so two runs over the
//! same classified sources produce identical plans.

mod archive;
mod compile_file;
mod exe;
mod library;
mod template;

pub use archive::CreateArchivePlan;
pub use compile_file::{CompileFilePlan, CompileRules};
pub use exe::LinkExecutablePlan;
pub use library::LibraryPlan;
pub use template::{RenderError, RenderTemplatePlan, TemplateContext, substitute};

use std::collections::HashMap;
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;

use crate::library::{LibraryRoot, UsageRef};
use crate::toolchain::Toolchain;

/// Reserved subtree of the output directory for rendered headers.
pub const GEN_SUBDIR: &str = "__kiln/gen";

/// Handle of a library within a build's arena. Plan nodes refer to their
/// owning library through this, never through a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryKey(pub usize);

/// Parameters for planning one build invocation.
#[derive(Debug, Clone)]
pub struct LibraryBuildParams {
  /// Root of the build output tree; every artifact lives under it.
  pub out_subdir: PathBuf,
  pub build_tests: bool,
  pub build_apps: bool,
  pub enable_warnings: bool,
  /// Extra usage requirements applied to test compiles and links.
  pub test_uses: Vec<UsageRef>,
}

impl Default for LibraryBuildParams {
  fn default() -> Self {
    Self {
      out_subdir: PathBuf::from("_build"),
      build_tests: true,
      build_apps: true,
      enable_warnings: true,
      test_uses: Vec::new(),
    }
  }
}

/// Errors constructing a package-wide plan.
#[derive(Debug, Error)]
pub enum PlanError {
  #[error("usage cycle involving library '{name}'")]
  UsageCycle { name: String },

  #[error("duplicate library name '{name}' in package")]
  DuplicateLibrary { name: String },
}

/// The materialized plan for a whole package: an arena of libraries and one
/// [`LibraryPlan`] per library, in usage-topological order.
#[derive(Debug)]
pub struct BuildPlan {
  libraries: Vec<LibraryRoot>,
  plans: Vec<LibraryPlan>,
  order: Vec<LibraryKey>,
  by_name: HashMap<String, LibraryKey>,
  package_name: String,
  package_version: String,
}

impl BuildPlan {
  /// Plan every library of a package.
  ///
  /// Inter-library `uses` edges (usages whose namespace is this package)
  /// order the libraries and feed each library the public include
  /// directories of everything it uses, transitively. Usages pointing
  /// outside the package are left for the link layer to resolve.
  pub fn create(
    package_name: &str,
    package_version: &str,
    libraries: Vec<LibraryRoot>,
    params: &LibraryBuildParams,
  ) -> Result<Self, PlanError> {
    let mut by_name = HashMap::new();
    for (index, lib) in libraries.iter().enumerate() {
      let name = lib.manifest().name.clone();
      if by_name.insert(name.clone(), LibraryKey(index)).is_some() {
        return Err(PlanError::DuplicateLibrary { name });
      }
    }

    // Usage graph over the package's own libraries; edges run from the
    // used library to its dependent.
    let mut graph = DiGraph::<LibraryKey, ()>::new();
    let node_of: Vec<_> = (0..libraries.len()).map(|i| graph.add_node(LibraryKey(i))).collect();
    for (index, lib) in libraries.iter().enumerate() {
      for usage in &lib.manifest().uses {
        if usage.namespace != package_name {
          continue;
        }
        if let Some(&dep) = by_name.get(&usage.name) {
          graph.add_edge(node_of[dep.0], node_of[index], ());
        }
      }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| PlanError::UsageCycle {
      name: libraries[graph[cycle.node_id()].0].manifest().name.clone(),
    })?;
    let order: Vec<LibraryKey> = sorted.into_iter().map(|ix| graph[ix]).collect();

    // Transitive usage closure, computed in topological order so each
    // library's closure can reuse its dependencies'.
    let mut closures: Vec<Vec<LibraryKey>> = vec![Vec::new(); libraries.len()];
    for &key in &order {
      let mut closure: Vec<LibraryKey> = Vec::new();
      for usage in &libraries[key.0].manifest().uses {
        if usage.namespace != package_name {
          continue;
        }
        let Some(&dep) = by_name.get(&usage.name) else {
          continue;
        };
        if !closure.contains(&dep) {
          closure.push(dep);
        }
        for &transitive in &closures[dep.0] {
          if !closure.contains(&transitive) {
            closure.push(transitive);
          }
        }
      }
      closures[key.0] = closure;
    }

    let mut plans: Vec<Option<LibraryPlan>> = (0..libraries.len()).map(|_| None).collect();
    for &key in &order {
      let lib = &libraries[key.0];
      let usage_includes: Vec<PathBuf> = closures[key.0]
        .iter()
        .map(|dep| libraries[dep.0].public_include_dir())
        .collect();
      let qual_name = format!("{}.{}", package_name, lib.manifest().name);
      plans[key.0] = Some(LibraryPlan::create(lib, key, params, Some(qual_name), &usage_includes));
    }
    let plans = plans.into_iter().map(|p| p.expect("every library planned")).collect();

    Ok(Self {
      libraries,
      plans,
      order,
      by_name,
      package_name: package_name.to_string(),
      package_version: package_version.to_string(),
    })
  }

  pub fn package_name(&self) -> &str {
    &self.package_name
  }

  pub fn package_version(&self) -> &str {
    &self.package_version
  }

  pub fn library(&self, key: LibraryKey) -> &LibraryRoot {
    &self.libraries[key.0]
  }

  pub fn plan_of(&self, key: LibraryKey) -> &LibraryPlan {
    &self.plans[key.0]
  }

  /// Library plans in usage-topological order.
  pub fn plans(&self) -> impl Iterator<Item = &LibraryPlan> {
    self.order.iter().map(|&key| &self.plans[key.0])
  }

  /// Resolve a usage to a library of this package, if it names one.
  pub fn lookup(&self, usage: &UsageRef) -> Option<LibraryKey> {
    if usage.namespace != self.package_name {
      return None;
    }
    self.by_name.get(&usage.name).copied()
  }

  /// Archive paths an executable with the given usage list must link
  /// against, walking in-package usages transitively. Usages naming other
  /// packages are skipped here; resolving them is the repository's concern.
  pub fn resolve_link_archives(&self, links: &[UsageRef], tc: &Toolchain) -> Vec<PathBuf> {
    let mut archives: Vec<PathBuf> = Vec::new();
    let mut visited: Vec<LibraryKey> = Vec::new();
    let mut queue: Vec<LibraryKey> = links.iter().filter_map(|u| self.lookup(u)).collect();

    while let Some(key) = queue.pop() {
      if visited.contains(&key) {
        continue;
      }
      visited.push(key);
      if let Some(archive) = &self.plans[key.0].archive {
        let path = archive.archive_file_path(tc);
        if !archives.contains(&path) {
          archives.push(path);
        }
      }
      let manifest = self.libraries[key.0].manifest();
      for usage in manifest.uses.iter().chain(manifest.links.iter()) {
        if let Some(dep) = self.lookup(usage) {
          queue.push(dep);
        }
      }
    }
    archives
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::library::collect_libraries;
  use std::path::Path;
  use tempfile::TempDir;

  fn touch(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  fn params() -> LibraryBuildParams {
    LibraryBuildParams {
      out_subdir: PathBuf::from("_build"),
      ..LibraryBuildParams::default()
    }
  }

  fn single_plan(temp: &TempDir, params: &LibraryBuildParams) -> BuildPlan {
    let libraries = collect_libraries(temp.path()).unwrap();
    BuildPlan::create("acme", "1.0.0", libraries, params).unwrap()
  }

  #[test]
  fn app_and_lib_without_tests() {
    // src/main.cpp (app), src/lib.cpp (source), include/pub.hpp, tests off:
    // one archive, one link for `main`, no header checks, no renders.
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/main.cpp", "int main() {}");
    touch(temp.path(), "src/lib.cpp", "int f() { return 1; }");
    touch(temp.path(), "include/pub.hpp", "#pragma once");

    let mut params = params();
    params.build_tests = false;
    params.build_apps = true;

    let plan = single_plan(&temp, &params);
    let lib_plan = plan.plans().next().unwrap();

    assert!(lib_plan.archive.is_some());
    assert_eq!(lib_plan.archive.as_ref().unwrap().compile_files.len(), 1);
    assert_eq!(lib_plan.executables.len(), 1);
    assert_eq!(lib_plan.executables[0].name, "main");
    assert!(!lib_plan.executables[0].is_test);
    assert!(lib_plan.header_checks.is_empty());
    assert!(lib_plan.templates.is_empty());
  }

  #[test]
  fn test_sources_use_test_rules_and_test_subdir() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/x.test.cpp", "int main() {}");

    let mut params = params();
    params.test_uses = vec![UsageRef::new("vendor", "testing")];

    let plan = single_plan(&temp, &params);
    let lib_plan = plan.plans().next().unwrap();

    assert_eq!(lib_plan.executables.len(), 1);
    let exe = &lib_plan.executables[0];
    assert_eq!(exe.name, "x");
    assert!(exe.is_test);
    assert_eq!(exe.out_subdir, PathBuf::from("_build/test"));
    assert!(exe.main_compile.rules.uses.contains(&UsageRef::new("vendor", "testing")));
    assert!(exe.links.contains(&UsageRef::new("vendor", "testing")));
  }

  #[test]
  fn archive_exists_iff_compiled_sources_exist() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "include/only.hpp", "#pragma once");

    let plan = single_plan(&temp, &params());
    let lib_plan = plan.plans().next().unwrap();
    assert!(lib_plan.archive.is_none());
    // Header-only library still gets its public-header checks.
    assert_eq!(lib_plan.header_checks.len(), 1);
    assert!(lib_plan.header_checks[0].rules.syntax_only);
  }

  #[test]
  fn executable_count_tracks_params() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/a.main.cpp", "int main() {}");
    touch(temp.path(), "src/b.main.cpp", "int main() {}");
    touch(temp.path(), "src/t.test.cpp", "int main() {}");

    let both = single_plan(&temp, &params());
    assert_eq!(both.plans().next().unwrap().executables.len(), 3);

    let mut no_apps = params();
    no_apps.build_apps = false;
    let plan = single_plan(&temp, &no_apps);
    assert_eq!(plan.plans().next().unwrap().executables.len(), 1);

    let mut no_tests = params();
    no_tests.build_tests = false;
    let plan = single_plan(&temp, &no_tests);
    assert_eq!(plan.plans().next().unwrap().executables.len(), 2);
  }

  #[test]
  fn header_checks_split_public_and_private_rules() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/lib.cpp", "");
    touch(temp.path(), "src/detail.hpp", "#pragma once");
    touch(temp.path(), "include/pub.hpp", "#pragma once");

    let plan = single_plan(&temp, &params());
    let lib_plan = plan.plans().next().unwrap();

    assert_eq!(lib_plan.header_checks.len(), 2);
    let private_check = lib_plan
      .header_checks
      .iter()
      .find(|c| c.source.relative == PathBuf::from("detail.hpp"))
      .unwrap();
    let public_check = lib_plan
      .header_checks
      .iter()
      .find(|c| c.source.relative == PathBuf::from("pub.hpp"))
      .unwrap();

    // Both are syntax-only and land under timestamps/.
    assert!(private_check.rules.syntax_only);
    assert!(public_check.rules.syntax_only);
    assert!(private_check.out_dir.ends_with("timestamps"));

    // Only the private check may see src/.
    let src_dir = plan.library(lib_plan.library).private_include_dir();
    assert!(private_check.rules.include_dirs.contains(&src_dir));
    assert!(!public_check.rules.include_dirs.contains(&src_dir));
  }

  #[test]
  fn header_impl_files_contribute_nothing() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/lib.cpp", "");
    touch(temp.path(), "src/lib.ipp", "");

    let plan = single_plan(&temp, &params());
    let lib_plan = plan.plans().next().unwrap();
    assert_eq!(lib_plan.archive.as_ref().unwrap().compile_files.len(), 1);
    assert!(lib_plan.header_checks.is_empty());
  }

  #[test]
  fn templates_produce_renders_and_codegen_include_dir() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/lib.cpp", "");
    touch(temp.path(), "src/config.in.hpp", "#define V \"@{version}\"");

    let plan = single_plan(&temp, &params());
    let lib_plan = plan.plans().next().unwrap();

    assert_eq!(lib_plan.templates.len(), 1);
    let gen_dir = lib_plan.generated_include_dir().unwrap();
    assert_eq!(gen_dir, PathBuf::from("_build/__kiln/gen"));

    // Compile rules of library sources search the codegen tree.
    let compile = &lib_plan.archive.as_ref().unwrap().compile_files[0];
    assert!(compile.rules.include_dirs.contains(&gen_dir));
  }

  #[test]
  fn no_templates_means_no_codegen_dir() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/lib.cpp", "");

    let plan = single_plan(&temp, &params());
    let lib_plan = plan.plans().next().unwrap();
    assert!(lib_plan.generated_include_dir().is_none());
    let compile = &lib_plan.archive.as_ref().unwrap().compile_files[0];
    assert!(!compile.rules.include_dirs.iter().any(|d| d.starts_with("_build/__kiln")));
  }

  #[test]
  fn usage_order_and_transitive_includes() {
    // alpha <- beta <- gamma (gamma uses beta, beta uses alpha).
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "libs/alpha/src/a.cpp", "");
    touch(temp.path(), "libs/alpha/include/a.hpp", "");
    touch(temp.path(), "libs/beta/src/b.cpp", "");
    touch(temp.path(), "libs/beta/include/b.hpp", "");
    touch(
      temp.path(),
      "libs/beta/library.json",
      r#"{ "name": "beta", "uses": ["acme/alpha"] }"#,
    );
    touch(temp.path(), "libs/gamma/src/g.cpp", "");
    touch(
      temp.path(),
      "libs/gamma/library.json",
      r#"{ "name": "gamma", "uses": ["acme/beta"] }"#,
    );

    let plan = single_plan(&temp, &params());

    let names: Vec<_> = plan.plans().map(|p| p.qual_name.clone()).collect();
    let pos = |name: &str| names.iter().position(|n| n == name).unwrap();
    assert!(pos("acme.alpha") < pos("acme.beta"));
    assert!(pos("acme.beta") < pos("acme.gamma"));

    // gamma sees both beta's and alpha's public include dirs.
    let gamma = plan.plans().find(|p| p.qual_name == "acme.gamma").unwrap();
    let compile = &gamma.archive.as_ref().unwrap().compile_files[0];
    let alpha_inc = plan.library(plan.lookup(&UsageRef::new("acme", "alpha")).unwrap()).public_include_dir();
    let beta_inc = plan.library(plan.lookup(&UsageRef::new("acme", "beta")).unwrap()).public_include_dir();
    assert!(compile.rules.include_dirs.contains(&alpha_inc));
    assert!(compile.rules.include_dirs.contains(&beta_inc));

    // Linking gamma pulls in both archives, transitively.
    let tc = Toolchain::gnu("cc");
    let archives = plan.resolve_link_archives(&[UsageRef::new("acme", "beta")], &tc);
    assert_eq!(archives.len(), 2);
  }

  #[test]
  fn usage_cycles_are_rejected() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "libs/a/src/a.cpp", "");
    touch(temp.path(), "libs/a/library.json", r#"{ "name": "a", "uses": ["acme/b"] }"#);
    touch(temp.path(), "libs/b/src/b.cpp", "");
    touch(temp.path(), "libs/b/library.json", r#"{ "name": "b", "uses": ["acme/a"] }"#);

    let libraries = collect_libraries(temp.path()).unwrap();
    let result = BuildPlan::create("acme", "1.0.0", libraries, &params());
    assert!(matches!(result, Err(PlanError::UsageCycle { .. })));
  }

  #[test]
  fn duplicate_library_names_are_rejected() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "libs/a/src/a.cpp", "");
    touch(temp.path(), "libs/a/library.json", r#"{ "name": "same" }"#);
    touch(temp.path(), "libs/b/src/b.cpp", "");
    touch(temp.path(), "libs/b/library.json", r#"{ "name": "same" }"#);

    let libraries = collect_libraries(temp.path()).unwrap();
    let result = BuildPlan::create("acme", "1.0.0", libraries, &params());
    assert!(matches!(result, Err(PlanError::DuplicateLibrary { .. })));
  }

  #[test]
  fn external_usages_pass_through_unresolved() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "src/lib.cpp", "");
    touch(
      temp.path(),
      "library.json",
      r#"{ "name": "app", "uses": ["fmt/fmt"], "links": ["zlib/z"] }"#,
    );
    touch(temp.path(), "src/tool.main.cpp", "int main() {}");

    let plan = single_plan(&temp, &params());
    let lib_plan = plan.plans().next().unwrap();

    // The usage survives into the link list even though the planner cannot
    // resolve it inside this package.
    assert_eq!(
      lib_plan.executables[0].links,
      vec![UsageRef::new("fmt", "fmt"), UsageRef::new("zlib", "z")]
    );
    let tc = Toolchain::gnu("cc");
    assert!(plan.resolve_link_archives(&lib_plan.executables[0].links, &tc).is_empty());
  }

  #[test]
  fn out_tree_is_namespaced_per_library() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "libs/alpha/src/a.cpp", "");

    let plan = single_plan(&temp, &params());
    let lib_plan = plan.plans().next().unwrap();
    assert_eq!(lib_plan.out_subdir, PathBuf::from("_build/libs/alpha"));

    let tc = Toolchain::gnu("cc");
    let compile = &lib_plan.archive.as_ref().unwrap().compile_files[0];
    assert_eq!(compile.output_path(&tc), PathBuf::from("_build/libs/alpha/obj/a.cpp.o"));
    assert_eq!(
      lib_plan.archive.as_ref().unwrap().archive_file_path(&tc),
      PathBuf::from("_build/libs/alpha/libalpha.a")
    );
  }
}
