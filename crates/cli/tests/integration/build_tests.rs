//! Build-command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn builds_a_package_and_reports_counts() {
  let env = TestEnv::new();
  env.write("kiln.json", r#"{ "name": "acme", "version": "1.2.3" }"#);
  env.write("library.json", r#"{ "name": "acme" }"#);
  env.write("src/lib.cpp", "int f();");
  env.write("src/app.main.cpp", "int main() {}");
  env.write("include/pub.hpp", "#pragma once");

  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete").and(predicate::str::contains("Compiled: 5")));

  // Two compiles, one header check, one archive, one link.
  assert_eq!(env.invocations(), 5);
  assert!(env.out_dir().join("obj/lib.cpp.o").is_file());
  assert!(env.out_dir().join("libacme.a").is_file());
  assert!(env.out_dir().join("app").is_file());
}

#[test]
fn second_build_reuses_everything() {
  let env = TestEnv::new();
  env.write("src/a.cpp", "int a();");
  env.write("src/b.cpp", "int b();");

  env.build_cmd().assert().success();
  let first = env.invocations();
  assert_eq!(first, 3);

  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Compiled: 0").and(predicate::str::contains("Reused: 3")));
  assert_eq!(env.invocations(), first, "no toolchain invocations on a clean rebuild");
}

#[test]
fn editing_a_source_rebuilds_it() {
  let env = TestEnv::new();
  env.write("src/a.cpp", "int a();");
  env.write("src/b.cpp", "int b();");

  env.build_cmd().assert().success();
  let first = env.invocations();

  // Rewrite one source; its object and the archive rebuild, the other
  // object is reused.
  env.write("src/a.cpp", "int a(); // edited");
  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Compiled: 2").and(predicate::str::contains("Reused: 1")));
  assert_eq!(env.invocations(), first + 2);
}

#[test]
fn failing_compile_fails_the_build() {
  let env = TestEnv::new();
  env.write("src/a.cpp", "int a();");
  env.write("src/run.main.cpp", "int main() {}");
  env.break_compiler();

  env
    .build_cmd()
    .assert()
    .failure()
    .stdout(predicate::str::contains("Build failed"))
    .stderr(predicate::str::contains("boom"));
}

#[test]
fn no_tests_flag_suppresses_header_checks_and_tests() {
  let env = TestEnv::new();
  env.write("src/lib.cpp", "int f();");
  env.write("src/x.test.cpp", "int main() {}");
  env.write("include/pub.hpp", "#pragma once");

  env.build_cmd().arg("--no-tests").assert().success();

  // One compile plus one archive; no header check, no test link.
  assert_eq!(env.invocations(), 2);
  assert!(!env.out_dir().join("test").exists());
  assert!(!env.out_dir().join("timestamps/pub.hpp.stamp").exists());
}

#[test]
fn multi_library_package_links_transitively() {
  let env = TestEnv::new();
  env.write("kiln.json", r#"{ "name": "acme", "version": "0.1.0" }"#);
  env.write("libs/base/include/base.hpp", "#pragma once");
  env.write("libs/base/src/base.cpp", "int base();");
  env.write("libs/top/library.json", r#"{ "name": "top", "uses": ["acme/base"] }"#);
  env.write("libs/top/src/tool.main.cpp", "int main() {}");
  env.write("libs/top/src/top.cpp", "int top();");

  env.build_cmd().assert().success();

  assert!(env.out_dir().join("libs/base/libbase.a").is_file());
  assert!(env.out_dir().join("libs/top/libtop.a").is_file());
  let tool = env.out_dir().join("libs/top/tool");
  assert!(tool.is_file());

  // The fake linker concatenates its inputs; the tool binary must contain
  // both archives' contents.
  let blob = std::fs::read_to_string(&tool).unwrap();
  assert!(blob.contains("int top();"));
  assert!(blob.contains("int base();"));
}

#[test]
fn templates_render_into_the_codegen_tree() {
  let env = TestEnv::new();
  env.write("kiln.json", r#"{ "name": "acme", "version": "2.0.0" }"#);
  env.write("src/lib.cpp", "int f();");
  env.write("src/config.in.hpp", "#define ACME_VERSION \"@{version}\"\n");

  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Rendered: 1"));

  let rendered = env.out_dir().join("__kiln/gen/config.hpp");
  assert_eq!(
    std::fs::read_to_string(rendered).unwrap(),
    "#define ACME_VERSION \"2.0.0\"\n"
  );
}
