//! Info-command integration tests.

use assert_cmd::Command;
use predicates::prelude::*;

use super::common::TestEnv;

fn kiln() -> Command {
  Command::cargo_bin("kiln").unwrap()
}

#[test]
fn info_lists_package_and_libraries() {
  let env = TestEnv::new();
  env.write("kiln.json", r#"{ "name": "acme", "version": "1.0.0" }"#);
  env.write("src/a.cpp", "");
  env.write("libs/widgets/src/w.cpp", "");
  env.write(
    "libs/widgets/library.json",
    r#"{ "name": "widgets", "uses": ["acme/acme"] }"#,
  );

  kiln()
    .arg("info")
    .arg("--project")
    .arg(env.project_dir())
    .assert()
    .success()
    .stdout(
      predicate::str::contains("acme 1.0.0")
        .and(predicate::str::contains("widgets"))
        .and(predicate::str::contains("uses: acme/acme")),
    );
}

#[test]
fn info_counts_source_kinds() {
  let env = TestEnv::new();
  env.write("src/a.cpp", "");
  env.write("src/b.cpp", "");
  env.write("src/t.test.cpp", "");
  env.write("include/h.hpp", "");

  kiln()
    .arg("info")
    .arg("--project")
    .arg(env.project_dir())
    .assert()
    .success()
    .stdout(predicate::str::contains("2 compiled, 1 headers, 0 templates, 0 apps, 1 tests"));
}
