//! Shared test helpers for CLI integration tests.
//!
//! Each test gets an isolated temporary directory holding a project tree, a
//! fake toolchain (small shell scripts that mimic a GNU-style compiler,
//! archiver, and linker), a toolchain description file pointing at those
//! scripts, and an invocation log for counting toolchain runs.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };
    std::fs::create_dir_all(env.project_dir()).unwrap();
    std::fs::create_dir_all(env.bin_dir()).unwrap();

    env.write_script(
      &env.bin_dir().join("fakecc"),
      &format!(
        r#"#!/bin/sh
out=""; dep=""; src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -MF) dep="$2"; shift 2 ;;
    -MD|-c|-fsyntax-only|-I*|-W*) shift ;;
    *) src="$1"; shift ;;
  esac
done
echo "compile $src" >> "{log}"
[ -n "$out" ] && cp "$src" "$out"
[ -n "$dep" ] && printf '%s: %s\n' "${{out:-syntax-check}}" "$src" > "$dep"
"#,
        log = env.log_path().display()
      ),
    );
    env.write_script(
      &env.bin_dir().join("fakear"),
      &format!(
        r#"#!/bin/sh
shift
out="$1"
shift
echo "archive $out" >> "{log}"
cat "$@" > "$out"
"#,
        log = env.log_path().display()
      ),
    );
    env.write_script(
      &env.bin_dir().join("fakeld"),
      &format!(
        r#"#!/bin/sh
out=""; inputs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) inputs="$inputs $1"; shift ;;
  esac
done
echo "link $out" >> "{log}"
cat $inputs > "$out"
"#,
        log = env.log_path().display()
      ),
    );

    let toolchain = serde_json::json!({
      "family": "gnu",
      "compiler": env.bin_dir().join("fakecc"),
      "archiver": env.bin_dir().join("fakear"),
      "linker": env.bin_dir().join("fakeld"),
    });
    std::fs::write(env.toolchain_path(), serde_json::to_string_pretty(&toolchain).unwrap()).unwrap();

    env
  }

  pub fn project_dir(&self) -> PathBuf {
    self.temp.path().join("proj")
  }

  pub fn bin_dir(&self) -> PathBuf {
    self.temp.path().join("bin")
  }

  pub fn log_path(&self) -> PathBuf {
    self.temp.path().join("invocations.log")
  }

  pub fn toolchain_path(&self) -> PathBuf {
    self.temp.path().join("toolchain.json")
  }

  pub fn out_dir(&self) -> PathBuf {
    self.temp.path().join("out")
  }

  /// Write a file under the project directory.
  pub fn write(&self, rel: &str, content: &str) {
    let path = self.project_dir().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  fn write_script(&self, path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
  }

  /// Replace the fake compiler with one that always fails.
  pub fn break_compiler(&self) {
    self.write_script(&self.bin_dir().join("fakecc"), "#!/bin/sh\necho 'boom' >&2\nexit 1\n");
  }

  /// Number of toolchain invocations recorded so far.
  pub fn invocations(&self) -> usize {
    match std::fs::read_to_string(self.log_path()) {
      Ok(content) => content.lines().count(),
      Err(_) => 0,
    }
  }

  /// A `kiln build` command wired to this environment.
  pub fn build_cmd(&self) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd
      .arg("build")
      .arg("--project")
      .arg(self.project_dir())
      .arg("--out")
      .arg(self.out_dir())
      .arg("--toolchain")
      .arg(self.toolchain_path())
      .arg("-j")
      .arg("2");
    cmd
  }
}
