//! Test utilities for kiln-lib.
//!
//! Helpers for tests that need a pretend toolchain: small shell scripts that
//! behave like a compiler, archiver, or linker, plus an invocation log so
//! tests can count how many toolchain processes actually ran.

use std::path::Path;

/// Make a script executable. No-op outside Unix.
#[cfg(unix)]
pub fn make_executable(path: &Path) {
  use std::os::unix::fs::PermissionsExt;
  let mut perms = std::fs::metadata(path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(path, perms).unwrap();
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) {}

/// Write a fake compiler script at `path`.
///
/// The script understands the GNU-flavored argv kiln synthesizes (`-c`,
/// `-I...`, `-W...`, `-fsyntax-only`, `-MD -MF <file>`, `-o <file>`): it
/// copies the source to the object path, writes a Make-style dependency
/// sidecar naming the source as the only input, and appends one line to
/// `log` per invocation.
#[cfg(unix)]
pub fn write_fake_compiler(path: &Path, log: &Path) {
  let script = format!(
    r#"#!/bin/sh
out=""
dep=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -MF) dep="$2"; shift 2 ;;
    -MD|-c|-fsyntax-only) shift ;;
    -I*|-W*) shift ;;
    *) src="$1"; shift ;;
  esac
done
echo "compile $src" >> "{log}"
if [ -n "$out" ]; then
  cp "$src" "$out"
fi
if [ -n "$dep" ]; then
  printf '%s: %s\n' "${{out:-syntax-check}}" "$src" > "$dep"
fi
"#,
    log = log.display()
  );
  std::fs::write(path, script).unwrap();
  make_executable(path);
}

/// Write a fake archiver script at `path` (`ar rcs <out> <objects...>`).
#[cfg(unix)]
pub fn write_fake_archiver(path: &Path, log: &Path) {
  let script = format!(
    r#"#!/bin/sh
shift
out="$1"
shift
echo "archive $out" >> "{log}"
cat "$@" > "$out"
"#,
    log = log.display()
  );
  std::fs::write(path, script).unwrap();
  make_executable(path);
}

/// Write a fake linker script at `path` (`ld <inputs...> -o <out>`).
#[cfg(unix)]
pub fn write_fake_linker(path: &Path, log: &Path) {
  let script = format!(
    r#"#!/bin/sh
out=""
inputs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) inputs="$inputs $1"; shift ;;
  esac
done
echo "link $out" >> "{log}"
cat $inputs > "$out"
"#,
    log = log.display()
  );
  std::fs::write(path, script).unwrap();
  make_executable(path);
}

/// Count the invocations recorded in a fake-toolchain log.
pub fn invocation_count(log: &Path) -> usize {
  match std::fs::read_to_string(log) {
    Ok(content) => content.lines().count(),
    Err(_) => 0,
  }
}
