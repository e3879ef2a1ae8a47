//! Shared test helpers for port discovery integration tests

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Test helper: Write an executable shell script named `name` into `dir`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("Failed to write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

/// Test helper: Create a temp dir holding an `lsof` stand-in
///
/// The script exits 1 for its first `failures` calls, then prints `stdout`
/// (a printf format string). Every argument list it receives is appended to
/// `args.log` next to it.
#[cfg(unix)]
pub fn flaky_lsof(failures: u32, stdout: &str) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let body = format!(
        r#"here=$(dirname "$0")
printf '%s\n' "$*" >> "$here/args.log"
n=$(cat "$here/count" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "$here/count"
if [ "$n" -le {failures} ]; then
    echo "no sockets yet" >&2
    exit 1
fi
printf '{stdout}'
"#
    );
    write_script(dir.path(), "lsof", &body);
    dir
}

/// Test helper: Argument lines recorded by [`flaky_lsof`]
pub fn recorded_args(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("args.log"))
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}
