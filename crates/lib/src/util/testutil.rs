//! Test utilities for packwright-lib.
//!
//! Sandbox tests need an interpreter that understands `-m venv` and
//! `-m pip --version`. These helpers write small POSIX shell scripts that
//! behave like one, so no real Python installation is required.

use std::path::{Path, PathBuf};

#[cfg(unix)]
const FAKE_PYTHON: &str = r#"#!/bin/sh
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
  mkdir -p "$3/bin" || exit 1
  cp "$0" "$3/bin/python" || exit 1
  chmod +x "$3/bin/python"
  exit 0
fi
if [ "$1" = "-m" ] && [ "$2" = "pip" ] && [ "$3" = "--version" ]; then
  echo "pip 24.0 from fake (python 3.12)"
  exit 0
fi
echo "unsupported invocation: $*" >&2
exit 2
"#;

#[cfg(unix)]
const BROKEN_PIP_PYTHON: &str = r#"#!/bin/sh
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
  mkdir -p "$3/bin" || exit 1
  printf '#!/bin/sh\necho "No module named pip" >&2\nexit 1\n' > "$3/bin/python"
  chmod +x "$3/bin/python"
  exit 0
fi
exit 2
"#;

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  std::fs::write(&path, content).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// Write an interpreter whose environments have a working package manager.
#[cfg(unix)]
pub fn fake_interpreter(dir: &Path) -> PathBuf {
  write_script(dir, "fake-python", FAKE_PYTHON)
}

/// Write an interpreter whose environments lack a package manager.
#[cfg(unix)]
pub fn broken_pip_interpreter(dir: &Path) -> PathBuf {
  write_script(dir, "broken-python", BROKEN_PIP_PYTHON)
}

/// Sandbox directories currently present under `base`.
pub fn sandbox_dirs(base: &Path) -> Vec<PathBuf> {
  let Ok(entries) = std::fs::read_dir(base) else {
    return Vec::new();
  };
  entries
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| {
      p.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(crate::consts::SANDBOX_PREFIX))
    })
    .collect()
}
