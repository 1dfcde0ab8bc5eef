//! Shared test helpers for CLI integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Stands in for `python3`: supports `-m venv DIR` and `-m pip --version`.
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
exit 2
"#;

pub const DEMO_DESCRIPTOR: &str = r#"
[project]
name = "demo"
version = "0.1.0"
requires-python = ">=3.10"
"#;

/// Isolated test environment.
///
/// Each test gets a project directory, its own sandbox base directory and a
/// fake interpreter, all under one temporary directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub project: PathBuf,
}

impl TestEnv {
  /// A project with the given descriptor.
  pub fn with_descriptor(descriptor: &str) -> Self {
    let env = Self::empty();
    env.write_file("pyproject.toml", descriptor);
    env
  }

  /// The demo project: `demo` 0.1.0 with no dependencies.
  pub fn demo() -> Self {
    Self::with_descriptor(DEMO_DESCRIPTOR)
  }

  /// An empty project directory.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let project = dunce::canonicalize(&project).unwrap();
    Self { temp, project }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.project.join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn sandbox_base(&self) -> PathBuf {
    let p = self.temp.path().join("sandboxes");
    std::fs::create_dir_all(&p).unwrap();
    p
  }

  pub fn fake_python(&self) -> PathBuf {
    let path = self.temp.path().join("fake-python");
    if !path.exists() {
      std::fs::write(&path, FAKE_PYTHON).unwrap();
      std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
  }

  pub fn dist(&self) -> PathBuf {
    self.project.join("dist")
  }

  pub fn lockfile(&self) -> PathBuf {
    self.project.join("packwright.lock")
  }

  /// Entries left in the sandbox base directory.
  pub fn leftover_sandboxes(&self) -> usize {
    std::fs::read_dir(self.sandbox_base()).unwrap().count()
  }

  /// Get a pre-configured Command for the packwright binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `PACKWRIGHT_PYTHON`: the fake interpreter
  /// - `PACKWRIGHT_SANDBOX_DIR`: a per-test sandbox base directory
  pub fn packwright_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("packwright");
    cmd.env("PACKWRIGHT_PYTHON", self.fake_python());
    cmd.env("PACKWRIGHT_SANDBOX_DIR", self.sandbox_base());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

pub fn files_in(dir: &Path) -> Vec<String> {
  let Ok(entries) = std::fs::read_dir(dir) else {
    return Vec::new();
  };
  let mut names: Vec<String> = entries
    .filter_map(|e| e.ok())
    .map(|e| e.file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}
