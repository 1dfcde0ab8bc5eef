//! CLI smoke tests for packwright.
//!
//! These cover argument parsing and the failure paths that need no
//! interpreter.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn packwright_cmd() -> Command {
  cargo_bin_cmd!("packwright")
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  packwright_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  packwright_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("packwright"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "targets", "lock"] {
    packwright_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn zero_jobs_is_rejected() {
  packwright_cmd().args(["build", ".", "--jobs", "0"]).assert().code(2);
}

#[test]
fn verbose_and_quiet_conflict() {
  packwright_cmd().args(["-v", "-q", "targets"]).assert().code(2);
}

// =============================================================================
// Error Handling
// =============================================================================

#[test]
fn missing_project_directory_fails() {
  packwright_cmd()
    .arg("build")
    .arg("/nonexistent/packwright/project")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Project directory not found"));
}

#[test]
fn missing_descriptor_fails_during_scan() {
  let temp = TempDir::new().unwrap();

  packwright_cmd()
    .arg("build")
    .arg(temp.path())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("during scan"));

  assert!(!temp.path().join("packwright.lock").exists());
}

#[test]
fn malformed_descriptor_fails() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("pyproject.toml"), "[project]\nname = \"\"\nversion = \"1.0\"\n").unwrap();

  packwright_cmd().arg("lock").arg(temp.path()).assert().code(1);
}
