//! Toolchain bootstrap for sandboxes.
//!
//! Bootstrapping is two steps, both of which must succeed:
//! 1. `<interpreter> -m venv <sandbox>/venv` creates an independent installation
//! 2. `<sandbox>/venv/bin/python -m pip --version` proves the package manager works

use std::fmt;
use std::process::Command as StdCommand;

use tokio::process::Command;
use tracing::debug;

use super::{SandboxEnv, SandboxError};

/// Which bootstrap step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
  CreateEnvironment,
  VerifyPackageManager,
}

impl fmt::Display for BootstrapStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BootstrapStep::CreateEnvironment => write!(f, "create environment"),
      BootstrapStep::VerifyPackageManager => write!(f, "verify package manager"),
    }
  }
}

/// The interpreter used to seed each sandbox's toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
  interpreter: String,
}

impl Toolchain {
  pub fn python(interpreter: impl Into<String>) -> Self {
    Self {
      interpreter: interpreter.into(),
    }
  }

  pub fn interpreter(&self) -> &str {
    &self.interpreter
  }

  /// Install and verify a toolchain inside `env`.
  pub async fn bootstrap(&self, env: &SandboxEnv) -> Result<(), SandboxError> {
    let mut create = env.host_command(&self.interpreter);
    create.args(["-m", "venv"]).arg(env.venv_dir());
    run_step(BootstrapStep::CreateEnvironment, create).await?;

    let mut verify = env.command(env.python());
    verify.args(["-m", "pip", "--version"]);
    let version = run_step(BootstrapStep::VerifyPackageManager, verify).await?;

    debug!(interpreter = %self.interpreter, pip = %version, "toolchain verified");
    Ok(())
  }
}

async fn run_step(step: BootstrapStep, command: StdCommand) -> Result<String, SandboxError> {
  let mut command = Command::from(command);
  command.kill_on_drop(true);

  let output = command.output().await.map_err(|e| SandboxError::Bootstrap {
    step,
    message: e.to_string(),
  })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(SandboxError::Bootstrap {
      step,
      message: format!("exited with code {:?}: {}", output.status.code(), stderr.trim()),
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::util::testutil::{broken_pip_interpreter, fake_interpreter};
  use tempfile::TempDir;

  fn prepared_env(temp: &TempDir) -> SandboxEnv {
    let env = SandboxEnv::at(temp.path().join("sandbox"));
    env.prepare().unwrap();
    env
  }

  #[tokio::test]
  async fn bootstrap_installs_interpreter() {
    let temp = TempDir::new().unwrap();
    let env = prepared_env(&temp);
    let toolchain = Toolchain::python(fake_interpreter(temp.path()).to_string_lossy());

    toolchain.bootstrap(&env).await.unwrap();

    assert!(env.python().exists());
  }

  #[tokio::test]
  async fn bootstrap_reports_verification_failure() {
    let temp = TempDir::new().unwrap();
    let env = prepared_env(&temp);
    let toolchain = Toolchain::python(broken_pip_interpreter(temp.path()).to_string_lossy());

    let err = toolchain.bootstrap(&env).await.unwrap_err();

    match err {
      SandboxError::Bootstrap { step, message } => {
        assert_eq!(step, BootstrapStep::VerifyPackageManager);
        assert!(message.contains("No module named pip"), "unexpected message: {}", message);
      }
      other => panic!("unexpected error: {}", other),
    }
  }

  #[test]
  fn step_display() {
    assert_eq!(BootstrapStep::CreateEnvironment.to_string(), "create environment");
    assert_eq!(BootstrapStep::VerifyPackageManager.to_string(), "verify package manager");
  }
}
