//! Process execution inside a sandbox.
//!
//! Every process starts from a cleared environment with:
//! - `PATH` set to the sandbox toolchain's bin directory followed by the host `PATH`
//! - `VIRTUAL_ENV` pointing at the toolchain installation
//! - `HOME` set to the sandbox's private home
//! - `TMPDIR`/`TMP`/`TEMP`/`TEMPDIR` set to the sandbox's private temp dir
//! - `LANG`/`LC_ALL` set to `C` and `SOURCE_DATE_EPOCH` fixed for reproducible output

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::{SandboxEnv, SandboxError};
use crate::consts::SOURCE_DATE_EPOCH;

impl SandboxEnv {
  /// A command that runs with the sandbox's isolated environment and its
  /// toolchain first on `PATH`. The working directory is the sandbox's
  /// scratch directory.
  pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
    let mut path = vec![self.bin_dir()];
    path.extend(host_path());
    self.isolated(program, path)
  }

  /// Like [`SandboxEnv::command`] but without the toolchain on `PATH`; used
  /// before the toolchain exists.
  pub(crate) fn host_command(&self, program: impl AsRef<OsStr>) -> Command {
    self.isolated(program, host_path())
  }

  fn isolated(&self, program: impl AsRef<OsStr>, path: Vec<PathBuf>) -> Command {
    let tmp = self.tmp_dir();
    let path = std::env::join_paths(path).unwrap_or_else(|_| OsString::from(self.bin_dir()));

    let mut command = Command::new(program);
    command
      .current_dir(self.work_dir())
      .env_clear()
      .env("PATH", path)
      .env("VIRTUAL_ENV", self.venv_dir())
      .env("HOME", self.home_dir())
      .env("TMPDIR", &tmp)
      .env("TMP", &tmp)
      .env("TEMP", &tmp)
      .env("TEMPDIR", &tmp)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH);

    #[cfg(windows)]
    for key in ["SYSTEMROOT", "SYSTEMDRIVE", "COMSPEC", "PATHEXT"] {
      if let Some(value) = std::env::var_os(key) {
        command.env(key, value);
      }
    }

    command
  }

  /// Run a shell script inside the sandbox and return its trimmed stdout.
  ///
  /// `extra_env` is applied on top of the isolated environment. The child is
  /// killed as soon as the sandbox's [`Cancellation`](super::Cancellation)
  /// fires, and the call then returns [`SandboxError::Cancelled`].
  ///
  /// Blocks the calling thread; async callers go through `spawn_blocking`.
  pub fn run_shell(
    &self,
    script: &str,
    cwd: &Path,
    extra_env: &BTreeMap<String, String>,
  ) -> Result<String, SandboxError> {
    let cancelled = || SandboxError::Cancelled {
      cmd: script.to_string(),
    };
    if self.cancellation().is_cancelled() {
      return Err(cancelled());
    }

    let (shell, args) = get_shell();
    let spawn_err = |source| SandboxError::Spawn {
      program: shell.clone(),
      source,
    };

    let mut command = tokio::process::Command::from(self.command(&shell));
    command.args(&args).arg(script).current_dir(cwd).kill_on_drop(true);
    for (key, value) in extra_env {
      command.env(key, value);
    }

    // Builders are synchronous; the child is driven by a runtime of its own.
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .map_err(spawn_err)?;

    debug!(shell = %shell, cwd = %cwd.display(), "running sandbox command");
    let output = runtime.block_on(async {
      tokio::select! {
        output = command.output() => output.map(Some),
        () = self.cancellation().cancelled() => Ok(None),
      }
    });
    let Some(output) = output.map_err(spawn_err)? else {
      debug!(cmd = %script, "sandbox command killed after cancellation");
      return Err(cancelled());
    };

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
      return Err(SandboxError::CommandFailed {
        cmd: script.to_string(),
        code: output.status.code(),
        stderr,
      });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command output");
    }
    Ok(stdout)
  }
}

fn host_path() -> Vec<PathBuf> {
  std::env::var_os("PATH")
    .map(|p| std::env::split_paths(&p).collect())
    .unwrap_or_default()
}

/// The shell used for sandbox scripts.
///
/// Always `/bin/sh` (Unix) or PowerShell without profile (Windows); the
/// user's `$SHELL` may source profile files that leak host state.
fn get_shell() -> (String, Vec<String>) {
  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
