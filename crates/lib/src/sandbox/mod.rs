//! Isolated build environments.
//!
//! A [`Sandbox`] is an ephemeral directory holding its own toolchain
//! installation (a virtual environment with a working package manager), a
//! private `HOME`, a private temp directory and a scratch working directory:
//!
//! ```text
//! <base>/packwright-sandbox-XXXXXX/
//!   venv/   toolchain installation
//!   home/   HOME for processes run inside the sandbox
//!   tmp/    TMPDIR/TMP/TEMP
//!   work/   scratch space for builders
//! ```
//!
//! [`SandboxManager::acquire`] either hands out a fully bootstrapped sandbox
//! or fails with [`SandboxError::Bootstrap`]; a partially created sandbox is
//! removed before the error is returned. Release is idempotent and also runs
//! when a [`Sandbox`] is dropped, so every exit path of a build step tears
//! its sandbox down. The manager keeps a live registry of open sandboxes
//! ([`OpenSandboxes`]) so an interrupt handler can sweep them, and a
//! [`Cancellation`] shared with every [`SandboxEnv`] it hands out so commands
//! still running inside a sandbox are killed when the run is interrupted.

pub mod cmd;
pub mod toolchain;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::consts::SANDBOX_PREFIX;

pub use toolchain::{BootstrapStep, Toolchain};

#[derive(Debug, Error)]
pub enum SandboxError {
  #[error("failed to create sandbox under {}: {source}", base.display())]
  Create {
    base: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("toolchain bootstrap failed ({step}): {message}")]
  Bootstrap { step: BootstrapStep, message: String },

  #[error("failed to tear down sandbox {}: {source}", path.display())]
  Teardown {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("command failed with exit code {code:?}: {cmd}")]
  CommandFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("cancelled: {cmd}")]
  Cancelled { cmd: String },
}

/// Run-wide cancellation flag.
///
/// Cloning shares the flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct Cancellation {
  tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
  fn default() -> Self {
    Self {
      tx: Arc::new(watch::Sender::new(false)),
    }
  }
}

impl Cancellation {
  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.tx.borrow()
  }

  /// Resolves once [`Cancellation::cancel`] has been called.
  pub async fn cancelled(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives in `self`, so the channel cannot close while waiting.
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}

/// Paths of a sandbox, as seen by builders.
///
/// Cheap to clone; it does not own the directory.
#[derive(Debug, Clone)]
pub struct SandboxEnv {
  root: PathBuf,
  cancel: Cancellation,
}

impl SandboxEnv {
  /// Describe a sandbox rooted at `root`, with a cancellation flag of its own.
  pub fn at(root: impl Into<PathBuf>) -> Self {
    Self::with_cancellation(root, Cancellation::default())
  }

  pub fn with_cancellation(root: impl Into<PathBuf>, cancel: Cancellation) -> Self {
    Self {
      root: root.into(),
      cancel,
    }
  }

  /// Flag that kills commands run through [`SandboxEnv::run_shell`].
  pub fn cancellation(&self) -> &Cancellation {
    &self.cancel
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Toolchain installation directory.
  pub fn venv_dir(&self) -> PathBuf {
    self.root.join("venv")
  }

  /// Executables of the toolchain installation.
  #[cfg(not(windows))]
  pub fn bin_dir(&self) -> PathBuf {
    self.venv_dir().join("bin")
  }

  #[cfg(windows)]
  pub fn bin_dir(&self) -> PathBuf {
    self.venv_dir().join("Scripts")
  }

  /// The sandbox's own interpreter.
  #[cfg(not(windows))]
  pub fn python(&self) -> PathBuf {
    self.bin_dir().join("python")
  }

  #[cfg(windows)]
  pub fn python(&self) -> PathBuf {
    self.bin_dir().join("python.exe")
  }

  pub fn home_dir(&self) -> PathBuf {
    self.root.join("home")
  }

  pub fn tmp_dir(&self) -> PathBuf {
    self.root.join("tmp")
  }

  pub fn work_dir(&self) -> PathBuf {
    self.root.join("work")
  }

  /// Create the non-toolchain directories.
  pub fn prepare(&self) -> io::Result<()> {
    for dir in [self.home_dir(), self.tmp_dir(), self.work_dir()] {
      std::fs::create_dir_all(dir)?;
    }
    Ok(())
  }
}

/// Live registry of sandboxes that have been created and not yet released.
#[derive(Debug, Clone, Default)]
pub struct OpenSandboxes {
  inner: Arc<Mutex<BTreeMap<u64, PathBuf>>>,
}

impl OpenSandboxes {
  fn insert(&self, id: u64, path: PathBuf) {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).insert(id, path);
  }

  fn remove(&self, id: u64) {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
  }

  pub fn len(&self) -> usize {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Paths of every open sandbox, in creation order.
  pub fn paths(&self) -> Vec<PathBuf> {
    self
      .inner
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect()
  }

  /// Remove every open sandbox from disk and empty the registry.
  ///
  /// Returns the number of sandboxes swept. Removal failures are logged;
  /// sandboxes whose directory is already gone count as swept.
  pub fn sweep(&self) -> usize {
    let drained: Vec<(u64, PathBuf)> = {
      let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
      std::mem::take(&mut *guard).into_iter().collect()
    };

    for (id, path) in &drained {
      match std::fs::remove_dir_all(path) {
        Ok(()) => info!(sandbox = id, path = %path.display(), "swept sandbox"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(sandbox = id, path = %path.display(), error = %e, "failed to sweep sandbox"),
      }
    }

    drained.len()
  }
}

/// An acquired sandbox. Released explicitly or on drop.
pub struct Sandbox {
  id: u64,
  dir: Option<TempDir>,
  env: SandboxEnv,
  open: OpenSandboxes,
}

impl fmt::Debug for Sandbox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Sandbox")
      .field("id", &self.id)
      .field("root", &self.env.root())
      .field("released", &self.is_released())
      .finish()
  }
}

impl Sandbox {
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn env(&self) -> &SandboxEnv {
    &self.env
  }

  pub fn path(&self) -> &Path {
    self.env.root()
  }

  pub fn is_released(&self) -> bool {
    self.dir.is_none()
  }

  /// Remove every file created for this sandbox.
  ///
  /// Idempotent: releasing an already released (or externally swept)
  /// sandbox succeeds without doing anything.
  pub fn release(&mut self) -> Result<(), SandboxError> {
    let Some(dir) = self.dir.take() else {
      return Ok(());
    };
    self.open.remove(self.id);

    let path = dir.path().to_path_buf();
    match dir.close() {
      Ok(()) => {
        info!(sandbox = self.id, path = %path.display(), "removed sandbox");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(sandbox = self.id, path = %path.display(), "sandbox already removed");
        Ok(())
      }
      Err(source) => Err(SandboxError::Teardown { path, source }),
    }
  }
}

impl Drop for Sandbox {
  fn drop(&mut self) {
    if let Err(e) = self.release() {
      warn!(sandbox = self.id, error = %e, "sandbox teardown failed on drop");
    }
  }
}

/// Creates and tears down sandboxes.
#[derive(Debug, Clone)]
pub struct SandboxManager {
  base: PathBuf,
  toolchain: Toolchain,
  open: OpenSandboxes,
  cancel: Cancellation,
  next_id: Arc<AtomicU64>,
}

impl SandboxManager {
  /// Sandboxes are created under `base` and bootstrapped with `toolchain`.
  pub fn new(base: impl Into<PathBuf>, toolchain: Toolchain) -> Self {
    Self {
      base: base.into(),
      toolchain,
      open: OpenSandboxes::default(),
      cancel: Cancellation::default(),
      next_id: Arc::new(AtomicU64::new(1)),
    }
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  pub fn toolchain(&self) -> &Toolchain {
    &self.toolchain
  }

  /// Live registry shared by every sandbox this manager creates.
  pub fn open(&self) -> &OpenSandboxes {
    &self.open
  }

  /// Cancellation shared by every sandbox this manager creates.
  pub fn cancellation(&self) -> &Cancellation {
    &self.cancel
  }

  /// Create a fresh sandbox with its own bootstrapped toolchain.
  ///
  /// Directory creation runs on the blocking pool. Cancelling the manager
  /// while the toolchain bootstraps kills the bootstrap process and removes
  /// the partial sandbox.
  pub async fn acquire(&self) -> Result<Sandbox, SandboxError> {
    if self.cancel.is_cancelled() {
      return Err(SandboxError::Cancelled {
        cmd: "sandbox creation".to_string(),
      });
    }

    let create_err = |source| SandboxError::Create {
      base: self.base.clone(),
      source,
    };

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let base = self.base.clone();
    let cancel = self.cancel.clone();
    let env = tokio::task::spawn_blocking(move || -> io::Result<(TempDir, SandboxEnv)> {
      std::fs::create_dir_all(&base)?;
      let dir = tempfile::Builder::new().prefix(SANDBOX_PREFIX).tempdir_in(&base)?;
      let env = SandboxEnv::with_cancellation(dir.path(), cancel);
      env.prepare()?;
      Ok((dir, env))
    })
    .await
    .map_err(|e| create_err(io::Error::other(e)))?;
    let (dir, env) = env.map_err(create_err)?;

    self.open.insert(id, dir.path().to_path_buf());
    let mut sandbox = Sandbox {
      id,
      dir: Some(dir),
      env,
      open: self.open.clone(),
    };

    debug!(sandbox = id, path = %sandbox.path().display(), "bootstrapping sandbox toolchain");
    let bootstrapped = tokio::select! {
      result = self.toolchain.bootstrap(&sandbox.env) => result,
      () = self.cancel.cancelled() => Err(SandboxError::Cancelled {
        cmd: "toolchain bootstrap".to_string(),
      }),
    };
    if let Err(e) = bootstrapped {
      self.discard(&mut sandbox);
      return Err(e);
    }

    info!(sandbox = id, path = %sandbox.path().display(), "sandbox ready");
    Ok(sandbox)
  }

  /// Number of sandboxes this manager has started to create.
  pub fn created(&self) -> u64 {
    self.next_id.load(Ordering::Relaxed) - 1
  }

  /// Tear down `sandbox`. Safe to call more than once.
  pub fn release(&self, sandbox: &mut Sandbox) -> Result<(), SandboxError> {
    sandbox.release()
  }

  /// Tear down every sandbox that is still open.
  pub fn sweep(&self) -> usize {
    self.open.sweep()
  }

  fn discard(&self, sandbox: &mut Sandbox) {
    if let Err(e) = sandbox.release() {
      warn!(sandbox = sandbox.id, error = %e, "failed to remove partially created sandbox");
    }
  }
}
