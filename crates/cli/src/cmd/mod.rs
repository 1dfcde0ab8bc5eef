mod build;
mod lock;
mod targets;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use build::{BuildArgs, cmd_build};
pub use lock::{LockArgs, cmd_lock};
pub use targets::{TargetsArgs, cmd_targets};

/// Canonical project root; the directory must exist.
fn project_root(path: &Path) -> Result<PathBuf> {
  dunce::canonicalize(path).with_context(|| format!("Project directory not found: {}", path.display()))
}

/// Resolve a user-supplied path against the current directory.
fn absolute(path: &Path) -> Result<PathBuf> {
  std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}

fn absolute_opt(path: Option<&Path>) -> Result<Option<PathBuf>> {
  path.map(absolute).transpose()
}
