//! Dependency resolution and lockfile writing.
//!
//! [`DependencyResolver::resolve`] turns the declared specifiers into a
//! resolved set through a [`Resolver`] strategy and persists it as
//! `packwright.lock` before returning. Two strategies exist:
//! - [`PassthroughResolver`]: records specifiers unpinned
//! - [`index::IndexResolver`]: pins versions against a local package index

pub mod index;
pub mod lock;
pub mod specifier;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::consts::LOCK_FILENAME;
pub use index::{IndexResolver, PackageIndex};
pub use lock::{LockError, LockFile, LockedDependency};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("invalid requirement '{requirement}': {reason}")]
  InvalidRequirement { requirement: String, reason: String },

  #[error("invalid version '{0}'")]
  InvalidVersion(String),

  #[error("package '{0}' is not in the package index")]
  UnknownPackage(String),

  #[error("no version of '{package}' satisfies all of: {}", specifiers.join(", "))]
  Conflict { package: String, specifiers: Vec<String> },

  #[error("resolution gave up after trying {attempts} candidate releases")]
  Exhausted { attempts: usize },

  #[error("failed to load package index {}: {message}", path.display())]
  Index { path: PathBuf, message: String },

  #[error(transparent)]
  Lock(#[from] LockError),
}

/// A resolution strategy.
pub trait Resolver: Send + Sync {
  /// Recorded in the lockfile's `resolver` field.
  fn name(&self) -> &'static str;

  fn resolve(&self, dependencies: &[String]) -> Result<Vec<LockedDependency>, ResolveError>;
}

/// Records every declared specifier as-is, without pinning.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughResolver;

impl Resolver for PassthroughResolver {
  fn name(&self) -> &'static str {
    "passthrough"
  }

  fn resolve(&self, dependencies: &[String]) -> Result<Vec<LockedDependency>, ResolveError> {
    dependencies
      .iter()
      .map(|spec| {
        Ok(LockedDependency {
          name: specifier::requirement_name(spec)?,
          specifier: spec.trim().to_string(),
          version: None,
        })
      })
      .collect()
  }
}

/// Which resolver to use, as chosen in the build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum ResolverStrategy {
  #[default]
  Passthrough,
  Index { path: PathBuf },
}

impl ResolverStrategy {
  pub fn build(&self) -> Result<Box<dyn Resolver>, ResolveError> {
    match self {
      ResolverStrategy::Passthrough => Ok(Box::new(PassthroughResolver)),
      ResolverStrategy::Index { path } => Ok(Box::new(IndexResolver::from_file(path)?)),
    }
  }
}

/// The resolved set returned to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSet {
  pub lockfile: PathBuf,
  pub resolver: String,
  pub dependencies: Vec<LockedDependency>,
}

/// Resolves a project's dependencies and writes its lockfile.
pub struct DependencyResolver {
  root: PathBuf,
  resolver: Box<dyn Resolver>,
}

impl DependencyResolver {
  pub fn new(root: impl Into<PathBuf>, resolver: Box<dyn Resolver>) -> Self {
    Self {
      root: root.into(),
      resolver,
    }
  }

  /// A passthrough resolver for `root`.
  pub fn passthrough(root: impl Into<PathBuf>) -> Self {
    Self::new(root, Box::new(PassthroughResolver))
  }

  pub fn lock_path(&self) -> PathBuf {
    lock_path(&self.root)
  }

  /// Resolve `dependencies` and overwrite the lockfile with the result.
  pub fn resolve(&self, name: &str, version: &str, dependencies: &[String]) -> Result<ResolvedSet, ResolveError> {
    let resolved = self.resolver.resolve(dependencies)?;
    let path = self.lock_path();

    LockFile::new(name, version, self.resolver.name(), resolved.clone()).save(&path)?;
    info!(
      path = %path.display(),
      resolver = self.resolver.name(),
      entries = resolved.len(),
      "wrote lockfile"
    );

    Ok(ResolvedSet {
      lockfile: path,
      resolver: self.resolver.name().to_string(),
      dependencies: resolved,
    })
  }
}

/// Lockfile location for the project at `root`.
pub fn lock_path(root: &Path) -> PathBuf {
  root.join(LOCK_FILENAME)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn deps(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn lockfile_contains_project_and_one_entry_per_dependency() {
    let temp = TempDir::new().unwrap();
    let resolver = DependencyResolver::passthrough(temp.path());

    let set = resolver.resolve("demo", "1.0.0", &deps(&["a", "b"])).unwrap();

    let content = std::fs::read_to_string(&set.lockfile).unwrap();
    assert!(content.contains("\"demo\""));
    assert!(content.contains("\"1.0.0\""));
    let lock = LockFile::load(&set.lockfile).unwrap().unwrap();
    let names: Vec<_> = lock.dependencies.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
  }

  #[test]
  fn rerun_overwrites_instead_of_appending() {
    let temp = TempDir::new().unwrap();
    let resolver = DependencyResolver::passthrough(temp.path());

    resolver.resolve("demo", "1.0.0", &deps(&["a", "b"])).unwrap();
    resolver.resolve("demo", "1.0.0", &deps(&["a", "b"])).unwrap();

    let lock = LockFile::load(&resolver.lock_path()).unwrap().unwrap();
    assert_eq!(lock.dependencies.len(), 2);
  }

  #[test]
  fn passthrough_keeps_specifiers_unpinned() {
    let resolved = PassthroughResolver.resolve(&deps(&["Requests>=2", "click"])).unwrap();

    assert_eq!(resolved[0].name, "requests");
    assert_eq!(resolved[0].specifier, "Requests>=2");
    assert!(resolved.iter().all(|d| d.version.is_none()));
  }

  #[test]
  fn passthrough_rejects_nameless_specifier() {
    let err = PassthroughResolver.resolve(&deps(&[">=1.0"])).unwrap_err();

    assert!(matches!(err, ResolveError::InvalidRequirement { .. }));
  }

  #[test]
  fn failed_resolution_leaves_previous_lockfile() {
    let temp = TempDir::new().unwrap();
    let resolver = DependencyResolver::passthrough(temp.path());
    resolver.resolve("demo", "1.0.0", &deps(&["a"])).unwrap();

    assert!(resolver.resolve("demo", "1.0.0", &deps(&["=="])).is_err());

    let lock = LockFile::load(&resolver.lock_path()).unwrap().unwrap();
    assert_eq!(lock.dependencies.len(), 1);
  }

  #[test]
  fn unwritable_lockfile_is_a_lock_error() {
    let temp = TempDir::new().unwrap();
    let resolver = DependencyResolver::passthrough(temp.path().join("missing-dir"));

    let err = resolver.resolve("demo", "1.0.0", &[]).unwrap_err();

    assert!(matches!(err, ResolveError::Lock(LockError::Write(_))));
  }

  #[test]
  fn index_strategy_pins_versions() {
    let temp = TempDir::new().unwrap();
    let index = temp.path().join("index.toml");
    std::fs::write(&index, "[[package]]\nname = \"a\"\nversion = \"1.2.0\"\n").unwrap();
    let strategy = ResolverStrategy::Index { path: index };

    let resolver = DependencyResolver::new(temp.path(), strategy.build().unwrap());
    let set = resolver.resolve("demo", "1.0.0", &deps(&["a>=1"])).unwrap();

    assert_eq!(set.resolver, "index");
    assert_eq!(set.dependencies[0].version.as_deref(), Some("1.2.0"));
  }
}
