//! Lockfile persistence.
//!
//! The lockfile (`packwright.lock`) records the resolved dependency set of
//! the last run. It lives at the project root and is overwritten on every
//! run.
//!
//! # Lock File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "project": { "name": "demo", "version": "1.0.0" },
//!   "created": "2026-01-01T00:00:00Z",
//!   "resolver": "passthrough",
//!   "dependencies": [
//!     { "name": "a", "specifier": "a" },
//!     { "name": "b", "specifier": "b>=1", "version": "1.2.0" }
//!   ]
//! }
//! ```

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current lock file format version.
pub const LOCK_VERSION: u32 = 1;

/// A persisted dependency snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
  /// Lock file format version.
  pub version: u32,
  pub project: LockedProject,
  /// UTC creation time, whole seconds.
  #[serde(with = "rfc3339_seconds")]
  pub created: DateTime<Utc>,
  /// Name of the resolver that produced the entries.
  pub resolver: String,
  /// One entry per declared dependency, in resolution order.
  pub dependencies: Vec<LockedDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProject {
  pub name: String,
  pub version: String,
}

/// A resolved dependency entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
  /// Normalized project name.
  pub name: String,
  /// The specifier as declared (or as pulled in transitively).
  pub specifier: String,
  /// Pinned version; absent for unpinned entries.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to read lock file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write lock file: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse lock file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize lock file: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported lock file version {0}, expected {LOCK_VERSION}")]
  UnsupportedVersion(u32),
}

impl LockFile {
  /// A snapshot stamped with the current time.
  pub fn new(
    name: impl Into<String>,
    version: impl Into<String>,
    resolver: impl Into<String>,
    dependencies: Vec<LockedDependency>,
  ) -> Self {
    Self {
      version: LOCK_VERSION,
      project: LockedProject {
        name: name.into(),
        version: version.into(),
      },
      created: Utc::now().trunc_subsecs(0),
      resolver: resolver.into(),
      dependencies,
    }
  }

  /// Load a lock file from `path`.
  ///
  /// Returns `Ok(None)` if the file doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, LockError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(LockError::Read(e)),
    };

    // Check the version before the full schema so newer files report the
    // version mismatch instead of a field error.
    let header: VersionHeader = serde_json::from_str(&content).map_err(LockError::Parse)?;
    if header.version != LOCK_VERSION {
      return Err(LockError::UnsupportedVersion(header.version));
    }

    let lock: LockFile = serde_json::from_str(&content).map_err(LockError::Parse)?;
    Ok(Some(lock))
  }

  /// Write the lock file to `path`, replacing any previous content.
  pub fn save(&self, path: &Path) -> Result<(), LockError> {
    let mut content = serde_json::to_string_pretty(self).map_err(LockError::Serialize)?;
    content.push('\n');
    fs::write(path, content).map_err(LockError::Write)?;
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&LockedDependency> {
    self.dependencies.iter().find(|d| d.name == name)
  }
}

#[derive(Deserialize)]
struct VersionHeader {
  version: u32,
}

mod rfc3339_seconds {
  use chrono::{DateTime, SecondsFormat, Utc};
  use serde::{Deserialize, Deserializer, Serializer, de};

  pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(de::Error::custom)
  }
}
