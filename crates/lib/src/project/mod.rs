//! Project descriptor loading.
//!
//! Reads the `[project]` table of `pyproject.toml` into an immutable
//! [`ProjectRecord`]. Scanning is read-only and has no side effects.
//!
//! ```toml
//! [project]
//! name = "demo"
//! version = "0.1.0"
//! requires-python = ">=3.10"
//! dependencies = ["requests>=2", "click"]
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::DESCRIPTOR_FILENAME;

/// Identity and dependency declarations of the project being packaged.
///
/// Created once per run by [`scan`] and shared read-only with every builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
  /// Distribution name. Never empty.
  pub name: String,
  /// Version string. Never empty.
  pub version: String,
  /// Project root directory.
  pub root: PathBuf,
  /// Language-version constraint (`requires-python`).
  pub requires_python: Option<String>,
  /// Dependency specifiers in declaration order.
  pub dependencies: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ScanError {
  #[error("project descriptor not found at {}", path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("malformed project descriptor {}: {reason}", path.display())]
  Malformed { path: PathBuf, reason: String },
}

/// Path of the project descriptor under `root`.
pub fn descriptor_path(root: &Path) -> PathBuf {
  root.join(DESCRIPTOR_FILENAME)
}

/// Scan the project at `root`.
pub fn scan(root: &Path) -> Result<ProjectRecord, ScanError> {
  let path = descriptor_path(root);

  let content = match fs::read_to_string(&path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ScanError::NotFound { path }),
    Err(source) => return Err(ScanError::Read { path, source }),
  };

  let record = parse_descriptor(&content, root).map_err(|reason| ScanError::Malformed { path, reason })?;
  debug!(name = %record.name, version = %record.version, deps = record.dependencies.len(), "scanned project");
  Ok(record)
}

fn parse_descriptor(content: &str, root: &Path) -> Result<ProjectRecord, String> {
  let doc: toml::Table = toml::from_str(content).map_err(|e| e.message().to_string())?;

  let project = match doc.get("project") {
    Some(toml::Value::Table(project)) => project,
    Some(_) => return Err("[project] must be a table".to_string()),
    None => return Err("missing [project] table".to_string()),
  };

  let name = match project.get("name") {
    Some(toml::Value::String(name)) if name.trim().is_empty() => return Err("project.name is empty".to_string()),
    Some(toml::Value::String(name)) if is_valid_name(name.trim()) => name.trim().to_string(),
    Some(toml::Value::String(name)) => {
      return Err(format!(
        "project.name '{}' must be ASCII letters, digits, '-', '_' or '.', starting and ending with a letter or digit",
        name.trim()
      ));
    }
    Some(_) => return Err("project.name must be a string".to_string()),
    None => return Err("project.name is required".to_string()),
  };

  let version = match project.get("version") {
    Some(toml::Value::String(v)) if !v.trim().is_empty() => v.trim().to_string(),
    Some(toml::Value::String(_)) => return Err("project.version is empty".to_string()),
    Some(toml::Value::Integer(v)) => v.to_string(),
    Some(toml::Value::Float(v)) => v.to_string(),
    Some(_) => return Err("project.version must be a string".to_string()),
    None if is_dynamic(project, "version") => {
      return Err("project.version is dynamic; a static version is required".to_string());
    }
    None => return Err("project.version is required".to_string()),
  };

  if !is_valid_version(&version) {
    return Err(format!(
      "project.version '{}' may only contain ASCII letters, digits, '.', '+', '!', '-' or '_'",
      version
    ));
  }

  let requires_python = match project.get("requires-python") {
    Some(toml::Value::String(spec)) => Some(spec.clone()),
    Some(_) => return Err("project.requires-python must be a string".to_string()),
    None => None,
  };

  let dependencies = match project.get("dependencies") {
    Some(toml::Value::Array(items)) => items
      .iter()
      .enumerate()
      .map(|(i, item)| match item {
        toml::Value::String(spec) => Ok(spec.clone()),
        _ => Err(format!("project.dependencies[{}] must be a string", i)),
      })
      .collect::<Result<Vec<_>, _>>()?,
    Some(_) => return Err("project.dependencies must be an array".to_string()),
    None => Vec::new(),
  };

  Ok(ProjectRecord {
    name,
    version,
    root: root.to_path_buf(),
    requires_python,
    dependencies,
  })
}

/// PEP 508 distribution name. Names end up in artifact file names, so
/// separators and dot segments must never get through.
fn is_valid_name(name: &str) -> bool {
  let bytes = name.as_bytes();
  match (bytes.first(), bytes.last()) {
    (Some(first), Some(last)) => {
      first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    }
    _ => false,
  }
}

fn is_valid_version(version: &str) -> bool {
  version.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric())
    && version
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'!' | b'-' | b'_'))
}

fn is_dynamic(project: &toml::Table, field: &str) -> bool {
  match project.get("dynamic") {
    Some(toml::Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(field)),
    _ => false,
  }
}
