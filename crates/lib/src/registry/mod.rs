//! Builder discovery.
//!
//! The registry is built once at startup from an ordered list of
//! [`PluginSource`]s: compiled-in registrations ([`StaticSource`]) first,
//! then the extension manifest ([`ManifestSource`]). A failing source is
//! logged and contributes nothing. When no source contributes anything the
//! registry falls back to exactly the three built-in builders.
//!
//! Manifest format:
//!
//! ```toml
//! [[builder]]
//! target = "sdist"
//! command = "python -m build --sdist --outdir \"$PACKWRIGHT_OUT\""
//!
//! [[builder]]
//! target = "wheel"
//! builtin = "wheel"
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builder::{BuilderFactory, BuiltinKind, FactoryOrigin, TargetName};

#[derive(Debug, Error)]
pub enum DiscoveryError {
  #[error("failed to read extension manifest {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("malformed extension manifest {}: {message}", path.display())]
  Parse { path: PathBuf, message: String },
}

/// An external registration mechanism queried during discovery.
pub trait PluginSource {
  /// Short label used in log lines.
  fn name(&self) -> &str;

  /// Registrations offered by this source, in registration order.
  fn entries(&self) -> Result<Vec<BuilderFactory>, DiscoveryError>;
}

/// Registrations compiled into the embedding application.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
  factories: Vec<BuilderFactory>,
}

impl StaticSource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, factory: BuilderFactory) -> Self {
    self.factories.push(factory);
    self
  }
}

impl PluginSource for StaticSource {
  fn name(&self) -> &str {
    "static"
  }

  fn entries(&self) -> Result<Vec<BuilderFactory>, DiscoveryError> {
    Ok(self.factories.clone())
  }
}

/// Registrations declared in a TOML extension manifest.
#[derive(Debug, Clone)]
pub struct ManifestSource {
  path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
  #[serde(default)]
  builder: Vec<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
  target: String,
  builtin: Option<String>,
  command: Option<String>,
}

impl ManifestSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn factory(&self, entry: toml::Value) -> Result<BuilderFactory, String> {
    let entry: ManifestEntry = entry.try_into().map_err(|e: toml::de::Error| e.message().to_string())?;
    let target = TargetName::new(entry.target).map_err(|e| e.to_string())?;
    let origin = FactoryOrigin::Manifest(self.path.clone());

    match (entry.builtin, entry.command) {
      (Some(kind), None) => {
        let kind: BuiltinKind = kind.parse()?;
        Ok(BuilderFactory::builtin_as(target, kind, origin))
      }
      (None, Some(command)) if !command.trim().is_empty() => Ok(BuilderFactory::command(target, command, origin)),
      (None, Some(_)) => Err(format!("builder '{}' has an empty command", target)),
      _ => Err(format!("builder '{}' needs exactly one of 'builtin' or 'command'", target)),
    }
  }
}

impl PluginSource for ManifestSource {
  fn name(&self) -> &str {
    "manifest"
  }

  fn entries(&self) -> Result<Vec<BuilderFactory>, DiscoveryError> {
    let content = match std::fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "no extension manifest");
        return Ok(Vec::new());
      }
      Err(source) => {
        return Err(DiscoveryError::Read {
          path: self.path.clone(),
          source,
        });
      }
    };

    let manifest: Manifest = toml::from_str(&content).map_err(|e| DiscoveryError::Parse {
      path: self.path.clone(),
      message: e.message().to_string(),
    })?;

    let mut factories = Vec::with_capacity(manifest.builder.len());
    for (index, entry) in manifest.builder.into_iter().enumerate() {
      match self.factory(entry) {
        Ok(factory) => factories.push(factory),
        Err(reason) => {
          warn!(path = %self.path.display(), index, reason = %reason, "dropping invalid builder entry");
        }
      }
    }
    Ok(factories)
  }
}

/// Builders available for this run, keyed by target name.
#[derive(Debug, Clone, Default)]
pub struct BuilderRegistry {
  factories: BTreeMap<TargetName, BuilderFactory>,
}

/// Result of intersecting a requested target list with the registry.
#[derive(Debug, Clone)]
pub struct Selection {
  /// Selected factories in sorted target order.
  pub factories: Vec<BuilderFactory>,
  /// Requested names that are not registered.
  pub unknown: Vec<String>,
}

impl BuilderRegistry {
  /// The fixed built-in set: `binary`, `docker`, `wheel`.
  pub fn builtin() -> Self {
    let mut registry = Self::default();
    for kind in BuiltinKind::ALL {
      registry.register(BuilderFactory::builtin(kind));
    }
    registry
  }

  /// Query every source in order; fall back to [`BuilderRegistry::builtin`]
  /// when none contributes a builder. Never fails.
  pub fn discover(sources: &[&dyn PluginSource]) -> Self {
    let mut registry = Self::default();

    for source in sources {
      match source.entries() {
        Ok(entries) => {
          debug!(source = source.name(), count = entries.len(), "queried builder source");
          for factory in entries {
            registry.register(factory);
          }
        }
        Err(e) => warn!(source = source.name(), error = %e, "builder discovery failed; ignoring source"),
      }
    }

    if registry.is_empty() {
      info!("no external builders registered; using built-in builders");
      return Self::builtin();
    }
    registry
  }

  /// Register `factory` unless its target is already taken. The first
  /// registration wins; a dropped duplicate is logged.
  pub fn register(&mut self, factory: BuilderFactory) -> bool {
    if let Some(existing) = self.factories.get(factory.target()) {
      warn!(
        target = %factory.target(),
        kept = %existing.origin(),
        dropped = %factory.origin(),
        "duplicate builder registration dropped"
      );
      return false;
    }
    self.factories.insert(factory.target().clone(), factory);
    true
  }

  pub fn get(&self, target: &str) -> Option<&BuilderFactory> {
    self.factories.get(target)
  }

  /// Registered target names in sorted order.
  pub fn targets(&self) -> Vec<TargetName> {
    self.factories.keys().cloned().collect()
  }

  pub fn factories(&self) -> impl Iterator<Item = &BuilderFactory> {
    self.factories.values()
  }

  pub fn len(&self) -> usize {
    self.factories.len()
  }

  pub fn is_empty(&self) -> bool {
    self.factories.is_empty()
  }

  /// Intersect `requested` with the registry. An empty request selects
  /// every registered target. Unknown names are logged and reported.
  pub fn select(&self, requested: &[String]) -> Selection {
    if requested.is_empty() {
      return Selection {
        factories: self.factories.values().cloned().collect(),
        unknown: Vec::new(),
      };
    }

    let mut picked = BTreeMap::new();
    let mut unknown = Vec::new();
    for name in requested {
      match self.factories.get_key_value(name.as_str()) {
        Some((target, factory)) => {
          picked.insert(target.clone(), factory.clone());
        }
        None if !unknown.contains(name) => {
          warn!(target = %name, "requested target has no registered builder; ignoring");
          unknown.push(name.clone());
        }
        None => {}
      }
    }

    Selection {
      factories: picked.into_values().collect(),
      unknown,
    }
  }
}
