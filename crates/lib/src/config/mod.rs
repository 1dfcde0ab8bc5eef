//! Build configuration.
//!
//! Loaded from the first of `packwright.toml` / `.packwright.toml` found in
//! the project root, or from an explicit path. Every key is optional and
//! lives under the `[packwright]` table:
//!
//! ```toml
//! [packwright]
//! targets = ["wheel", "docker"]
//! keep_going = false
//! jobs = 2
//! plugins = ".packwright/builders.toml"
//!
//! [packwright.resolver]
//! strategy = "index"
//! index = "packages.toml"
//!
//! [packwright.sandbox]
//! interpreter = "python3.12"
//! dir = "/var/tmp/packwright"
//!
//! [packwright.target.docker]
//! base_image = "python:3.12-slim"
//! entrypoint = ["python", "-m", "demo"]
//! ```
//!
//! `PACKWRIGHT_PYTHON` and `PACKWRIGHT_SANDBOX_DIR` override the sandbox
//! interpreter and directory.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::builder::{BuiltinKind, TargetName, TargetSettings};
use crate::consts::{CONFIG_FILENAMES, DEFAULT_INTERPRETER, ENV_PYTHON, ENV_SANDBOX_DIR, PLUGIN_MANIFEST};
use crate::resolve::ResolverStrategy;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {}", path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read config {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {}: {message}", path.display())]
  Parse { path: PathBuf, message: String },

  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Sandbox provisioning settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
  /// Interpreter used to seed each sandbox's toolchain.
  pub interpreter: String,
  /// Base directory for sandboxes; the system temp dir when unset.
  pub dir: Option<PathBuf>,
}

impl SandboxConfig {
  pub fn base_dir(&self) -> PathBuf {
    self.dir.clone().unwrap_or_else(std::env::temp_dir)
  }
}

impl Default for SandboxConfig {
  fn default() -> Self {
    Self {
      interpreter: DEFAULT_INTERPRETER.to_string(),
      dir: None,
    }
  }
}

/// Effective build configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
  /// File the configuration came from, if any.
  pub source: Option<PathBuf>,
  /// Requested targets; empty selects every discovered builder.
  pub targets: Vec<String>,
  pub keep_going: bool,
  /// Maximum targets in flight. At least 1.
  pub jobs: usize,
  /// Extension manifest, absolute.
  pub plugins: PathBuf,
  pub resolver: ResolverStrategy,
  pub sandbox: SandboxConfig,
  /// Opaque settings per target name.
  pub settings: BTreeMap<String, TargetSettings>,
}

impl BuildConfig {
  /// Defaults for the project at `root`.
  pub fn defaults(root: &Path) -> Self {
    Self {
      source: None,
      targets: BuiltinKind::ALL.iter().map(|k| k.as_str().to_string()).collect(),
      keep_going: false,
      jobs: 1,
      plugins: root.join(PLUGIN_MANIFEST),
      resolver: ResolverStrategy::Passthrough,
      sandbox: SandboxConfig::default(),
      settings: BTreeMap::new(),
    }
  }

  /// Load the configuration for `root`.
  ///
  /// With `explicit` set, that file must exist. Otherwise the known file
  /// names are searched in order and defaults are used when none exists.
  /// Environment overrides are applied last.
  pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let path = match explicit {
      Some(path) if path.is_file() => Some(path.to_path_buf()),
      Some(path) => return Err(ConfigError::NotFound { path: path.to_path_buf() }),
      None => find_config(root),
    };

    let mut config = match path {
      Some(path) => {
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
          path: path.clone(),
          source,
        })?;
        let config = Self::parse(root, &content, &path)?;
        debug!(path = %path.display(), "loaded build config");
        config
      }
      None => {
        debug!(root = %root.display(), "no build config found; using defaults");
        Self::defaults(root)
      }
    };

    config.apply_env();
    Ok(config)
  }

  /// Parse configuration text. Relative paths resolve against `root`.
  pub fn parse(root: &Path, content: &str, path: &Path) -> Result<Self, ConfigError> {
    let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      message: e.message().to_string(),
    })?;

    let mut config = Self::defaults(root);
    config.source = Some(path.to_path_buf());

    let Some(raw) = file.packwright else {
      return Ok(config);
    };

    if let Some(targets) = raw.targets {
      for name in &targets {
        TargetName::new(name.as_str()).map_err(|e| ConfigError::Invalid(e.to_string()))?;
      }
      config.targets = targets;
    }
    if let Some(keep_going) = raw.keep_going {
      config.keep_going = keep_going;
    }
    if let Some(jobs) = raw.jobs {
      if jobs == 0 {
        return Err(ConfigError::Invalid("jobs must be at least 1".to_string()));
      }
      config.jobs = jobs;
    }
    if let Some(plugins) = raw.plugins {
      config.plugins = root.join(plugins);
    }

    config.resolver = match (raw.resolver.strategy.as_deref(), raw.resolver.index) {
      (None | Some("passthrough"), _) => ResolverStrategy::Passthrough,
      (Some("index"), Some(index)) => ResolverStrategy::Index { path: root.join(index) },
      (Some("index"), None) => {
        return Err(ConfigError::Invalid(
          "resolver strategy 'index' requires an 'index' path".to_string(),
        ));
      }
      (Some(other), _) => {
        return Err(ConfigError::Invalid(format!(
          "unknown resolver strategy '{}' (expected 'passthrough' or 'index')",
          other
        )));
      }
    };

    if let Some(interpreter) = raw.sandbox.interpreter {
      config.sandbox.interpreter = interpreter;
    }
    config.sandbox.dir = raw.sandbox.dir.map(|dir| root.join(dir));
    config.settings = raw.target;

    Ok(config)
  }

  fn apply_env(&mut self) {
    if let Some(python) = std::env::var(ENV_PYTHON).ok().filter(|v| !v.is_empty()) {
      debug!(interpreter = %python, "sandbox interpreter overridden by {}", ENV_PYTHON);
      self.sandbox.interpreter = python;
    }
    if let Some(dir) = std::env::var_os(ENV_SANDBOX_DIR).filter(|v| !v.is_empty()) {
      self.sandbox.dir = Some(PathBuf::from(dir));
    }
  }

  pub fn settings_for(&self, target: &str) -> Option<&TargetSettings> {
    self.settings.get(target)
  }
}

/// The first existing config file under `root`.
pub fn find_config(root: &Path) -> Option<PathBuf> {
  CONFIG_FILENAMES.iter().map(|name| root.join(name)).find(|p| p.is_file())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
  packwright: Option<RawConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
  targets: Option<Vec<String>>,
  keep_going: Option<bool>,
  jobs: Option<usize>,
  plugins: Option<PathBuf>,
  #[serde(default)]
  resolver: RawResolver,
  #[serde(default)]
  sandbox: RawSandbox,
  #[serde(default)]
  target: BTreeMap<String, TargetSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResolver {
  strategy: Option<String>,
  index: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSandbox {
  interpreter: Option<String>,
  dir: Option<PathBuf>,
}
