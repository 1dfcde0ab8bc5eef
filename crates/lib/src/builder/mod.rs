//! Builder contract and the built-in builder variants.
//!
//! A builder is configured once with the project record and its opaque
//! target settings, then asked to build into its target's output directory
//! while running inside a sandbox. Variants:
//! - [`wheel::WheelBuilder`], [`docker::DockerBuilder`], [`binary::BinaryBuilder`]: built in
//! - [`command::CommandBuilder`]: registered through the extension manifest
//!
//! Builders are created by a [`BuilderFactory`] held in the registry.

pub mod binary;
pub mod command;
pub mod docker;
pub mod wheel;

use std::borrow::Borrow;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::ProjectRecord;
use crate::sandbox::{SandboxEnv, SandboxError};

pub use binary::BinaryBuilder;
pub use command::CommandBuilder;
pub use docker::DockerBuilder;
pub use wheel::WheelBuilder;

/// Per-target settings from the build configuration, passed through
/// untouched to the target's builder.
pub type TargetSettings = toml::Table;

/// Name of a builder variant, e.g. `wheel`.
///
/// Lowercase ASCII letters, digits, `-` and `_`, starting with a letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetName(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid target name '{0}': use lowercase letters, digits, '-' or '_'")]
pub struct InvalidTargetName(pub String);

impl TargetName {
  pub fn new(name: impl Into<String>) -> Result<Self, InvalidTargetName> {
    let name = name.into();
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid_start && valid_rest {
      Ok(Self(name))
    } else {
      Err(InvalidTargetName(name))
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TargetName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for TargetName {
  type Err = InvalidTargetName;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(s)
  }
}

impl TryFrom<String> for TargetName {
  type Error = InvalidTargetName;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::new(value)
  }
}

impl From<TargetName> for String {
  fn from(value: TargetName) -> Self {
    value.0
  }
}

impl Borrow<str> for TargetName {
  fn borrow(&self) -> &str {
    &self.0
  }
}

/// Errors raised by a builder.
#[derive(Debug, Error)]
pub enum BuilderError {
  #[error("builder '{target}' was not configured before build")]
  NotConfigured { target: TargetName },

  #[error("invalid settings for '{target}': {message}")]
  InvalidSettings { target: TargetName, message: String },

  #[error("failed to write {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("artifact name '{name}' is not a plain file name")]
  ArtifactName { name: String },

  #[error("build command exited with {}: {stderr}", code.map_or("a signal".to_string(), |c| format!("code {}", c)))]
  CommandFailed { code: Option<i32>, stderr: String },

  #[error(transparent)]
  Sandbox(#[from] SandboxError),
}

/// The capability set every builder variant implements.
pub trait Builder: Send {
  /// Target this builder produces artifacts for.
  fn target(&self) -> &TargetName;

  /// Capture the project record and target settings. Performs no I/O.
  fn configure(&mut self, project: Arc<ProjectRecord>, settings: Option<&TargetSettings>) -> Result<(), BuilderError>;

  /// Produce artifacts under `out_dir`, running tools inside `sandbox`.
  ///
  /// Fails with [`BuilderError::NotConfigured`] if called before `configure`.
  fn build(&self, out_dir: &Path, sandbox: &SandboxEnv) -> Result<(), BuilderError>;
}

/// The closed set of built-in builder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinKind {
  Binary,
  Docker,
  Wheel,
}

impl BuiltinKind {
  pub const ALL: [BuiltinKind; 3] = [BuiltinKind::Binary, BuiltinKind::Docker, BuiltinKind::Wheel];

  pub fn as_str(self) -> &'static str {
    match self {
      BuiltinKind::Binary => "binary",
      BuiltinKind::Docker => "docker",
      BuiltinKind::Wheel => "wheel",
    }
  }

  /// The target name this kind registers under by default.
  pub fn target(self) -> TargetName {
    TargetName(self.as_str().to_string())
  }

  fn create(self, target: TargetName) -> Box<dyn Builder> {
    match self {
      BuiltinKind::Binary => Box::new(BinaryBuilder::new(target)),
      BuiltinKind::Docker => Box::new(DockerBuilder::new(target)),
      BuiltinKind::Wheel => Box::new(WheelBuilder::new(target)),
    }
  }
}

impl FromStr for BuiltinKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "binary" => Ok(BuiltinKind::Binary),
      "docker" => Ok(BuiltinKind::Docker),
      "wheel" => Ok(BuiltinKind::Wheel),
      other => Err(format!("unknown built-in builder '{}'", other)),
    }
  }
}

impl fmt::Display for BuiltinKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where a factory was registered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "lowercase")]
pub enum FactoryOrigin {
  /// The fixed fallback set.
  Builtin,
  /// Registered in code by the embedding application.
  Static,
  /// Declared in an extension manifest.
  Manifest(PathBuf),
}

impl fmt::Display for FactoryOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FactoryOrigin::Builtin => write!(f, "builtin"),
      FactoryOrigin::Static => write!(f, "static"),
      FactoryOrigin::Manifest(path) => write!(f, "manifest:{}", path.display()),
    }
  }
}

type MakeBuilder = dyn Fn(&TargetName) -> Box<dyn Builder> + Send + Sync;

/// A named capability producing fresh [`Builder`] instances.
#[derive(Clone)]
pub struct BuilderFactory {
  target: TargetName,
  origin: FactoryOrigin,
  make: Arc<MakeBuilder>,
}

impl fmt::Debug for BuilderFactory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BuilderFactory")
      .field("target", &self.target)
      .field("origin", &self.origin)
      .finish_non_exhaustive()
  }
}

impl BuilderFactory {
  pub fn new(
    target: TargetName,
    origin: FactoryOrigin,
    make: impl Fn(&TargetName) -> Box<dyn Builder> + Send + Sync + 'static,
  ) -> Self {
    Self {
      target,
      origin,
      make: Arc::new(make),
    }
  }

  /// A built-in variant under its own target name.
  pub fn builtin(kind: BuiltinKind) -> Self {
    Self::new(kind.target(), FactoryOrigin::Builtin, move |target| kind.create(target.clone()))
  }

  /// A built-in variant registered under `target` by an external source.
  pub fn builtin_as(target: TargetName, kind: BuiltinKind, origin: FactoryOrigin) -> Self {
    Self::new(target, origin, move |target| kind.create(target.clone()))
  }

  /// A [`CommandBuilder`] running `command` inside the sandbox.
  pub fn command(target: TargetName, command: String, origin: FactoryOrigin) -> Self {
    Self::new(target, origin, move |target| {
      Box::new(CommandBuilder::new(target.clone(), command.clone()))
    })
  }

  pub fn target(&self) -> &TargetName {
    &self.target
  }

  pub fn origin(&self) -> &FactoryOrigin {
    &self.origin
  }

  /// Produce a new, unconfigured builder.
  pub fn create(&self) -> Box<dyn Builder> {
    (self.make)(&self.target)
  }
}

/// The configured project, or `NotConfigured`.
fn configured<'a>(
  project: &'a Option<Arc<ProjectRecord>>,
  target: &TargetName,
) -> Result<&'a Arc<ProjectRecord>, BuilderError> {
  project.as_ref().ok_or_else(|| BuilderError::NotConfigured { target: target.clone() })
}

/// Create `out_dir` and write `content` to `out_dir/name`.
fn write_artifact(out_dir: &Path, name: &str, content: &str) -> Result<PathBuf, BuilderError> {
  let mut components = Path::new(name).components();
  if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
    return Err(BuilderError::ArtifactName { name: name.to_string() });
  }

  std::fs::create_dir_all(out_dir).map_err(|source| BuilderError::Io {
    path: out_dir.to_path_buf(),
    source,
  })?;
  let path = out_dir.join(name);
  std::fs::write(&path, content).map_err(|source| BuilderError::Io {
    path: path.clone(),
    source,
  })?;
  Ok(path)
}
