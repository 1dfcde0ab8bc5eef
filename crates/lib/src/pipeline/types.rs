//! Types for pipeline runs.
//!
//! This module defines the stage and error taxonomy, the failure policy and
//! the per-target and per-run result types.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::builder::{BuilderError, TargetName};
use crate::config::ConfigError;
use crate::project::ScanError;
use crate::resolve::ResolveError;
use crate::sandbox::SandboxError;
use crate::util::hash::Artifact;

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Scan,
  Resolve,
  Select,
  Provision,
  Configure,
  Build,
  Teardown,
  Done,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::Scan => "scan",
      Stage::Resolve => "resolve",
      Stage::Select => "select",
      Stage::Provision => "provision",
      Stage::Configure => "configure",
      Stage::Build => "build",
      Stage::Teardown => "teardown",
      Stage::Done => "done",
    };
    f.write_str(name)
  }
}

/// Coarse error classification shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
  Configuration,
  Resolution,
  Environment,
  Build,
}

impl fmt::Display for ErrorClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorClass::Configuration => write!(f, "configuration error"),
      ErrorClass::Resolution => write!(f, "resolution error"),
      ErrorClass::Environment => write!(f, "environment error"),
      ErrorClass::Build => write!(f, "build error"),
    }
  }
}

/// What happens to the remaining targets after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
  /// Targets that have not started yet are skipped.
  #[default]
  FailFast,
  /// Every target runs; failures are collected.
  BestEffort,
}

impl FailurePolicy {
  pub fn from_keep_going(keep_going: bool) -> Self {
    if keep_going {
      FailurePolicy::BestEffort
    } else {
      FailurePolicy::FailFast
    }
  }
}

impl fmt::Display for FailurePolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailurePolicy::FailFast => write!(f, "fail-fast"),
      FailurePolicy::BestEffort => write!(f, "best-effort"),
    }
  }
}

/// Why a single target failed.
#[derive(Debug, Error)]
pub enum TargetError {
  #[error("sandbox provisioning failed: {0}")]
  Provision(#[source] SandboxError),

  #[error(transparent)]
  Configure(BuilderError),

  #[error(transparent)]
  Build(BuilderError),

  #[error("sandbox teardown failed: {0}")]
  Teardown(#[source] SandboxError),

  #[error("failed to collect artifacts: {0}")]
  Artifacts(#[source] io::Error),

  #[error("build task aborted: {0}")]
  Aborted(String),

  #[error("run cancelled before {0}")]
  Cancelled(Stage),
}

impl TargetError {
  pub fn stage(&self) -> Stage {
    match self {
      TargetError::Provision(_) => Stage::Provision,
      TargetError::Configure(_) => Stage::Configure,
      TargetError::Build(_) | TargetError::Artifacts(_) | TargetError::Aborted(_) => Stage::Build,
      TargetError::Teardown(_) => Stage::Teardown,
      TargetError::Cancelled(stage) => *stage,
    }
  }

  /// Target failures are build errors; provisioning and teardown problems
  /// are wrapped rather than aborting the run.
  pub fn class(&self) -> ErrorClass {
    ErrorClass::Build
  }
}

/// Result of one target.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TargetOutcome {
  Built {
    artifacts: Vec<Artifact>,
  },
  Failed {
    stage: Stage,
    #[serde(serialize_with = "display")]
    error: TargetError,
  },
  /// Not started because an earlier target failed under fail-fast.
  Skipped,
}

impl TargetOutcome {
  pub fn failed(error: TargetError) -> Self {
    TargetOutcome::Failed {
      stage: error.stage(),
      error,
    }
  }

  pub fn is_built(&self) -> bool {
    matches!(self, TargetOutcome::Built { .. })
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, TargetOutcome::Failed { .. })
  }
}

#[derive(Debug, Serialize)]
pub struct TargetReport {
  pub target: TargetName,
  /// The target's subdirectory of the output root.
  pub out_dir: PathBuf,
  #[serde(flatten)]
  pub outcome: TargetOutcome,
}

/// Result of a whole run, one report per selected target in sorted order.
#[derive(Debug, Serialize)]
pub struct RunReport {
  pub project: String,
  pub version: String,
  pub lockfile: PathBuf,
  pub output_dir: PathBuf,
  pub policy: FailurePolicy,
  /// Sandboxes provisioned during the run.
  pub sandboxes: u64,
  pub targets: Vec<TargetReport>,
}

impl RunReport {
  /// Returns true if every selected target was built.
  pub fn is_success(&self) -> bool {
    self.targets.iter().all(|t| t.outcome.is_built())
  }

  pub fn built(&self) -> impl Iterator<Item = &TargetReport> {
    self.targets.iter().filter(|t| t.outcome.is_built())
  }

  pub fn failed(&self) -> impl Iterator<Item = &TargetReport> {
    self.targets.iter().filter(|t| t.outcome.is_failed())
  }

  pub fn skipped(&self) -> impl Iterator<Item = &TargetReport> {
    self.targets.iter().filter(|t| matches!(t.outcome, TargetOutcome::Skipped))
  }

  pub fn get(&self, target: &str) -> Option<&TargetReport> {
    self.targets.iter().find(|t| t.target.as_str() == target)
  }
}

/// Fatal errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Scan(#[from] ScanError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Resolution(#[from] ResolveError),

  #[error(
    "no builders selected: requested [{}], available [{}]",
    requested.join(", "),
    available.join(", ")
  )]
  NoBuildersSelected {
    requested: Vec<String>,
    available: Vec<String>,
  },

  #[error("failed to create output directory {}: {source}", path.display())]
  Output {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("interrupted; removed {swept} open sandbox(es)")]
  Interrupted { swept: usize },
}

impl PipelineError {
  /// The stage the run was in when it failed.
  pub fn stage(&self) -> Stage {
    match self {
      PipelineError::Scan(_) | PipelineError::Config(_) => Stage::Scan,
      PipelineError::Resolution(_) => Stage::Resolve,
      PipelineError::NoBuildersSelected { .. } => Stage::Select,
      PipelineError::Output { .. } => Stage::Provision,
      PipelineError::Interrupted { .. } => Stage::Teardown,
    }
  }

  pub fn class(&self) -> ErrorClass {
    match self {
      PipelineError::Scan(_) | PipelineError::Config(_) | PipelineError::NoBuildersSelected { .. } => {
        ErrorClass::Configuration
      }
      PipelineError::Resolution(_) => ErrorClass::Resolution,
      PipelineError::Output { .. } | PipelineError::Interrupted { .. } => ErrorClass::Environment,
    }
  }
}

fn display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_str(value)
}
