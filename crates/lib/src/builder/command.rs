//! Builder running an external shell command inside the sandbox.
//!
//! The command runs from the project root and finds its inputs in these
//! variables, on top of the sandbox's isolated environment:
//! - `PACKWRIGHT_OUT`: the target's output directory (created beforehand)
//! - `PACKWRIGHT_TARGET`: the target name
//! - `PACKWRIGHT_PROJECT_NAME`, `PACKWRIGHT_PROJECT_VERSION`, `PACKWRIGHT_PROJECT_ROOT`
//!
//! The `env` setting (a table of strings) adds further variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Builder, BuilderError, TargetName, TargetSettings, configured};
use crate::project::ProjectRecord;
use crate::sandbox::{SandboxEnv, SandboxError};

pub struct CommandBuilder {
  target: TargetName,
  command: String,
  project: Option<Arc<ProjectRecord>>,
  env: BTreeMap<String, String>,
}

impl CommandBuilder {
  pub fn new(target: TargetName, command: String) -> Self {
    Self {
      target,
      command,
      project: None,
      env: BTreeMap::new(),
    }
  }

  pub fn command(&self) -> &str {
    &self.command
  }
}

impl Builder for CommandBuilder {
  fn target(&self) -> &TargetName {
    &self.target
  }

  fn configure(&mut self, project: Arc<ProjectRecord>, settings: Option<&TargetSettings>) -> Result<(), BuilderError> {
    let invalid = |message: String| BuilderError::InvalidSettings {
      target: self.target.clone(),
      message,
    };

    let mut env = BTreeMap::new();
    match settings.and_then(|s| s.get("env")) {
      Some(toml::Value::Table(table)) => {
        for (key, value) in table {
          let value = value
            .as_str()
            .ok_or_else(|| invalid(format!("env.{} must be a string", key)))?;
          env.insert(key.clone(), value.to_string());
        }
      }
      Some(_) => return Err(invalid("env must be a table of strings".to_string())),
      None => {}
    }

    self.env = env;
    self.project = Some(project);
    Ok(())
  }

  fn build(&self, out_dir: &Path, sandbox: &SandboxEnv) -> Result<(), BuilderError> {
    let project = configured(&self.project, &self.target)?;

    std::fs::create_dir_all(out_dir).map_err(|source| BuilderError::Io {
      path: out_dir.to_path_buf(),
      source,
    })?;

    let mut env = self.env.clone();
    env.insert("PACKWRIGHT_OUT".to_string(), out_dir.to_string_lossy().into_owned());
    env.insert("PACKWRIGHT_TARGET".to_string(), self.target.to_string());
    env.insert("PACKWRIGHT_PROJECT_NAME".to_string(), project.name.clone());
    env.insert("PACKWRIGHT_PROJECT_VERSION".to_string(), project.version.clone());
    env.insert(
      "PACKWRIGHT_PROJECT_ROOT".to_string(),
      project.root.to_string_lossy().into_owned(),
    );

    debug!(target = %self.target, command = %self.command, "running build command");
    match sandbox.run_shell(&self.command, &project.root, &env) {
      Ok(_) => {
        info!(target = %self.target, out = %out_dir.display(), "build command finished");
        Ok(())
      }
      Err(SandboxError::CommandFailed { code, stderr, .. }) => Err(BuilderError::CommandFailed { code, stderr }),
      Err(e) => Err(e.into()),
    }
  }
}
