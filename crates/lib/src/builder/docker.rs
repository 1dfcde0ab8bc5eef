//! Container builder writing a `Dockerfile`.
//!
//! Recognised settings:
//! - `base_image`: image for the `FROM` line (default `python:3.12-slim`)
//! - `entrypoint`: a string (split on whitespace) or an array of strings

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{Builder, BuilderError, TargetName, TargetSettings, configured, write_artifact};
use crate::project::ProjectRecord;
use crate::sandbox::SandboxEnv;

pub const DEFAULT_BASE_IMAGE: &str = "python:3.12-slim";

pub struct DockerBuilder {
  target: TargetName,
  project: Option<Arc<ProjectRecord>>,
  base_image: String,
  entrypoint: Option<Vec<String>>,
}

impl DockerBuilder {
  pub fn new(target: TargetName) -> Self {
    Self {
      target,
      project: None,
      base_image: DEFAULT_BASE_IMAGE.to_string(),
      entrypoint: None,
    }
  }

  fn invalid(&self, message: impl Into<String>) -> BuilderError {
    BuilderError::InvalidSettings {
      target: self.target.clone(),
      message: message.into(),
    }
  }

  fn render(&self, project: &ProjectRecord) -> String {
    let mut lines = vec![
      format!("FROM {}", self.base_image),
      format!(
        "LABEL org.opencontainers.image.title=\"{}\" org.opencontainers.image.version=\"{}\"",
        project.name, project.version
      ),
      "WORKDIR /app".to_string(),
      "COPY . /app".to_string(),
    ];
    if !project.dependencies.is_empty() {
      lines.push("RUN python -m pip install --no-cache-dir .".to_string());
    }
    lines.push(match &self.entrypoint {
      // serde_json renders a valid exec-form array, quoting included
      Some(args) => format!("ENTRYPOINT {}", serde_json::to_string(args).unwrap_or_default()),
      None => "CMD [\"python\", \"-c\", \"print('replace with your entrypoint')\"]".to_string(),
    });
    lines.join("\n") + "\n"
  }
}

impl Builder for DockerBuilder {
  fn target(&self) -> &TargetName {
    &self.target
  }

  fn configure(&mut self, project: Arc<ProjectRecord>, settings: Option<&TargetSettings>) -> Result<(), BuilderError> {
    if let Some(settings) = settings {
      match settings.get("base_image") {
        Some(toml::Value::String(image)) if !image.trim().is_empty() => self.base_image = image.trim().to_string(),
        Some(_) => return Err(self.invalid("base_image must be a non-empty string")),
        None => {}
      }

      self.entrypoint = match settings.get("entrypoint") {
        Some(toml::Value::String(cmd)) => {
          let args: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
          if args.is_empty() {
            return Err(self.invalid("entrypoint is empty"));
          }
          Some(args)
        }
        Some(toml::Value::Array(items)) => {
          let args = items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.invalid("entrypoint array must contain only strings"))?;
          if args.is_empty() {
            return Err(self.invalid("entrypoint is empty"));
          }
          Some(args)
        }
        Some(_) => return Err(self.invalid("entrypoint must be a string or an array of strings")),
        None => None,
      };
    }

    self.project = Some(project);
    Ok(())
  }

  fn build(&self, out_dir: &Path, _sandbox: &SandboxEnv) -> Result<(), BuilderError> {
    let project = configured(&self.project, &self.target)?;
    let path = write_artifact(out_dir, "Dockerfile", &self.render(project))?;
    info!(target = %self.target, path = %path.display(), base_image = %self.base_image, "wrote Dockerfile");
    Ok(())
  }
}
