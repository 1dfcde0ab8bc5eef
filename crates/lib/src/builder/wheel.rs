//! Wheel builder producing a placeholder distribution manifest.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{Builder, BuilderError, TargetName, TargetSettings, configured, write_artifact};
use crate::project::ProjectRecord;
use crate::sandbox::SandboxEnv;

pub struct WheelBuilder {
  target: TargetName,
  project: Option<Arc<ProjectRecord>>,
}

impl WheelBuilder {
  pub fn new(target: TargetName) -> Self {
    Self { target, project: None }
  }

  /// File name of the artifact this builder writes.
  pub fn artifact_name(project: &ProjectRecord) -> String {
    format!("{}-{}-WHEEL.txt", project.name, project.version)
  }
}

impl Builder for WheelBuilder {
  fn target(&self) -> &TargetName {
    &self.target
  }

  fn configure(&mut self, project: Arc<ProjectRecord>, _settings: Option<&TargetSettings>) -> Result<(), BuilderError> {
    self.project = Some(project);
    Ok(())
  }

  fn build(&self, out_dir: &Path, _sandbox: &SandboxEnv) -> Result<(), BuilderError> {
    let project = configured(&self.project, &self.target)?;

    let mut lines = vec![format!("Name: {}", project.name), format!("Version: {}", project.version)];
    lines.extend(project.requires_python.iter().map(|r| format!("Requires-Python: {}", r)));
    lines.extend(project.dependencies.iter().map(|d| format!("Requires-Dist: {}", d)));
    let content = lines.join("\n") + "\n";

    let path = write_artifact(out_dir, &Self::artifact_name(project), &content)?;
    info!(target = %self.target, path = %path.display(), "wrote wheel placeholder");
    Ok(())
  }
}
