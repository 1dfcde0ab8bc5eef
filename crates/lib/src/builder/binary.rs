//! Standalone binary builder producing a placeholder artifact.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{Builder, BuilderError, TargetName, TargetSettings, configured, write_artifact};
use crate::project::ProjectRecord;
use crate::sandbox::SandboxEnv;

pub struct BinaryBuilder {
  target: TargetName,
  project: Option<Arc<ProjectRecord>>,
}

impl BinaryBuilder {
  pub fn new(target: TargetName) -> Self {
    Self { target, project: None }
  }
}

impl Builder for BinaryBuilder {
  fn target(&self) -> &TargetName {
    &self.target
  }

  fn configure(&mut self, project: Arc<ProjectRecord>, _settings: Option<&TargetSettings>) -> Result<(), BuilderError> {
    self.project = Some(project);
    Ok(())
  }

  fn build(&self, out_dir: &Path, _sandbox: &SandboxEnv) -> Result<(), BuilderError> {
    let project = configured(&self.project, &self.target)?;
    let name = format!("{}-{}-BINARY.txt", project.name, project.version);
    let content = format!(
      "Standalone executable for {} {}\nReplace the {} builder to produce a real binary.\n",
      project.name, project.version, self.target
    );

    let path = write_artifact(out_dir, &name, &content)?;
    info!(target = %self.target, path = %path.display(), "wrote binary placeholder");
    Ok(())
  }
}
