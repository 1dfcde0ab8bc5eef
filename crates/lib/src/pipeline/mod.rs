//! Pipeline orchestration.
//!
//! A run moves through these stages:
//! 1. scan: read the project descriptor and the build configuration
//! 2. resolve: resolve dependencies and write the lockfile
//! 3. select: discover builders and intersect them with the requested targets
//! 4. per target, up to `jobs` at a time: provision, configure, build, teardown
//!
//! Errors in stages 1 to 3 end the run before any sandbox exists. Errors in
//! stage 4 are recorded in that target's [`TargetOutcome`]; what happens to
//! the other targets depends on the [`FailurePolicy`].

pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::builder::{BuilderError, BuilderFactory, TargetSettings};
use crate::config::BuildConfig;
use crate::consts::DEFAULT_OUTPUT_DIR;
use crate::project::{self, ProjectRecord};
use crate::registry::{BuilderRegistry, ManifestSource, PluginSource, StaticSource};
use crate::resolve::{DependencyResolver, ResolvedSet};
use crate::sandbox::{SandboxManager, Toolchain};
use crate::util::hash::collect_artifacts;

pub use types::{
  ErrorClass, FailurePolicy, PipelineError, RunReport, Stage, TargetError, TargetOutcome, TargetReport,
};

/// Caller-supplied options for one run. Set fields override the build
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  /// Project root.
  pub root: PathBuf,
  /// Explicit configuration file.
  pub config: Option<PathBuf>,
  /// Output root; `<root>/dist` when unset. Relative paths resolve against `root`.
  pub output_dir: Option<PathBuf>,
  /// Target filter; the configured targets when empty.
  pub targets: Vec<String>,
  /// Force the best-effort policy.
  pub keep_going: bool,
  pub jobs: Option<usize>,
  pub interpreter: Option<String>,
  pub sandbox_dir: Option<PathBuf>,
}

impl RunOptions {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      ..Default::default()
    }
  }

  fn output_root(&self) -> PathBuf {
    match &self.output_dir {
      Some(dir) => self.root.join(dir),
      None => self.root.join(DEFAULT_OUTPUT_DIR),
    }
  }

  /// Load the build configuration with these options applied on top.
  pub fn load_config(&self) -> Result<BuildConfig, PipelineError> {
    let mut config = BuildConfig::load(&self.root, self.config.as_deref())?;
    if !self.targets.is_empty() {
      config.targets = self.targets.clone();
    }
    config.keep_going |= self.keep_going;
    if let Some(jobs) = self.jobs {
      config.jobs = jobs.max(1);
    }
    if let Some(interpreter) = &self.interpreter {
      config.sandbox.interpreter = interpreter.clone();
    }
    if let Some(dir) = &self.sandbox_dir {
      config.sandbox.dir = Some(dir.clone());
    }
    Ok(config)
  }
}

/// Everything the build phase needs, fixed before any sandbox exists.
struct Prepared {
  project: Arc<ProjectRecord>,
  resolved: ResolvedSet,
  factories: Vec<BuilderFactory>,
  settings: BTreeMap<String, TargetSettings>,
  manager: SandboxManager,
  output_dir: PathBuf,
  policy: FailurePolicy,
  jobs: usize,
}

/// The build orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
  builders: StaticSource,
}

impl Pipeline {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builders compiled into the caller, queried before the extension manifest.
  pub fn with_builders(builders: StaticSource) -> Self {
    Self { builders }
  }

  /// Discover the builders available under `config`.
  pub fn discover(&self, config: &BuildConfig) -> BuilderRegistry {
    let manifest = ManifestSource::new(&config.plugins);
    let sources: [&dyn PluginSource; 2] = [&self.builders, &manifest];
    BuilderRegistry::discover(&sources)
  }

  /// Scan and resolve only, writing the lockfile.
  pub fn lock(&self, options: &RunOptions) -> Result<ResolvedSet, PipelineError> {
    let result = project::scan(&options.root)
      .map_err(PipelineError::from)
      .and_then(|project| {
        let config = options.load_config()?;
        resolve(&options.root, &config, &project)
      });
    if let Err(e) = &result {
      log_fatal(e);
    }
    result
  }

  /// Run to completion.
  pub async fn run(&self, options: &RunOptions) -> Result<RunReport, PipelineError> {
    self.run_until(options, std::future::pending()).await
  }

  /// Run until done or until `signal` resolves.
  ///
  /// On signal, the run is cancelled: no further target starts, every open
  /// sandbox is removed and commands still running inside one are killed.
  /// The call returns [`PipelineError::Interrupted`] only once every target
  /// task has stopped, so nothing writes to the output directory afterwards.
  pub async fn run_until(
    &self,
    options: &RunOptions,
    signal: impl Future<Output = ()>,
  ) -> Result<RunReport, PipelineError> {
    let result = match self.prepare(options) {
      Ok(prepared) => {
        let open = prepared.manager.open().clone();
        let cancel = prepared.manager.cancellation().clone();
        let build = build_all(prepared);
        tokio::pin!(build);

        tokio::select! {
          report = &mut build => Ok(report),
          () = signal => {
            cancel.cancel();
            let mut swept = open.sweep();
            info!(swept, "interrupted; waiting for running targets to stop");
            build.await;
            swept += open.sweep();
            warn!(swept, "interrupted; open sandboxes removed");
            Err(PipelineError::Interrupted { swept })
          }
        }
      }
      Err(e) => Err(e),
    };

    if let Err(e) = &result {
      log_fatal(e);
    }
    result
  }

  fn prepare(&self, options: &RunOptions) -> Result<Prepared, PipelineError> {
    let project = Arc::new(project::scan(&options.root)?);
    info!(name = %project.name, version = %project.version, "scanned project");
    let config = options.load_config()?;

    let resolved = resolve(&options.root, &config, &project)?;

    let registry = self.discover(&config);
    let selection = registry.select(&config.targets);
    if selection.factories.is_empty() {
      return Err(PipelineError::NoBuildersSelected {
        requested: config.targets.clone(),
        available: registry.targets().into_iter().map(String::from).collect(),
      });
    }
    info!(
      targets = ?selection.factories.iter().map(|f| f.target().as_str()).collect::<Vec<_>>(),
      "selected targets"
    );

    let output_dir = options.output_root();
    std::fs::create_dir_all(&output_dir).map_err(|source| PipelineError::Output {
      path: output_dir.clone(),
      source,
    })?;

    let manager = SandboxManager::new(
      config.sandbox.base_dir(),
      Toolchain::python(config.sandbox.interpreter.as_str()),
    );

    Ok(Prepared {
      project,
      resolved,
      factories: selection.factories,
      settings: config.settings,
      manager,
      output_dir,
      policy: FailurePolicy::from_keep_going(config.keep_going),
      jobs: config.jobs.max(1),
    })
  }
}

fn resolve(root: &Path, config: &BuildConfig, project: &ProjectRecord) -> Result<ResolvedSet, PipelineError> {
  let resolver = DependencyResolver::new(root, config.resolver.build()?);
  Ok(resolver.resolve(&project.name, &project.version, &project.dependencies)?)
}

fn log_fatal(e: &PipelineError) {
  error!(stage = %e.stage(), class = %e.class(), error = %e, "run failed");
}

/// Drive every selected target through provision, configure, build and
/// teardown, at most `jobs` at a time.
async fn build_all(prepared: Prepared) -> RunReport {
  let Prepared {
    project,
    resolved,
    factories,
    settings,
    manager,
    output_dir,
    policy,
    jobs,
  } = prepared;

  let semaphore = Arc::new(Semaphore::new(jobs));
  let failed = Arc::new(AtomicBool::new(false));
  let mut outcomes: Vec<TargetOutcome> = factories.iter().map(|_| TargetOutcome::Skipped).collect();
  let mut join_set = JoinSet::new();
  let mut task_index = HashMap::new();

  info!(targets = factories.len(), jobs, policy = %policy, "building targets");
  for (index, factory) in factories.iter().enumerate() {
    // Taking the permit before spawning keeps start order deterministic.
    let Ok(permit) = semaphore.clone().acquire_owned().await else {
      break;
    };
    if manager.cancellation().is_cancelled() {
      info!(target = %factory.target(), "run cancelled; not starting remaining targets");
      break;
    }
    if policy == FailurePolicy::FailFast && failed.load(Ordering::SeqCst) {
      info!(target = %factory.target(), "skipping target after earlier failure");
      continue;
    }

    let factory = factory.clone();
    let project = project.clone();
    let target_settings = settings.get(factory.target().as_str()).cloned();
    let out_dir = output_dir.join(factory.target().as_str());
    let manager = manager.clone();
    let failed = failed.clone();

    let handle = join_set.spawn(async move {
      let outcome = run_target(&factory, project, target_settings, &out_dir, &manager).await;
      if outcome.is_failed() {
        failed.store(true, Ordering::SeqCst);
      }
      drop(permit);
      outcome
    });
    task_index.insert(handle.id(), index);
  }

  while let Some(joined) = join_set.join_next_with_id().await {
    match joined {
      Ok((id, outcome)) => {
        if let Some(&index) = task_index.get(&id) {
          outcomes[index] = outcome;
        }
      }
      Err(e) => {
        error!(error = %e, "target task panicked");
        if let Some(&index) = task_index.get(&e.id()) {
          outcomes[index] = TargetOutcome::failed(TargetError::Aborted(e.to_string()));
        }
      }
    }
  }

  let targets: Vec<TargetReport> = factories
    .iter()
    .zip(outcomes)
    .map(|(factory, outcome)| TargetReport {
      target: factory.target().clone(),
      out_dir: output_dir.join(factory.target().as_str()),
      outcome,
    })
    .collect();

  let report = RunReport {
    project: project.name.clone(),
    version: project.version.clone(),
    lockfile: resolved.lockfile,
    output_dir,
    policy,
    sandboxes: manager.created(),
    targets,
  };
  info!(
    built = report.built().count(),
    failed = report.failed().count(),
    skipped = report.skipped().count(),
    stage = %Stage::Done,
    "run complete"
  );
  report
}

/// One target's provision, configure, build and teardown cycle. The
/// sandbox is torn down on every path out of this function.
async fn run_target(
  factory: &BuilderFactory,
  project: Arc<ProjectRecord>,
  settings: Option<TargetSettings>,
  out_dir: &Path,
  manager: &SandboxManager,
) -> TargetOutcome {
  let target = factory.target().clone();
  let fail = |err: TargetError| {
    error!(target = %target, stage = %err.stage(), error = %err, "target failed");
    TargetOutcome::failed(err)
  };

  debug!(target = %target, stage = %Stage::Provision, "provisioning sandbox");
  let mut sandbox = match manager.acquire().await {
    Ok(sandbox) => sandbox,
    Err(e) => return fail(TargetError::Provision(e)),
  };

  let mut builder = factory.create();
  debug!(target = %target, stage = %Stage::Configure, "configuring builder");
  let built = match builder.configure(project, settings.as_ref()) {
    Err(e) => Err(TargetError::Configure(e)),
    Ok(()) if sandbox.env().cancellation().is_cancelled() => Err(TargetError::Cancelled(Stage::Build)),
    Ok(()) => {
      info!(target = %target, out = %out_dir.display(), "building target");
      let env = sandbox.env().clone();
      let build_dir = out_dir.to_path_buf();
      let build = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&build_dir).map_err(|source| BuilderError::Io {
          path: build_dir.clone(),
          source,
        })?;
        builder.build(&build_dir, &env)
      });
      match build.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TargetError::Build(e)),
        Err(e) => Err(TargetError::Aborted(e.to_string())),
      }
    }
  };

  debug!(target = %target, stage = %Stage::Teardown, "tearing down sandbox");
  let teardown = match tokio::task::spawn_blocking(move || sandbox.release()).await {
    Ok(result) => result.map_err(TargetError::Teardown),
    Err(e) => Err(TargetError::Aborted(e.to_string())),
  };

  match (built, teardown) {
    (Err(e), Err(teardown)) => {
      warn!(target = %target, error = %teardown, "sandbox teardown also failed");
      fail(e)
    }
    (Err(e), Ok(())) | (Ok(()), Err(e)) => fail(e),
    (Ok(()), Ok(())) => match collect_artifacts(out_dir) {
      Ok(artifacts) => {
        info!(target = %target, artifacts = artifacts.len(), "target built");
        TargetOutcome::Built { artifacts }
      }
      Err(e) => fail(TargetError::Artifacts(e)),
    },
  }
}
