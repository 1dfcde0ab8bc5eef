//! Implementation of the `packwright build` command.
//!
//! Runs the whole pipeline for one project and prints a per-target summary.
//! Ctrl-C removes every open sandbox before the process exits.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use packwright_lib::pipeline::{Pipeline, PipelineError, RunOptions, RunReport};

use super::{absolute_opt, project_root};
use crate::output::{
  OutputFormat, Status, elapsed, print_fatal, print_field, print_json, print_status, print_target, summary_line,
};

/// Exit code after an interrupt, following the shell convention for SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Args)]
pub struct BuildArgs {
  /// Project directory
  #[arg(default_value = ".")]
  pub project: PathBuf,

  /// Build only this target (repeatable)
  #[arg(long = "only", value_name = "TARGET")]
  pub only: Vec<String>,

  /// Output directory (default: <PROJECT>/dist)
  #[arg(short, long)]
  pub output: Option<PathBuf>,

  /// Build configuration file
  #[arg(short, long)]
  pub config: Option<PathBuf>,

  /// Keep building the remaining targets after one fails
  #[arg(long)]
  pub keep_going: bool,

  /// Number of targets built concurrently
  #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
  pub jobs: Option<u16>,

  /// Output format
  #[arg(long, value_enum, default_value_t)]
  pub format: OutputFormat,

  /// Interpreter used to bootstrap sandbox toolchains
  #[arg(long, value_name = "PATH")]
  pub python: Option<String>,

  /// Directory sandboxes are created in
  #[arg(long, value_name = "DIR")]
  pub sandbox_dir: Option<PathBuf>,
}

impl BuildArgs {
  fn run_options(&self) -> Result<RunOptions> {
    let mut options = RunOptions::new(project_root(&self.project)?);
    options.config = absolute_opt(self.config.as_deref())?;
    options.output_dir = absolute_opt(self.output.as_deref())?;
    options.targets = self.only.clone();
    options.keep_going = self.keep_going;
    options.jobs = self.jobs.map(usize::from);
    options.interpreter = self.python.clone();
    options.sandbox_dir = absolute_opt(self.sandbox_dir.as_deref())?;
    Ok(options)
  }
}

/// Execute the build command.
///
/// Exits 0 when every selected target was built, 1 on a fatal error or any
/// failed target, and 130 when interrupted.
pub fn cmd_build(args: BuildArgs) -> Result<ExitCode> {
  let options = args.run_options()?;
  debug!(root = %options.root.display(), targets = ?options.targets, "starting build");
  let start = Instant::now();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(async {
    let pipeline = Pipeline::new();
    pipeline.run_until(&options, interrupt()).await
  });
  let took = start.elapsed();

  match result {
    Ok(report) => {
      if args.format.is_json() {
        print_json(&report)?;
      } else {
        print_report(&report);
        print_field("Elapsed", &elapsed(took));
      }
      Ok(if report.is_success() {
        ExitCode::SUCCESS
      } else {
        ExitCode::FAILURE
      })
    }
    Err(e) => {
      print_fatal(args.format, &e)?;
      Ok(match e {
        PipelineError::Interrupted { .. } => ExitCode::from(EXIT_INTERRUPTED),
        _ => ExitCode::FAILURE,
      })
    }
  }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupt() {
  if tokio::signal::ctrl_c().await.is_err() {
    std::future::pending::<()>().await;
  }
}

fn print_report(report: &RunReport) {
  print_status(Status::Note, &format!("{} {}", report.project, report.version));
  print_field("Lockfile", &report.lockfile.display().to_string());
  print_field("Output", &report.output_dir.display().to_string());
  print_field("Policy", &report.policy.to_string());
  println!();

  for target in &report.targets {
    print_target(target);
  }

  println!();
  let (status, summary) = summary_line(report);
  print_status(status, &summary);
}
