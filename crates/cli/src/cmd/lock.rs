//! Implementation of the `packwright lock` command.
//!
//! Scans the project and resolves its dependencies, writing the lockfile,
//! without provisioning any sandbox.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use packwright_lib::pipeline::{Pipeline, RunOptions};

use super::{absolute_opt, project_root};
use crate::output::{ARROW, OutputFormat, Status, print_fatal, print_field, print_json, print_status};

#[derive(Debug, Args)]
pub struct LockArgs {
  /// Project directory
  #[arg(default_value = ".")]
  pub project: PathBuf,

  /// Build configuration file
  #[arg(short, long)]
  pub config: Option<PathBuf>,

  /// Output format
  #[arg(long, value_enum, default_value_t)]
  pub format: OutputFormat,
}

pub fn cmd_lock(args: LockArgs) -> Result<ExitCode> {
  let mut options = RunOptions::new(project_root(&args.project)?);
  options.config = absolute_opt(args.config.as_deref())?;

  let resolved = match Pipeline::new().lock(&options) {
    Ok(resolved) => resolved,
    Err(e) => {
      print_fatal(args.format, &e)?;
      return Ok(ExitCode::FAILURE);
    }
  };

  if args.format.is_json() {
    print_json(&json!({
      "lockfile": resolved.lockfile,
      "resolver": resolved.resolver,
      "dependencies": resolved.dependencies,
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  print_status(Status::Success, &format!("Wrote {}", resolved.lockfile.display()));
  print_field("Resolver", &resolved.resolver);
  print_field("Dependencies", &resolved.dependencies.len().to_string());
  for dep in &resolved.dependencies {
    match &dep.version {
      Some(version) => println!("    {} {} {}", dep.specifier, ARROW, version),
      None => println!("    {}", dep.specifier),
    }
  }
  Ok(ExitCode::SUCCESS)
}
