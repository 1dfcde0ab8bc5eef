//! Implementation of the `packwright targets` command.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use packwright_lib::builder::FactoryOrigin;
use packwright_lib::pipeline::{Pipeline, RunOptions};

use super::{absolute_opt, project_root};
use crate::output::{ARROW, OutputFormat, Status, print_field, print_json, print_status};

#[derive(Debug, Args)]
pub struct TargetsArgs {
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

#[derive(Serialize)]
struct TargetEntry<'a> {
  target: &'a str,
  origin: &'a FactoryOrigin,
  /// Built by a plain `packwright build`.
  default: bool,
}

/// List every discovered builder and where it came from.
pub fn cmd_targets(args: TargetsArgs) -> Result<ExitCode> {
  let mut options = RunOptions::new(project_root(&args.project)?);
  options.config = absolute_opt(args.config.as_deref())?;
  let config = options.load_config().context("Failed to load build configuration")?;

  let registry = Pipeline::new().discover(&config);
  let selected: BTreeSet<String> = registry
    .select(&config.targets)
    .factories
    .iter()
    .map(|f| f.target().to_string())
    .collect();

  let entries: Vec<TargetEntry> = registry
    .factories()
    .map(|f| TargetEntry {
      target: f.target().as_str(),
      origin: f.origin(),
      default: selected.contains(f.target().as_str()),
    })
    .collect();

  if args.format.is_json() {
    print_json(&entries)?;
    return Ok(ExitCode::SUCCESS);
  }

  print_status(Status::Note, &format!("{} builder(s) available", entries.len()));
  for entry in &entries {
    let marker = if entry.default { ARROW } else { " " };
    println!("  {} {}", marker, entry.target);
    print_field("    origin", &entry.origin.to_string());
  }
  Ok(ExitCode::SUCCESS)
}
