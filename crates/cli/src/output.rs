//! Terminal rendering of build reports.
//!
//! Every line starts with a status symbol. Successes and notes go to stdout;
//! failures and warnings go to stderr so a piped report stays clean. The
//! `*_line` functions only format, which keeps them testable without a
//! terminal.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use packwright_lib::pipeline::{PipelineError, RunReport, TargetOutcome, TargetReport};
use packwright_lib::util::hash::Artifact;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Marks the default selection in listings and resolved pins in the lock summary.
pub const ARROW: &str = "→";

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Success,
  Failure,
  Warning,
  Note,
}

impl Status {
  pub fn symbol(self) -> &'static str {
    match self {
      Status::Success => "✓",
      Status::Failure => "✗",
      Status::Warning => "⚠",
      Status::Note => "•",
    }
  }
}

impl From<&TargetOutcome> for Status {
  fn from(outcome: &TargetOutcome) -> Self {
    match outcome {
      TargetOutcome::Built { .. } => Status::Success,
      TargetOutcome::Failed { .. } => Status::Failure,
      TargetOutcome::Skipped => Status::Warning,
    }
  }
}

pub fn print_status(status: Status, message: &str) {
  let symbol = status.symbol();
  match status {
    Status::Success => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.green()), message),
    Status::Note => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.blue()), message),
    Status::Warning => eprintln!(
      "{} {}",
      symbol.if_supports_color(Stream::Stderr, |s| s.yellow()),
      message.if_supports_color(Stream::Stderr, |s| s.yellow())
    ),
    Status::Failure => eprintln!(
      "{} {}",
      symbol.if_supports_color(Stream::Stderr, |s| s.red()),
      message.if_supports_color(Stream::Stderr, |s| s.red())
    ),
  }
}

/// An indented `label: value` line under a status line.
pub fn print_field(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Report a run-ending error with its stage and class.
pub fn print_fatal(format: OutputFormat, error: &PipelineError) -> anyhow::Result<()> {
  if format.is_json() {
    return print_json(&serde_json::json!({
      "error": error.to_string(),
      "stage": error.stage(),
      "class": error.class(),
    }));
  }
  print_status(
    Status::Failure,
    &format!("{} during {}: {}", error.class(), error.stage(), error),
  );
  Ok(())
}

/// The status line of one target.
pub fn target_line(report: &TargetReport) -> String {
  match &report.outcome {
    TargetOutcome::Built { artifacts } => format!("{} ({} artifact(s))", report.target, artifacts.len()),
    TargetOutcome::Failed { stage, error } => format!("{} failed during {}: {}", report.target, stage, error),
    TargetOutcome::Skipped => format!("{} skipped", report.target),
  }
}

/// An artifact listed under its target: full path, size and short digest.
pub fn artifact_line(out_dir: &Path, artifact: &Artifact) -> String {
  format!(
    "    {} {} {}",
    out_dir.join(&artifact.path).display(),
    human_size(artifact.size),
    short_digest(&artifact.sha256.0)
  )
}

/// Print a target's status line followed by its artifacts.
pub fn print_target(report: &TargetReport) {
  print_status(Status::from(&report.outcome), &target_line(report));
  if let TargetOutcome::Built { artifacts } = &report.outcome {
    for artifact in artifacts {
      println!("{}", artifact_line(&report.out_dir, artifact));
    }
  }
}

/// The closing line of a build report.
pub fn summary_line(report: &RunReport) -> (Status, String) {
  let total = report.targets.len();
  let built = report.built().count();
  if report.is_success() {
    (Status::Success, format!("Built {} of {} target(s)", built, total))
  } else {
    (
      Status::Failure,
      format!(
        "Built {} of {} target(s); {} failed, {} skipped",
        built,
        total,
        report.failed().count(),
        report.skipped().count()
      ),
    )
  }
}

/// Seconds with two decimals, e.g. `1.25s`.
pub fn elapsed(duration: Duration) -> String {
  format!("{:.2}s", duration.as_secs_f64())
}

fn human_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// First 12 hex digits of a SHA-256 digest.
fn short_digest(hex: &str) -> &str {
  hex.get(..12).unwrap_or(hex)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  use packwright_lib::builder::TargetName;
  use packwright_lib::pipeline::{FailurePolicy, Stage, TargetError};
  use packwright_lib::util::hash::ContentHash;

  fn report(target: &str, outcome: TargetOutcome) -> TargetReport {
    TargetReport {
      target: TargetName::new(target).unwrap(),
      out_dir: PathBuf::from("dist").join(target),
      outcome,
    }
  }

  fn artifact(path: &str, size: u64) -> Artifact {
    Artifact {
      path: PathBuf::from(path),
      size,
      sha256: ContentHash("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".to_string()),
    }
  }

  fn run_report(targets: Vec<TargetReport>) -> RunReport {
    RunReport {
      project: "demo".to_string(),
      version: "0.1.0".to_string(),
      lockfile: PathBuf::from("packwright.lock"),
      output_dir: PathBuf::from("dist"),
      policy: FailurePolicy::FailFast,
      sandboxes: targets.len() as u64,
      targets,
    }
  }

  #[test]
  fn target_lines_follow_outcome() {
    let built = report(
      "wheel",
      TargetOutcome::Built {
        artifacts: vec![artifact("demo.whl", 10)],
      },
    );
    let failed = report("docker", TargetOutcome::failed(TargetError::Cancelled(Stage::Build)));
    let skipped = report("binary", TargetOutcome::Skipped);

    assert_eq!(target_line(&built), "wheel (1 artifact(s))");
    assert_eq!(
      target_line(&failed),
      "docker failed during build: run cancelled before build"
    );
    assert_eq!(target_line(&skipped), "binary skipped");
    assert_eq!(Status::from(&built.outcome), Status::Success);
    assert_eq!(Status::from(&failed.outcome), Status::Failure);
    assert_eq!(Status::from(&skipped.outcome), Status::Warning);
  }

  #[test]
  fn artifact_line_shows_path_size_and_short_digest() {
    let line = artifact_line(Path::new("dist/wheel"), &artifact("demo.whl", 1536));

    assert_eq!(line, format!("    {} 1.5 KiB 9f86d081884c", Path::new("dist/wheel/demo.whl").display()));
  }

  #[test]
  fn summary_counts_failures_and_skips() {
    let ok = run_report(vec![report("wheel", TargetOutcome::Built { artifacts: vec![] })]);
    let mixed = run_report(vec![
      report("wheel", TargetOutcome::Built { artifacts: vec![] }),
      report("docker", TargetOutcome::failed(TargetError::Aborted("panic".to_string()))),
      report("binary", TargetOutcome::Skipped),
    ]);

    assert_eq!(summary_line(&ok), (Status::Success, "Built 1 of 1 target(s)".to_string()));
    assert_eq!(
      summary_line(&mixed),
      (Status::Failure, "Built 1 of 3 target(s); 1 failed, 1 skipped".to_string())
    );
  }

  #[test]
  fn sizes_scale_by_powers_of_1024() {
    assert_eq!(human_size(0), "0 B");
    assert_eq!(human_size(1023), "1023 B");
    assert_eq!(human_size(1024), "1.0 KiB");
    assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    assert_eq!(human_size(u64::MAX), format!("{:.1} TiB", u64::MAX as f64 / 1024f64.powi(4)));
  }

  #[test]
  fn digest_is_shortened_to_twelve_digits() {
    assert_eq!(short_digest("9f86d081884c7d659a2f"), "9f86d081884c");
    assert_eq!(short_digest("abc"), "abc");
  }

  #[test]
  fn elapsed_has_two_decimals() {
    assert_eq!(elapsed(Duration::from_millis(1250)), "1.25s");
    assert_eq!(elapsed(Duration::from_millis(40)), "0.04s");
  }
}
