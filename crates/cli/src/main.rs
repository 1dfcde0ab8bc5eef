mod cmd;
mod output;

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, LockArgs, TargetsArgs};
use output::{Status, print_status};

/// packwright - Build distributable artifacts from one project definition
#[derive(Parser)]
#[command(name = "packwright")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
  #[command(flatten)]
  log: LogArgs,

  #[command(subcommand)]
  command: Option<Commands>,

  /// Arguments for the default `build` command
  #[command(flatten)]
  build: BuildArgs,
}

#[derive(Args)]
struct LogArgs {
  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, global = true, action = clap::ArgAction::Count, conflicts_with = "quiet")]
  verbose: u8,

  /// Only log warnings and errors
  #[arg(short, long, global = true)]
  quiet: bool,

  /// Emit logs as JSON lines
  #[arg(long, global = true)]
  log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Build artifacts for the selected targets (default)
  Build(BuildArgs),

  /// List discovered builders
  Targets(TargetsArgs),

  /// Resolve dependencies and write the lockfile without building
  Lock(LockArgs),
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(&cli.log);

  let result = match cli.command {
    Some(Commands::Build(args)) => cmd::cmd_build(args),
    Some(Commands::Targets(args)) => cmd::cmd_targets(args),
    Some(Commands::Lock(args)) => cmd::cmd_lock(args),
    None => cmd::cmd_build(cli.build),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_status(Status::Failure, &format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn init_tracing(log: &LogArgs) {
  let default_level = if log.quiet {
    "warn"
  } else {
    match log.verbose {
      0 => "info",
      1 => "debug",
      _ => "trace",
    }
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false);

  if log.log_json {
    builder.json().init();
  } else {
    builder.without_time().init();
  }
}
