use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::{
    capture,
    config::{AppConfig, DetectArgs, RunArgs, SweepArgs},
    diagnostics,
};

#[derive(Debug, Parser)]
#[command(
    name = "facecam",
    version,
    about = "Scheduled pan/tilt face capture",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    run: RunArgs,
    /// Debug-level logging unless RUST_LOG says otherwise.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Wait for the schedule, find a face, center it and capture (default).
    Run(RunArgs),
    /// Sweep both servos through a raster and return home.
    Sweep(SweepArgs),
    /// Log what the face sensor sees.
    Detect(DetectArgs),
}

pub fn handle_commands(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Run(args)) => capture::run(&AppConfig::try_from(args)?),
        Some(Command::Sweep(args)) => {
            diagnostics::sweep(&args.settings.setting_path, args.dry_run, args.rows)
        }
        Some(Command::Detect(args)) => {
            diagnostics::detect(&args.settings.setting_path, args.polls)
        }
        None => capture::run(&AppConfig::try_from(cli.run)?),
    }
}
