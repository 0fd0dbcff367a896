mod capture;
mod cli;
mod config;
mod diagnostics;
mod telemetry;

use clap::Parser;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    telemetry::init(cli.verbose);
    cli::handle_commands(cli)
}
