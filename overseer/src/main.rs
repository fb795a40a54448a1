//! Orchestrator-side binary for courier runs.
//!
//! The worker is launched as an independent process with no return
//! channel; the only coordination is the file-based handoff: the worker
//! raises a completion marker once its report is durably written, and this
//! binary polls for the marker, consumes it, and presents the report.

mod cli;
mod spawn;
mod summary;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use courier::config::DEFAULT_SETTINGS_FILE;

#[derive(Parser)]
#[command(
    name = "overseer",
    version,
    about = "Launches and observes courier worker runs"
)]
struct Cli {
    /// Settings file shared with the worker.
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Spawn a worker run and wait for its completion signal.
    Launch {
        /// Give up waiting after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Wait for the completion signal of an already-running worker.
    Await {
        /// Give up waiting after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Ask the running worker to stop between recipients.
    Cancel,
    /// Print the summary of the most recent run report.
    Summary,
}

fn main() {
    courier::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Launch { timeout } => cli::launch(&cli.config, timeout),
        Command::Await { timeout } => cli::await_worker(&cli.config, timeout),
        Command::Cancel => cli::cancel(&cli.config),
        Command::Summary => cli::summary(&cli.config),
    }
}
