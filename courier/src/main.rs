//! Bulk-messaging worker binary.
//!
//! One invocation runs one job to completion: load the contact ledger,
//! resolve the message, drive the rate-limited sender loop, write the run
//! report, raise the completion signal, exit. The orchestrator process
//! (`overseer`) launches this binary and observes only the handoff marker
//! and the report artifact; there is no direct return channel.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use courier::config::{DEFAULT_SETTINGS_FILE, JobOverrides, load_settings, write_settings};
use courier::handoff::{CancelSignal, CompletionSignal};
use courier::ledger::Ledger;
use courier::sendloop::{ThreadSleeper, run_dispatch};
use courier::transport::CommandTransport;
use courier::{message, report};

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Resumable bulk outbound-messaging worker"
)]
struct Cli {
    /// Settings file with persisted job defaults.
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one delivery job to completion and signal the orchestrator.
    Run {
        /// Contacts source (default: settings `contacts_file`).
        #[arg(long)]
        contacts: Option<PathBuf>,
        /// Message source (default: settings `message_file`).
        #[arg(long)]
        message: Option<PathBuf>,
        /// Per-run cap on successful sends (default: settings `per_run_cap`).
        #[arg(long)]
        limit: Option<u32>,
        /// Seconds between consecutive sends (default: settings `delay_secs`).
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Resolve the configured message and print the delivery HTML.
    Preview {
        /// Message source (default: settings `message_file`).
        #[arg(long)]
        message: Option<PathBuf>,
    },
    /// Read or update persisted settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective settings as TOML.
    Show,
    /// Update one settings field and write the file back.
    Set { key: String, value: String },
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
        Command::Run {
            contacts,
            message,
            limit,
            delay,
        } => cmd_run(
            &cli.config,
            &JobOverrides {
                contacts,
                message,
                cap: limit,
                delay_secs: delay,
            },
        ),
        Command::Preview { message } => cmd_preview(&cli.config, message),
        Command::Config { command } => match command {
            ConfigCommand::Show => cmd_config_show(&cli.config),
            ConfigCommand::Set { key, value } => cmd_config_set(&cli.config, &key, &value),
        },
    }
}

fn cmd_run(config_path: &Path, overrides: &JobOverrides) -> Result<()> {
    let settings = load_settings(config_path)?;
    let job = settings.job_spec(overrides)?;
    let workdir = job.workdir();

    // A fresh run must not observe leftovers from an earlier one.
    let completion = CompletionSignal::in_dir(&workdir);
    let cancel = CancelSignal::in_dir(&workdir);
    completion.clear().context("clear stale completion marker")?;
    cancel.clear().context("clear stale cancel marker")?;

    let payload = message::resolve(&job.message)?;
    let mut ledger = Ledger::load(&job.contacts)?;
    let mut transport = CommandTransport::new(
        settings.transport_command.clone(),
        settings.session_name.clone(),
        job.send_timeout,
    )?;
    let mut sleeper = ThreadSleeper;

    let outcome = run_dispatch(
        &mut ledger,
        &payload,
        &job,
        &mut transport,
        &mut sleeper,
        &cancel,
    )?;

    // Write-then-signal: the report must be durably on disk before the
    // orchestrator can learn the run ended.
    let report_path = report::write_report(&ledger, &job.contacts)?;
    completion.raise()?;

    println!(
        "run: stop={} delivered={} skipped={} pending={} report={}",
        outcome.stop.as_str(),
        outcome.delivered,
        outcome.skipped,
        ledger.pending_count(),
        report_path.display()
    );
    Ok(())
}

fn cmd_preview(config_path: &Path, message_override: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config_path)?;
    let path = message_override.unwrap_or(settings.message_file);
    let payload = message::resolve(&path)?;
    println!("{}", payload.html);
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let settings = load_settings(config_path)?;
    print!(
        "{}",
        toml::to_string_pretty(&settings).context("serialize settings")?
    );
    Ok(())
}

fn cmd_config_set(config_path: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = load_settings(config_path)?;
    settings.set(key, value)?;
    write_settings(config_path, &settings)?;
    println!("config: {key} updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "courier", "run", "--contacts", "list.csv", "--limit", "5", "--delay", "10",
        ]);
        match cli.command {
            Command::Run {
                contacts,
                message,
                limit,
                delay,
            } => {
                assert_eq!(contacts, Some(PathBuf::from("list.csv")));
                assert_eq!(message, None);
                assert_eq!(limit, Some(5));
                assert_eq!(delay, Some(10));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_config_set() {
        let cli = Cli::parse_from(["courier", "config", "set", "delay_secs", "30"]);
        match cli.command {
            Command::Config {
                command: ConfigCommand::Set { key, value },
            } => {
                assert_eq!(key, "delay_secs");
                assert_eq!(value, "30");
            }
            _ => panic!("expected config set command"),
        }
    }

    #[test]
    fn parse_default_config_path() {
        let cli = Cli::parse_from(["courier", "preview"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_SETTINGS_FILE));
    }
}
