//! CLI command implementations.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use courier::config::{JobOverrides, JobSpec, Settings, load_settings};
use courier::handoff::{CancelSignal, CompletionSignal, await_completion};
use courier::report;
use courier::sendloop::ThreadSleeper;

use crate::spawn;
use crate::summary;

fn load_job(config_path: &Path) -> Result<(Settings, JobSpec)> {
    let settings = load_settings(config_path)?;
    let job = settings.job_spec(&JobOverrides::default())?;
    Ok((settings, job))
}

/// Spawn a worker run, then wait for its completion signal.
pub fn launch(config_path: &Path, timeout_secs: Option<u64>) -> Result<()> {
    let (settings, job) = load_job(config_path)?;
    let workdir = job.workdir();

    // Drop any leftover marker before the worker exists, so the wait below
    // can only be satisfied by this run.
    CompletionSignal::in_dir(&workdir)
        .clear()
        .context("clear stale completion marker")?;

    let worker_log = workdir.join("courier.log");
    let binary = spawn::worker_binary();
    let pid = spawn::spawn_worker(&binary, config_path, &worker_log)?;
    info!(pid, log = %worker_log.display(), "worker launched");
    println!("launch: worker pid={} log={}", pid, worker_log.display());

    wait_and_report(&settings, &job, timeout_secs)
}

/// Wait for the completion signal of an already-running worker.
pub fn await_worker(config_path: &Path, timeout_secs: Option<u64>) -> Result<()> {
    let (settings, job) = load_job(config_path)?;
    wait_and_report(&settings, &job, timeout_secs)
}

/// Raise the cancel marker for the running worker.
pub fn cancel(config_path: &Path) -> Result<()> {
    let (_, job) = load_job(config_path)?;
    CancelSignal::in_dir(&job.workdir()).raise()?;
    println!("cancel: requested, the worker stops before its next recipient");
    Ok(())
}

/// Print the summary of the report derived from the configured contacts.
pub fn summary(config_path: &Path) -> Result<()> {
    let (_, job) = load_job(config_path)?;
    let report_path = report::report_path(&job.contacts);
    println!("{}", summary::render(&report_path, Utc::now()));
    Ok(())
}

fn wait_and_report(settings: &Settings, job: &JobSpec, timeout_secs: Option<u64>) -> Result<()> {
    let completion = CompletionSignal::in_dir(&job.workdir());
    let mut sleeper = ThreadSleeper;
    let found = await_completion(
        &completion,
        Duration::from_secs(settings.poll_interval_secs),
        timeout_secs.map(Duration::from_secs),
        &mut sleeper,
    )?;

    if !found {
        warn!("no completion signal observed within the timeout");
        println!("await: no completion signal, the worker may still be running");
        return Ok(());
    }

    let report_path = report::report_path(&job.contacts);
    println!("{}", summary::render(&report_path, Utc::now()));
    Ok(())
}
