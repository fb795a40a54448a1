//! Test-only scripted collaborators and fixture builders.

use std::cell::Cell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::config::JobSpec;
use crate::message::DeliveryPayload;
use crate::sendloop::{CancelToken, Sleeper};
use crate::transport::{SendOutcome, SendRequest, Transport};

/// Transport returning a predetermined outcome per call, recording the
/// recipients it was asked to reach. Errors when the script runs dry, so a
/// test fails loudly if the loop attempts more sends than scripted.
pub struct ScriptedTransport {
    script: VecDeque<SendOutcome>,
    pub recipients: Vec<String>,
}

impl ScriptedTransport {
    pub fn new(outcomes: impl IntoIterator<Item = SendOutcome>) -> Self {
        Self {
            script: outcomes.into_iter().collect(),
            recipients: Vec::new(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, request: &SendRequest<'_>) -> Result<SendOutcome> {
        self.recipients.push(request.recipient.to_string());
        self.script.pop_front().ok_or_else(|| {
            anyhow!(
                "transport script exhausted (unexpected send to {})",
                request.recipient
            )
        })
    }
}

/// Sleeper that records requested waits instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pub naps: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.naps.push(duration);
    }
}

/// Cancel token that trips after a fixed number of checks.
pub struct ScriptedCancel {
    trip_after: usize,
    checks: Cell<usize>,
}

impl ScriptedCancel {
    /// Report not-cancelled for the first `checks` polls, cancelled after.
    pub fn after(checks: usize) -> Self {
        Self {
            trip_after: checks,
            checks: Cell::new(0),
        }
    }
}

impl CancelToken for ScriptedCancel {
    fn is_cancelled(&self) -> bool {
        let seen = self.checks.get();
        self.checks.set(seen + 1);
        seen >= self.trip_after
    }
}

/// A payload whose source and delivery forms are the same string.
pub fn payload(html: &str) -> DeliveryPayload {
    DeliveryPayload {
        text: html.to_string(),
        html: html.to_string(),
    }
}

/// A job with the given cap and rate-limit delay and quiet defaults
/// everywhere else.
pub fn job(cap: u32, delay_secs: u64) -> JobSpec {
    JobSpec {
        contacts: PathBuf::from("contacts.csv"),
        message: PathBuf::from("message.md"),
        cap,
        delay: Duration::from_secs(delay_secs),
        backoff_budget: Duration::from_secs(3600),
        send_timeout: Duration::from_secs(120),
        attachment: None,
    }
}

/// Write a contacts file with the canonical header and the given
/// (identity, status) rows.
pub fn write_contacts(path: &Path, rows: &[(&str, &str)]) -> Result<()> {
    let mut contents = String::from("tg_username,sent\n");
    for (identity, status) in rows {
        contents.push_str(identity);
        contents.push(',');
        contents.push_str(status);
        contents.push('\n');
    }
    std::fs::write(path, contents)
        .map_err(|err| anyhow!("write contacts {}: {err}", path.display()))
}
