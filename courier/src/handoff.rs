//! File-flag rendezvous between the orchestrator and the worker.
//!
//! The two processes share nothing but a filesystem directory. The worker's
//! final action is creating a zero-content completion marker; the
//! orchestrator polls for it on a bounded interval, deletes it on
//! observation (so a stale marker can never signal a later run), and only
//! then reads the report. A cancel marker travels the other way and is
//! checked by the sender loop between recipients.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::sendloop::{CancelToken, Sleeper};

/// Marker the worker creates when a run has ended and the report is on disk.
pub const COMPLETION_MARKER: &str = "run-complete.flag";

/// Marker the orchestrator creates to ask a running worker to stop.
pub const CANCEL_MARKER: &str = "cancel-run.flag";

fn raise_marker(path: &Path) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("create marker {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync marker {}", path.display()))?;
    Ok(())
}

fn remove_marker(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("remove marker {}", path.display())),
    }
}

/// One-shot completion signal, worker → orchestrator.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    path: PathBuf,
}

impl CompletionSignal {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(COMPLETION_MARKER),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the marker. Call only after the report write is durable.
    pub fn raise(&self) -> Result<()> {
        raise_marker(&self.path)?;
        info!(marker = %self.path.display(), "completion signal raised");
        Ok(())
    }

    pub fn is_raised(&self) -> bool {
        self.path.exists()
    }

    /// Observe and delete the marker. Returns whether it was present.
    pub fn consume(&self) -> Result<bool> {
        let consumed = remove_marker(&self.path)?;
        if consumed {
            debug!(marker = %self.path.display(), "completion signal consumed");
        }
        Ok(consumed)
    }

    /// Drop any stale marker from an earlier run.
    pub fn clear(&self) -> Result<()> {
        remove_marker(&self.path)?;
        Ok(())
    }
}

/// One-shot cancel signal, orchestrator → worker.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    path: PathBuf,
}

impl CancelSignal {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(CANCEL_MARKER),
        }
    }

    pub fn raise(&self) -> Result<()> {
        raise_marker(&self.path)?;
        info!(marker = %self.path.display(), "cancel signal raised");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        remove_marker(&self.path)?;
        Ok(())
    }
}

impl CancelToken for CancelSignal {
    fn is_cancelled(&self) -> bool {
        self.path.exists()
    }
}

/// Poll for the completion signal, consuming it when observed.
///
/// Sleeps `interval` between checks (a zero interval would busy-poll and is
/// rejected). With a timeout, returns `Ok(false)` once the accumulated wait
/// reaches it; without one, polls until the signal appears.
pub fn await_completion<S: Sleeper>(
    signal: &CompletionSignal,
    interval: Duration,
    timeout: Option<Duration>,
    sleeper: &mut S,
) -> Result<bool> {
    if interval.is_zero() {
        bail!("poll interval must be > 0");
    }
    let mut waited = Duration::ZERO;
    loop {
        if signal.consume()? {
            return Ok(true);
        }
        if let Some(limit) = timeout
            && waited >= limit
        {
            return Ok(false);
        }
        sleeper.sleep(interval);
        waited += interval;
    }
}
