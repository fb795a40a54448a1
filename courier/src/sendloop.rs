//! The rate-limited sender loop.
//!
//! One run processes the ledger's pending records in order and ends in
//! exactly one terminal state. Sends, sleeps, and cancellation checks all
//! go through injected traits so the loop body is the only place delivery
//! policy lives and tests can script every collaborator.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::JobSpec;
use crate::ledger::Ledger;
use crate::message::DeliveryPayload;
use crate::transport::{SendOutcome, SendRequest, Transport};

/// Why a run stopped. Every variant is a normal run end that produces a
/// report; the distinction is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// The per-run cap on successful sends was reached.
    CapReached,
    /// Every pending record was processed.
    Exhausted,
    /// The provider signalled an account-level abuse limit.
    Aborted,
    /// The orchestrator raised the cancel signal.
    Cancelled,
}

impl RunStop {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStop::CapReached => "cap_reached",
            RunStop::Exhausted => "exhausted",
            RunStop::Aborted => "aborted",
            RunStop::Cancelled => "cancelled",
        }
    }
}

/// Summary of one sender-loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub stop: RunStop,
    /// Records transitioned to sent this run.
    pub delivered: u32,
    /// Recipients skipped this run (unavailable or backoff budget spent);
    /// they stay pending in the ledger.
    pub skipped: u32,
}

/// Abstraction over blocking waits, so tests never actually sleep.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Production sleeper: blocks the worker thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Cancellation source checked between recipients.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Token for callers with no cancellation path.
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Drive delivery attempts for every pending record of `ledger`.
///
/// Per record: check cancellation, check the per-run cap, attempt delivery,
/// classify. A backoff response sleeps the requested wait and retries the
/// same record until it resolves or the per-recipient backoff budget is
/// spent (then the record is skipped, left pending). A rate-limit sleep
/// separates consecutive records unless the loop is stopping.
///
/// Transport infrastructure errors (not provider classifications) propagate
/// and leave the run without a report or completion signal.
pub fn run_dispatch<T: Transport, S: Sleeper, C: CancelToken>(
    ledger: &mut Ledger,
    payload: &DeliveryPayload,
    job: &JobSpec,
    transport: &mut T,
    sleeper: &mut S,
    cancel: &C,
) -> Result<DispatchOutcome> {
    let queue: Vec<String> = ledger
        .pending()
        .map(|record| record.identity.clone())
        .collect();
    info!(pending = queue.len(), cap = job.cap, "run starting");

    let mut delivered = 0u32;
    let mut skipped = 0u32;
    let mut stop = None;

    'queue: for (slot, identity) in queue.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("cancel signal observed, stopping between recipients");
            stop = Some(RunStop::Cancelled);
            break;
        }
        if delivered >= job.cap {
            info!(cap = job.cap, "per-run cap reached");
            stop = Some(RunStop::CapReached);
            break;
        }

        let mut waited = Duration::ZERO;
        loop {
            let request = SendRequest {
                recipient: identity,
                html: &payload.html,
                attachment: job.attachment.as_ref(),
            };
            match transport.send(&request)? {
                SendOutcome::Delivered => {
                    ledger.mark_sent(identity);
                    delivered += 1;
                    info!(recipient = %identity, delivered, "delivered");
                    break;
                }
                SendOutcome::RecipientUnavailable => {
                    skipped += 1;
                    warn!(recipient = %identity, "recipient unavailable, skipped for this run");
                    break;
                }
                SendOutcome::AbuseLimited => {
                    error!(recipient = %identity, "account abuse limit signalled, aborting run");
                    stop = Some(RunStop::Aborted);
                    break 'queue;
                }
                SendOutcome::Backoff(wait) => {
                    waited += wait;
                    if waited > job.backoff_budget {
                        skipped += 1;
                        warn!(
                            recipient = %identity,
                            waited_secs = waited.as_secs(),
                            budget_secs = job.backoff_budget.as_secs(),
                            "backoff budget spent, skipping recipient"
                        );
                        break;
                    }
                    warn!(
                        recipient = %identity,
                        wait_secs = wait.as_secs(),
                        "provider requested backoff, retrying same recipient after wait"
                    );
                    sleeper.sleep(wait);
                }
            }
        }

        // Rate-limit spacing before the next record, skipped when the cap
        // or the end of the queue stops the loop anyway.
        if slot + 1 < queue.len() && delivered < job.cap {
            sleeper.sleep(job.delay);
        }
    }

    let stop = stop.unwrap_or(RunStop::Exhausted);
    info!(
        stop = stop.as_str(),
        delivered,
        skipped,
        pending = ledger.pending_count(),
        "run finished"
    );
    Ok(DispatchOutcome {
        stop,
        delivered,
        skipped,
    })
}
