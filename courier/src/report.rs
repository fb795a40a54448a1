//! Run report writer and summary reader.
//!
//! The report is a new artifact derived from the contacts source name, so
//! the input list is never mutated in place: reruns stay idempotent against
//! the original and every run leaves an audit trail. Writing the report is
//! the last worker action before the completion signal is raised.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::ledger::Ledger;

/// Fixed prefix of report file names.
pub const REPORT_PREFIX: &str = "report-";

/// Derive the report path for a contacts source: same directory, the
/// source's file name with [`REPORT_PREFIX`] prepended.
pub fn report_path(contacts: &Path) -> PathBuf {
    let name = contacts
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = match contacts.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    dir.join(format!("{REPORT_PREFIX}{name}"))
}

/// Snapshot the ledger to the derived report path.
///
/// Durability is part of the contract: when this returns, the report is on
/// disk, so the caller may raise the completion signal. On error no signal
/// must be raised.
pub fn write_report(ledger: &Ledger, contacts: &Path) -> Result<PathBuf> {
    let path = report_path(contacts);
    ledger
        .write(&path)
        .with_context(|| format!("write run report {}", path.display()))?;
    info!(
        report = %path.display(),
        sent = ledger.sent_count(),
        pending = ledger.pending_count(),
        "run report written"
    );
    Ok(path)
}

/// Counts presented to the operator after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub sent: usize,
    pub pending: usize,
}

/// Read a report back and count outcomes.
pub fn summarize(path: &Path) -> Result<ReportSummary> {
    let ledger =
        Ledger::load(path).with_context(|| format!("read run report {}", path.display()))?;
    Ok(ReportSummary {
        total: ledger.records().len(),
        sent: ledger.sent_count(),
        pending: ledger.pending_count(),
    })
}
