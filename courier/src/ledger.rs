//! Contact ledger: the recipient list for one job and its delivery status.
//!
//! Identities are normalized at load time so deduplication and resume both
//! key off the same canonical form. The normalization pipeline is part of
//! the file contract, not an implementation detail: strip whitespace, strip
//! a leading `https://t.me/` or `t.me/` prefix, strip a leading `@`,
//! lower-case.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::FormatError;

/// Column headers accepted (case-insensitively) as the identity column.
pub const IDENTITY_ALIASES: &[&str] = &["tg", "tg_id", "username", "tg_username", "telegram"];

/// Canonical identity column name used when writing.
pub const IDENTITY_COLUMN: &str = "tg_username";

/// Status column name, in inputs and reports.
pub const STATUS_COLUMN: &str = "sent";

/// Delivery state of one recipient. Moves `Pending -> Sent` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Sent,
}

impl DeliveryStatus {
    /// Wire form used in the status column.
    fn as_cell(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "no",
            DeliveryStatus::Sent => "yes",
        }
    }

    /// Parse a status cell. Only an affirmative marks a record sent; a
    /// blank or unrecognized cell is pending.
    fn from_cell(cell: &str) -> Self {
        if cell.trim().eq_ignore_ascii_case("yes") {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Pending
        }
    }
}

/// One recipient and its delivery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    /// Normalized handle, unique within the ledger.
    pub identity: String,
    pub status: DeliveryStatus,
}

/// The recipient set for one job, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<ContactRecord>,
    index: HashMap<String, usize>,
}

/// Canonical form of a raw handle cell.
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("https://t.me/")
        .or_else(|| trimmed.strip_prefix("t.me/"))
        .unwrap_or(trimmed);
    let stripped = stripped.strip_prefix('@').unwrap_or(stripped);
    stripped.to_lowercase()
}

impl Ledger {
    /// Load a ledger from a tabular contacts file.
    ///
    /// Fails with [`FormatError`] when no header matches an identity alias.
    /// A missing status column, or a blank status cell, defaults to pending.
    /// Duplicate identities (after normalization) collapse keep-first.
    pub fn load(path: &Path) -> Result<Ledger> {
        let file =
            fs::File::open(path).with_context(|| format!("open contacts {}", path.display()))?;
        let mut reader = csv::Reader::from_reader(file);
        let headers = reader
            .headers()
            .with_context(|| format!("read header of {}", path.display()))?
            .clone();

        let identity_col = headers
            .iter()
            .position(|header| {
                let header = header.trim();
                IDENTITY_ALIASES
                    .iter()
                    .any(|alias| header.eq_ignore_ascii_case(alias))
            })
            .ok_or_else(|| {
                FormatError::new(
                    path,
                    format!(
                        "no identity column (accepted headers: {})",
                        IDENTITY_ALIASES.join(", ")
                    ),
                )
            })?;
        let status_col = headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(STATUS_COLUMN));

        let mut ledger = Ledger::default();
        for (row, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("read row {} of {}", row + 2, path.display()))?;
            let raw = record.get(identity_col).unwrap_or("");
            let status = status_col
                .and_then(|col| record.get(col))
                .map(DeliveryStatus::from_cell)
                .unwrap_or(DeliveryStatus::Pending);
            ledger.insert(raw, status);
        }

        debug!(
            path = %path.display(),
            total = ledger.records.len(),
            pending = ledger.pending_count(),
            "ledger loaded"
        );
        Ok(ledger)
    }

    /// Build a ledger from a newline-separated handle list (one handle per
    /// line, blank lines ignored). All records start pending.
    pub fn from_lines(text: &str) -> Ledger {
        let mut ledger = Ledger::default();
        for line in text.lines() {
            ledger.insert(line, DeliveryStatus::Pending);
        }
        ledger
    }

    /// Insert a raw handle, normalizing and collapsing duplicates keep-first.
    /// Empty identities (after normalization) are dropped.
    fn insert(&mut self, raw: &str, status: DeliveryStatus) {
        let identity = normalize_identity(raw);
        if identity.is_empty() || self.index.contains_key(&identity) {
            return;
        }
        self.index.insert(identity.clone(), self.records.len());
        self.records.push(ContactRecord { identity, status });
    }

    /// All records, in input order.
    pub fn records(&self) -> &[ContactRecord] {
        &self.records
    }

    /// Not-yet-sent records, in input order.
    pub fn pending(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records
            .iter()
            .filter(|record| record.status == DeliveryStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn sent_count(&self) -> usize {
        self.records.len() - self.pending_count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mark an identity as sent. Idempotent; unknown identities are a no-op.
    /// Returns whether the record actually transitioned.
    pub fn mark_sent(&mut self, identity: &str) -> bool {
        let identity = normalize_identity(identity);
        let Some(&slot) = self.index.get(&identity) else {
            return false;
        };
        let record = &mut self.records[slot];
        if record.status == DeliveryStatus::Sent {
            return false;
        }
        record.status = DeliveryStatus::Sent;
        true
    }

    /// Write the ledger in the contacts schema (`tg_username`, `sent`).
    ///
    /// The write is durable before this returns: contents go to a temp file
    /// which is fsynced and renamed into place.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([IDENTITY_COLUMN, STATUS_COLUMN])
            .context("write ledger header")?;
        for record in &self.records {
            writer
                .write_record([record.identity.as_str(), record.status.as_cell()])
                .with_context(|| format!("write ledger row {}", record.identity))?;
        }
        let buf = writer.into_inner().context("flush ledger rows")?;
        write_durable(path, &buf)
    }
}

/// Write bytes to `path` via temp file + fsync + rename, so a concurrent
/// reader never observes a partial file and the contents are on disk when
/// this returns.
fn write_durable(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("csv.tmp");
    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("create temp file {}", tmp_path.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    tmp.sync_all()
        .with_context(|| format!("sync temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
