//! Operator-facing run summaries.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use courier::report;

/// Render the summary line for a run report.
///
/// A missing or unreadable report is a degraded condition, not a failure:
/// the run ended (the signal fired), there is just nothing verifiable to
/// show, and the operator is told exactly that.
pub fn render(report_path: &Path, finished_at: DateTime<Utc>) -> String {
    let stamp = finished_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    match report::summarize(report_path) {
        Ok(summary) => format!(
            "summary: finished={} sent={} pending={} total={} report={}",
            stamp,
            summary.sent,
            summary.pending,
            summary.total,
            report_path.display()
        ),
        Err(err) => {
            warn!(
                report = %report_path.display(),
                error = %err,
                "run signalled completion but the report is not readable"
            );
            format!(
                "summary: finished={} but no verifiable report at {}",
                stamp,
                report_path.display()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier::test_support::write_contacts;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn render_counts_sent_and_pending() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report_path = temp.path().join("report-contacts.csv");
        write_contacts(
            &report_path,
            &[("alice", "yes"), ("bob", "yes"), ("carol", "no")],
        )
        .expect("report");

        let line = render(&report_path, stamp());
        assert!(line.contains("sent=2"), "line: {line}");
        assert!(line.contains("pending=1"));
        assert!(line.contains("total=3"));
        assert!(line.contains("2025-06-01T12:00:00Z"));
    }

    #[test]
    fn render_degrades_when_the_report_is_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report_path = temp.path().join("report-contacts.csv");

        let line = render(&report_path, stamp());
        assert!(line.contains("no verifiable report"), "line: {line}");
    }
}
