//! Full-job lifecycle tests: load → dispatch → report → handoff → resume.
//!
//! These drive the library the way the worker binary does, with scripted
//! transports standing in for the provider, to verify the cross-run
//! guarantees: at-most-once delivery across restarts, write-then-signal
//! ordering, and the ledger/report round trip.

use std::fs;

use courier::handoff::CompletionSignal;
use courier::ledger::Ledger;
use courier::report;
use courier::sendloop::{NeverCancel, RunStop, run_dispatch};
use courier::test_support::{RecordingSleeper, ScriptedTransport, job, payload, write_contacts};
use courier::transport::SendOutcome::{AbuseLimited, Delivered};

#[test]
fn capped_run_then_resume_completes_the_list() {
    let temp = tempfile::tempdir().expect("tempdir");
    let contacts = temp.path().join("contacts.csv");
    write_contacts(
        &contacts,
        &[("alice", "no"), ("bob", "no"), ("carol", "no"), ("dan", "no")],
    )
    .expect("contacts");

    let mut job = job(2, 0);
    job.contacts = contacts.clone();

    // First invocation: cap stops the run after two sends.
    let mut ledger = Ledger::load(&contacts).expect("load");
    let mut transport = ScriptedTransport::new([Delivered, Delivered]);
    let mut sleeper = RecordingSleeper::default();
    let outcome = run_dispatch(
        &mut ledger,
        &payload("hi"),
        &job,
        &mut transport,
        &mut sleeper,
        &NeverCancel,
    )
    .expect("first run");
    assert_eq!(outcome.stop, RunStop::CapReached);

    let report_path = report::write_report(&ledger, &contacts).expect("report");
    let completion = CompletionSignal::in_dir(temp.path());
    completion.raise().expect("signal");

    // Orchestrator side: consume the signal, then read the report.
    assert!(completion.consume().expect("consume"));
    let summary = report::summarize(&report_path).expect("summarize");
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.pending, 2);

    // Second invocation resumes from the report: already-sent recipients
    // are never re-attempted.
    let mut resumed = Ledger::load(&report_path).expect("resume");
    let mut transport = ScriptedTransport::new([Delivered, Delivered]);
    let mut sleeper = RecordingSleeper::default();
    let outcome = run_dispatch(
        &mut resumed,
        &payload("hi"),
        &job,
        &mut transport,
        &mut sleeper,
        &NeverCancel,
    )
    .expect("second run");

    assert_eq!(outcome.stop, RunStop::Exhausted);
    assert_eq!(transport.recipients, vec!["carol", "dan"]);
    assert_eq!(resumed.pending_count(), 0);
}

#[test]
fn duplicate_handles_collapse_before_dispatch() {
    // Contacts `@Alice`, `alice`, `bob` with a generous cap: the report
    // holds exactly two records, both sent, and the run exhausts.
    let temp = tempfile::tempdir().expect("tempdir");
    let contacts = temp.path().join("contacts.csv");
    fs::write(&contacts, "tg_username\n@Alice\nalice\nbob\n").expect("contacts");

    let mut job = job(10, 0);
    job.contacts = contacts.clone();

    let mut ledger = Ledger::load(&contacts).expect("load");
    let mut transport = ScriptedTransport::new([Delivered, Delivered]);
    let mut sleeper = RecordingSleeper::default();
    let outcome = run_dispatch(
        &mut ledger,
        &payload("hi"),
        &job,
        &mut transport,
        &mut sleeper,
        &NeverCancel,
    )
    .expect("run");

    assert_eq!(outcome.stop, RunStop::Exhausted);
    assert_eq!(transport.recipients, vec!["alice", "bob"]);

    let report_path = report::write_report(&ledger, &contacts).expect("report");
    let reported = Ledger::load(&report_path).expect("reload");
    assert_eq!(reported.records().len(), 2);
    assert_eq!(reported.sent_count(), 2);
}

#[test]
fn aborted_run_still_reports_prior_progress() {
    let temp = tempfile::tempdir().expect("tempdir");
    let contacts = temp.path().join("contacts.csv");
    write_contacts(&contacts, &[("alice", "no"), ("bob", "no"), ("carol", "no")])
        .expect("contacts");

    let mut job = job(10, 0);
    job.contacts = contacts.clone();

    let mut ledger = Ledger::load(&contacts).expect("load");
    let mut transport = ScriptedTransport::new([Delivered, AbuseLimited]);
    let mut sleeper = RecordingSleeper::default();
    let outcome = run_dispatch(
        &mut ledger,
        &payload("hi"),
        &job,
        &mut transport,
        &mut sleeper,
        &NeverCancel,
    )
    .expect("run");
    assert_eq!(outcome.stop, RunStop::Aborted);

    let report_path = report::write_report(&ledger, &contacts).expect("report");
    let summary = report::summarize(&report_path).expect("summarize");
    assert_eq!(summary.sent, 1, "alice stays recorded as sent");
    assert_eq!(summary.pending, 2, "the triggering and later records stay pending");
}

#[test]
fn report_write_failure_leaves_no_signal() {
    // The report's parent "directory" is a regular file, so the write
    // fails; a caller honoring write-then-signal must then never raise.
    let temp = tempfile::tempdir().expect("tempdir");
    let blocker = temp.path().join("blocker");
    fs::write(&blocker, "occupied").expect("blocker");
    let contacts = blocker.join("contacts.csv");

    let ledger = Ledger::from_lines("alice");
    let completion = CompletionSignal::in_dir(temp.path());

    let result = report::write_report(&ledger, &contacts);
    assert!(result.is_err());
    assert!(
        !completion.is_raised(),
        "no completion signal without a report"
    );
}

#[test]
fn markdown_example_resolves_to_channel_markup() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("message.md");
    fs::write(&path, "# Hi\n- one\n- two").expect("message");

    let payload = courier::message::resolve(&path).expect("resolve");
    assert!(payload.html.contains("<b>Hi</b>"));
    assert!(payload.html.contains("\u{2022} one<br>"));
    assert!(payload.html.contains("\u{2022} two<br>"));
}
