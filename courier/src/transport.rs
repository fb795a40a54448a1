//! Transport seam for placing a message to one recipient.
//!
//! The [`Transport`] trait decouples the sender loop from the actual
//! delivery backend. Production uses [`CommandTransport`], which shells out
//! to a configured external command per recipient; tests use scripted
//! transports that return predetermined outcomes without spawning anything.

use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Bytes of child stdout/stderr kept for diagnostics.
const OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Session identity handed to the transport command.
pub const SESSION_ENV: &str = "COURIER_SESSION";

/// How one delivery attempt was classified by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message reached the recipient.
    Delivered,
    /// The recipient blocks or restricts reception; skipped for this run.
    RecipientUnavailable,
    /// The provider flagged the sending account itself; the run must abort.
    AbuseLimited,
    /// The provider asked for a wait before retrying the same recipient.
    Backoff(Duration),
}

/// Kind of the single optional attachment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Document,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Document => "document",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "photo" => Ok(AttachmentKind::Photo),
            "document" => Ok(AttachmentKind::Document),
            other => Err(anyhow!("unknown attachment kind {other:?} (photo|document)")),
        }
    }
}

/// The single optional attachment sent with every message of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub kind: AttachmentKind,
}

/// One delivery attempt.
#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'a> {
    /// Normalized recipient identity.
    pub recipient: &'a str,
    /// Channel-ready HTML payload.
    pub html: &'a str,
    pub attachment: Option<&'a Attachment>,
}

/// Abstraction over delivery backends.
pub trait Transport {
    /// Attempt delivery to one recipient and classify the outcome.
    ///
    /// An `Err` is a transport infrastructure failure (not a provider
    /// classification) and fails the whole run.
    fn send(&mut self, request: &SendRequest<'_>) -> Result<SendOutcome>;
}

/// Verdict line the transport command prints on stdout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
enum WireVerdict {
    Delivered,
    RecipientUnavailable,
    AbuseLimited,
    Backoff { wait_secs: u64 },
}

impl From<WireVerdict> for SendOutcome {
    fn from(verdict: WireVerdict) -> Self {
        match verdict {
            WireVerdict::Delivered => SendOutcome::Delivered,
            WireVerdict::RecipientUnavailable => SendOutcome::RecipientUnavailable,
            WireVerdict::AbuseLimited => SendOutcome::AbuseLimited,
            WireVerdict::Backoff { wait_secs } => {
                SendOutcome::Backoff(Duration::from_secs(wait_secs))
            }
        }
    }
}

/// Transport that invokes a configured external command once per recipient.
///
/// Contract: the command receives `--recipient <identity>` (plus
/// `--attachment <path> --attachment-kind <kind>` when configured), the
/// HTML payload on stdin, and the session name in [`SESSION_ENV`]. It must
/// exit 0 and print a JSON verdict as the last non-empty stdout line, e.g.
/// `{"status":"delivered"}` or `{"status":"backoff","wait_secs":30}`.
pub struct CommandTransport {
    command: Vec<String>,
    session_name: String,
    timeout: Duration,
}

impl CommandTransport {
    pub fn new(
        command: Vec<String>,
        session_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            bail!("transport command must be a non-empty array");
        }
        Ok(Self {
            command,
            session_name: session_name.into(),
            timeout,
        })
    }
}

impl Transport for CommandTransport {
    fn send(&mut self, request: &SendRequest<'_>) -> Result<SendOutcome> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg("--recipient")
            .arg(request.recipient)
            .env(SESSION_ENV, &self.session_name);
        if let Some(attachment) = request.attachment {
            cmd.arg("--attachment")
                .arg(&attachment.path)
                .arg("--attachment-kind")
                .arg(attachment.kind.as_str());
        }

        debug!(recipient = request.recipient, "invoking transport command");
        let output = run_with_timeout(cmd, request.html.as_bytes(), self.timeout)
            .with_context(|| format!("run transport command {:?}", self.command[0]))?;

        if output.timed_out {
            warn!(recipient = request.recipient, "transport command timed out");
            bail!("transport command timed out after {:?}", self.timeout);
        }
        if !output.status.success() {
            warn!(
                recipient = request.recipient,
                exit_code = ?output.status.code(),
                "transport command failed"
            );
            bail!(
                "transport command exited with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_verdict(&output.stdout)
    }
}

/// Classify the last non-empty stdout line as a [`SendOutcome`].
fn parse_verdict(stdout: &[u8]) -> Result<SendOutcome> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("transport command printed no verdict"))?;
    let verdict: WireVerdict = serde_json::from_str(line)
        .with_context(|| format!("parse transport verdict {line:?}"))?;
    Ok(verdict.into())
}

struct CapturedOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    timed_out: bool,
}

/// Run a command with a timeout, feeding stdin and capturing bounded output.
fn run_with_timeout(mut cmd: Command, stdin: &[u8], timeout: Duration) -> Result<CapturedOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;

    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    child_stdin.write_all(stdin).context("write stdin")?;
    drop(child_stdin);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_limited(stdout));
    let stderr_handle = thread::spawn(move || read_limited(stderr));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_reader(stdout_handle).context("join stdout")?;
    let stderr = join_reader(stderr_handle).context("join stderr")?;

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn read_limited<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = OUTPUT_LIMIT_BYTES.saturating_sub(buf.len());
        if remaining > 0 {
            buf.extend_from_slice(&chunk[..n.min(remaining)]);
        }
    }
    Ok(buf)
}

fn join_reader(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}
