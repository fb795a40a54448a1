//! Persisted job defaults (`courier.toml`) and the immutable per-run job.
//!
//! Two layers: [`Settings`] is the durable key/value store of defaults
//! both processes read, updatable field by field; [`JobSpec`] is the
//! read-only value one worker invocation runs with, built once from
//! settings plus CLI overrides and never written back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::transport::{Attachment, AttachmentKind};

/// Default settings file name, resolved against the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "courier.toml";

/// Durable job defaults (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to the documented values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Session identity handed to the transport command. Default `anon`.
    pub session_name: String,

    /// Contacts source path. Default `contacts.csv`.
    pub contacts_file: PathBuf,

    /// Message source path. Default `message.md`.
    pub message_file: PathBuf,

    /// Maximum successful sends in one worker invocation. Default `50`.
    pub per_run_cap: u32,

    /// Minimum spacing between consecutive send attempts, in seconds.
    /// Default `60`.
    pub delay_secs: u64,

    /// Cumulative provider-requested wait tolerated per recipient before
    /// that recipient is skipped for the run, in seconds. Default `3600`.
    pub backoff_budget_secs: u64,

    /// Transport command timeout per attempt, in seconds. Default `120`.
    pub send_timeout_secs: u64,

    /// Orchestrator poll interval for the completion marker, in seconds.
    /// Default `5`.
    pub poll_interval_secs: u64,

    /// Optional attachment path. Unset by default.
    pub media_path: Option<PathBuf>,

    /// Attachment kind (`photo` or `document`). Must be set when
    /// `media_path` is set. Unset by default.
    pub media_kind: Option<AttachmentKind>,

    /// Where the front-end stores files received from the operator.
    /// Default `downloads`.
    pub downloads_dir: PathBuf,

    /// Delivery command invoked once per recipient.
    /// Default `["telegram-send"]`.
    pub transport_command: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_name: "anon".to_string(),
            contacts_file: PathBuf::from("contacts.csv"),
            message_file: PathBuf::from("message.md"),
            per_run_cap: 50,
            delay_secs: 60,
            backoff_budget_secs: 3600,
            send_timeout_secs: 120,
            poll_interval_secs: 5,
            media_path: None,
            media_kind: None,
            downloads_dir: PathBuf::from("downloads"),
            transport_command: vec!["telegram-send".to_string()],
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.per_run_cap == 0 {
            return Err(anyhow!("per_run_cap must be > 0"));
        }
        if self.send_timeout_secs == 0 {
            return Err(anyhow!("send_timeout_secs must be > 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be > 0"));
        }
        if self.transport_command.is_empty() || self.transport_command[0].trim().is_empty() {
            return Err(anyhow!("transport_command must be a non-empty array"));
        }
        if self.media_path.is_some() && self.media_kind.is_none() {
            return Err(anyhow!("media_kind must be set when media_path is set"));
        }
        Ok(())
    }

    /// Update a single field from its string form.
    ///
    /// Numeric fields parse as integers; `media_path` and `media_kind`
    /// accept an empty value to clear; `transport_command` splits on
    /// whitespace. Unknown keys are an error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "session_name" => self.session_name = value.to_string(),
            "contacts_file" => self.contacts_file = PathBuf::from(value),
            "message_file" => self.message_file = PathBuf::from(value),
            "per_run_cap" => {
                self.per_run_cap = value.parse().with_context(|| format!("parse {key}"))?;
            }
            "delay_secs" => {
                self.delay_secs = value.parse().with_context(|| format!("parse {key}"))?;
            }
            "backoff_budget_secs" => {
                self.backoff_budget_secs = value.parse().with_context(|| format!("parse {key}"))?;
            }
            "send_timeout_secs" => {
                self.send_timeout_secs = value.parse().with_context(|| format!("parse {key}"))?;
            }
            "poll_interval_secs" => {
                self.poll_interval_secs = value.parse().with_context(|| format!("parse {key}"))?;
            }
            "media_path" => {
                self.media_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "media_kind" => {
                self.media_kind = if value.is_empty() {
                    None
                } else {
                    Some(value.parse()?)
                };
            }
            "downloads_dir" => self.downloads_dir = PathBuf::from(value),
            "transport_command" => {
                self.transport_command = value.split_whitespace().map(str::to_string).collect();
            }
            other => bail!("unknown setting {other:?}"),
        }
        self.validate()
    }

    /// The configured attachment, if any. Requires a validated settings
    /// value (path and kind set together).
    pub fn attachment(&self) -> Option<Attachment> {
        match (&self.media_path, self.media_kind) {
            (Some(path), Some(kind)) => Some(Attachment {
                path: path.clone(),
                kind,
            }),
            _ => None,
        }
    }

    /// Build the immutable per-run job from these defaults plus overrides.
    pub fn job_spec(&self, overrides: &JobOverrides) -> Result<JobSpec> {
        self.validate()?;
        let cap = overrides.cap.unwrap_or(self.per_run_cap);
        if cap == 0 {
            bail!("per-run cap must be > 0");
        }
        Ok(JobSpec {
            contacts: overrides
                .contacts
                .clone()
                .unwrap_or_else(|| self.contacts_file.clone()),
            message: overrides
                .message
                .clone()
                .unwrap_or_else(|| self.message_file.clone()),
            cap,
            delay: Duration::from_secs(overrides.delay_secs.unwrap_or(self.delay_secs)),
            backoff_budget: Duration::from_secs(self.backoff_budget_secs),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
            attachment: self.attachment(),
        })
    }
}

/// Per-invocation overrides from the worker's launch surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOverrides {
    pub contacts: Option<PathBuf>,
    pub message: Option<PathBuf>,
    pub cap: Option<u32>,
    pub delay_secs: Option<u64>,
}

/// Read-only configuration for one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub contacts: PathBuf,
    pub message: PathBuf,
    pub cap: u32,
    pub delay: Duration,
    pub backoff_budget: Duration,
    pub send_timeout: Duration,
    pub attachment: Option<Attachment>,
}

impl JobSpec {
    /// Directory shared by both processes: the report and the handoff
    /// markers live beside the contacts source.
    pub fn workdir(&self) -> PathBuf {
        match self.contacts.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("settings path missing parent {}", path.display()))?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("absent.toml")).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("courier.toml");
        let mut settings = Settings::default();
        settings.per_run_cap = 5;
        settings.media_path = Some(PathBuf::from("promo.jpg"));
        settings.media_kind = Some(AttachmentKind::Photo);
        write_settings(&path, &settings).expect("write");
        let loaded = load_settings(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn set_updates_fields_individually() {
        let mut settings = Settings::default();
        settings.set("delay_secs", "30").expect("set delay");
        settings.set("per_run_cap", "10").expect("set cap");
        settings.set("media_kind", "photo").expect("set kind");
        settings.set("media_path", "promo.jpg").expect("set path");
        settings
            .set("transport_command", "sh -c send")
            .expect("set command");

        assert_eq!(settings.delay_secs, 30);
        assert_eq!(settings.per_run_cap, 10);
        assert_eq!(settings.transport_command, vec!["sh", "-c", "send"]);
        assert_eq!(
            settings.attachment(),
            Some(Attachment {
                path: PathBuf::from("promo.jpg"),
                kind: AttachmentKind::Photo,
            })
        );
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_numbers() {
        let mut settings = Settings::default();
        assert!(settings.set("no_such_key", "1").is_err());
        assert!(settings.set("per_run_cap", "many").is_err());
    }

    #[test]
    fn media_path_without_kind_fails_validation() {
        let mut settings = Settings::default();
        let err = settings.set("media_path", "promo.jpg").unwrap_err();
        assert!(err.to_string().contains("media_kind"));
    }

    #[test]
    fn clearing_media_fields_with_empty_values() {
        let mut settings = Settings::default();
        settings.set("media_kind", "document").expect("kind");
        settings.set("media_path", "file.pdf").expect("path");
        settings.set("media_path", "").expect("clear path");
        settings.set("media_kind", "").expect("clear kind");
        assert_eq!(settings.attachment(), None);
    }

    #[test]
    fn job_spec_merges_overrides_over_defaults() {
        let settings = Settings::default();
        let overrides = JobOverrides {
            contacts: Some(PathBuf::from("/tmp/list.csv")),
            cap: Some(3),
            ..JobOverrides::default()
        };
        let job = settings.job_spec(&overrides).expect("job");

        assert_eq!(job.contacts, PathBuf::from("/tmp/list.csv"));
        assert_eq!(job.message, PathBuf::from("message.md"));
        assert_eq!(job.cap, 3);
        assert_eq!(job.delay, Duration::from_secs(60));
        assert_eq!(job.workdir(), PathBuf::from("/tmp"));
    }

    #[test]
    fn job_spec_rejects_zero_cap_override() {
        let settings = Settings::default();
        let overrides = JobOverrides {
            cap: Some(0),
            ..JobOverrides::default()
        };
        assert!(settings.job_spec(&overrides).is_err());
    }

    #[test]
    fn bare_contacts_path_resolves_workdir_to_cwd() {
        let job = Settings::default()
            .job_spec(&JobOverrides::default())
            .expect("job");
        assert_eq!(job.workdir(), PathBuf::from("."));
    }
}
