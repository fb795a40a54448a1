//! Locating and launching the worker binary.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Environment variable overriding the worker binary location.
pub const WORKER_BIN_ENV: &str = "COURIER_BIN";

/// Resolve the worker binary: the [`WORKER_BIN_ENV`] override if set,
/// otherwise `courier` on PATH.
pub fn worker_binary() -> PathBuf {
    worker_binary_from(std::env::var_os(WORKER_BIN_ENV))
}

fn worker_binary_from(env_override: Option<OsString>) -> PathBuf {
    match env_override {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(format!("courier{}", std::env::consts::EXE_SUFFIX)),
    }
}

/// Spawn a detached worker run with stdout/stderr captured to `log_path`.
///
/// The child is not awaited; completion is observable only through the
/// handoff marker.
pub fn spawn_worker(binary: &Path, config_path: &Path, log_path: &Path) -> Result<u32> {
    let log = fs::File::create(log_path)
        .with_context(|| format!("create worker log {}", log_path.display()))?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("clone worker log handle {}", log_path.display()))?;

    let child = Command::new(binary)
        .arg("--config")
        .arg(config_path)
        .arg("run")
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .with_context(|| format!("spawn worker {}", binary.display()))?;

    Ok(child.id())
}
