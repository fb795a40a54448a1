//! Tracing setup for the worker binary.
//!
//! Delivery outcomes are part of the run's audit trail (recipient,
//! classification, timestamp), so the default level is `info` rather than
//! `warn`: a headless worker invocation should leave a reconstructable log
//! without any environment tweaking.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset. Output: stderr, compact
/// format with timestamps.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
