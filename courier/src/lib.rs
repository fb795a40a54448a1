//! Resumable bulk outbound-messaging dispatch engine.
//!
//! This crate implements a single-job delivery model: one contact list, one
//! message, delivered at most once per recipient with progress persisted so a
//! restart never re-sends. The architecture keeps three seams explicit:
//!
//! - **[`ledger`] / [`message`]**: input loading and normalization. Pure once
//!   loaded, fully testable without a transport.
//! - **[`sendloop`]**: the rate-limited delivery loop. Side effects (sending,
//!   sleeping, cancellation) are injected through traits so tests script them.
//! - **[`report`] / [`handoff`]**: the write-then-signal contract with the
//!   orchestrator process. The report is durably on disk before the
//!   completion marker exists.
//!
//! The `courier` binary wires these together into the worker process;
//! `overseer` (a sibling crate) drives the worker from the orchestrator side.

pub mod config;
pub mod error;
pub mod handoff;
pub mod ledger;
pub mod logging;
pub mod message;
pub mod report;
pub mod sendloop;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transport;
