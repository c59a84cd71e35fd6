//! Scan execution runtime.
//!
//! [`ScanEngine`] owns the registry of live executions. Each execution runs
//! as one spawned workflow task that fetches targets, checks them batch by
//! batch and finalizes with a report. Callers interact through a
//! [`ScanHandle`]: queries read published snapshots, signals go through the
//! execution's mailbox.

mod command;
mod engine;
mod handle;
mod state;
mod workflow;

pub use command::ScanCommand;
pub use engine::ScanEngine;
pub use handle::{ScanHandle, ScanOutcome};
pub use state::{MIN_PAUSE, ScanSnapshot};
