//! Core data model definitions shared across Vigil crates.
//!
//! Everything here is a plain record: requests, the targets a fetch produces,
//! the per-target findings, the live progress counters and the final report.
//! Records are immutable once handed across a component boundary; the only
//! mutation paths are the explicit transition methods on [`ScanProgress`].
#![allow(missing_docs)]

pub mod cancellation;
pub mod credential;
pub mod error;
pub mod finding;
pub mod ids;
pub mod progress;
pub mod report;
pub mod request;
pub mod target;

pub use cancellation::CancellationRequest;
pub use credential::Credential;
pub use error::{ModelError, Result as ModelResult};
pub use finding::{ControlStatus, FindingRecord, SecurityControl};
pub use ids::{ExecutionId, TargetGroupId, TargetId};
pub use progress::{ScanProgress, ScanStatus};
pub use report::{CancellationSummary, ComplianceRate, Report};
pub use request::ScanRequest;
pub use target::TargetRecord;
