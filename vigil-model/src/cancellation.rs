use chrono::{DateTime, Utc};

pub const DEFAULT_CANCEL_REASON: &str = "Manual cancellation";

/// A cancellation signal as delivered to a running execution.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CancellationRequest {
    pub reason: String,
    pub received_at: DateTime<Utc>,
}

impl CancellationRequest {
    /// Blank reasons fall back to [`DEFAULT_CANCEL_REASON`].
    pub fn new(reason: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            DEFAULT_CANCEL_REASON.to_string()
        } else {
            reason
        };
        Self {
            reason,
            received_at,
        }
    }
}
