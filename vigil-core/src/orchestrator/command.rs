use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::Result;

/// Messages delivered to a running execution's mailbox.
#[derive(Debug)]
pub enum ScanCommand {
    Cancel {
        reason: String,
        received_at: DateTime<Utc>,
    },
    Pause {
        duration: Duration,
    },
    UpdateBatchSize {
        size: usize,
        reply: oneshot::Sender<Result<String>>,
    },
}

/// An accepted signal as it is journaled. `boundary` is the batch boundary
/// at which the workflow observed it: `0` right after the fetch, `n` after
/// the `n`-th dispatched batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SignalRecord {
    pub boundary: usize,
    pub signal: RecordedSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum RecordedSignal {
    Cancel {
        reason: String,
        received_at: DateTime<Utc>,
    },
    Pause {
        duration_ms: u64,
    },
    BatchSize {
        size: usize,
    },
}
