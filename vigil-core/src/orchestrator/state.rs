use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use vigil_model::{
    CancellationRequest, CancellationSummary, FindingRecord, ModelError,
    ScanProgress, ScanStatus, TargetGroupId,
};

use crate::error::{Result, ScanError};

pub const MIN_PAUSE: Duration = Duration::from_secs(1);

/// Immutable view handed to queries.
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    pub progress: ScanProgress,
    pub results: Arc<Vec<FindingRecord>>,
}

/// Execution state owned by the workflow task. Every mutation goes through
/// one of the transition methods below.
#[derive(Debug)]
pub(crate) struct ScanState {
    progress: ScanProgress,
    results: Arc<Vec<FindingRecord>>,
    cancellation: Option<CancellationRequest>,
    scanned_at_cancel: Option<usize>,
    pending_pause: Option<Duration>,
    max_batch_size: usize,
    finalizing: bool,
}

impl ScanState {
    pub(crate) fn new(
        target_group: TargetGroupId,
        batch_size: usize,
        max_batch_size: usize,
    ) -> Self {
        Self {
            progress: ScanProgress::new(target_group, batch_size),
            results: Arc::new(Vec::new()),
            cancellation: None,
            scanned_at_cancel: None,
            pending_pause: None,
            max_batch_size,
            finalizing: false,
        }
    }

    pub(crate) fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            progress: self.progress.clone(),
            results: Arc::clone(&self.results),
        }
    }

    pub(crate) fn progress(&self) -> &ScanProgress {
        &self.progress
    }

    pub(crate) fn results(&self) -> &[FindingRecord] {
        &self.results
    }

    pub(crate) fn status(&self) -> ScanStatus {
        self.progress.status
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.progress.batch_size
    }

    pub(crate) fn begin_fetch(&mut self) -> Result<()> {
        Ok(self.progress.advance(ScanStatus::Fetching)?)
    }

    pub(crate) fn targets_fetched(&mut self, total: usize) -> Result<()> {
        self.progress.total = total;
        Ok(self.progress.advance(ScanStatus::Scanning)?)
    }

    /// Folds a whole batch in at once; queries never see half a batch.
    pub(crate) fn apply_batch(&mut self, findings: Vec<FindingRecord>) {
        self.progress.record_batch(&findings);
        Arc::make_mut(&mut self.results).extend(findings);
    }

    /// First reason wins. Returns whether this request was the first.
    pub(crate) fn request_cancel(
        &mut self,
        reason: String,
        received_at: DateTime<Utc>,
    ) -> bool {
        if self.cancellation.is_some() {
            return false;
        }
        self.cancellation = Some(CancellationRequest::new(reason, received_at));
        self.progress.cancel_requested = true;
        true
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancellation.is_some()
    }

    pub(crate) fn cancel_reason(&self) -> Option<&str> {
        self.cancellation.as_ref().map(|c| c.reason.as_str())
    }

    /// Later pause requests replace earlier pending ones.
    pub(crate) fn request_pause(&mut self, duration: Duration) {
        self.pending_pause = Some(duration.max(MIN_PAUSE));
    }

    pub(crate) fn take_pause(&mut self) -> Option<Duration> {
        self.pending_pause.take()
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.progress.paused = paused;
    }

    /// Validates before touching state. Returns the confirmation message.
    pub(crate) fn update_batch_size(&mut self, size: usize) -> Result<String> {
        if self.finalizing || self.progress.status.is_terminal() {
            return Err(ScanError::SignalRejected(format!(
                "cannot update batch size while {}",
                if self.finalizing {
                    "finalizing".to_string()
                } else {
                    self.progress.status.to_string()
                }
            )));
        }
        if size == 0 || size > self.max_batch_size {
            return Err(ModelError::InvalidBatchSize {
                requested: size,
                max: self.max_batch_size,
            }
            .into());
        }
        let old = std::mem::replace(&mut self.progress.batch_size, size);
        Ok(format!("batch size updated: {old} -> {size}"))
    }

    pub(crate) fn begin_finalizing(&mut self) {
        self.finalizing = true;
    }

    /// Moves to `cancelling` and pins the scanned count used by the report.
    pub(crate) fn enter_cancelling(&mut self) -> Result<()> {
        if self.progress.status == ScanStatus::Cancelling {
            return Ok(());
        }
        self.progress.advance(ScanStatus::Cancelling)?;
        self.scanned_at_cancel = Some(self.progress.scanned);
        Ok(())
    }

    pub(crate) fn cancellation_summary(&self) -> Option<CancellationSummary> {
        let request = self.cancellation.as_ref()?;
        Some(CancellationSummary {
            reason: request.reason.clone(),
            scanned_before_cancel: self
                .scanned_at_cancel
                .unwrap_or(self.progress.scanned),
        })
    }

    pub(crate) fn finish(&mut self, status: ScanStatus) -> Result<()> {
        Ok(self.progress.advance(status)?)
    }
}
