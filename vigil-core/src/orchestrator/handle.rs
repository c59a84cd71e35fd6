use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use vigil_model::{ExecutionId, FindingRecord, Report, ScanProgress, ScanStatus};

use super::command::ScanCommand;
use super::state::ScanSnapshot;
use crate::error::{Result, ScanError};

/// Terminal result of one execution: final status plus everything that had
/// accumulated when it stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub execution_id: ExecutionId,
    pub status: ScanStatus,
    pub progress: ScanProgress,
    pub results: Vec<FindingRecord>,
    pub report: Option<Report>,
    pub failure: Option<String>,
}

/// Cheap, cloneable client of a running execution.
///
/// Queries read the latest published snapshot and never wait on the
/// execution. Signals go through the execution's mailbox; once it closes for
/// finalization they are rejected rather than dropped.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    execution_id: ExecutionId,
    commands: mpsc::UnboundedSender<ScanCommand>,
    snapshots: watch::Receiver<ScanSnapshot>,
    outcome: watch::Receiver<Option<ScanOutcome>>,
    terminate: CancellationToken,
}

impl ScanHandle {
    pub(crate) fn new(
        execution_id: ExecutionId,
        commands: mpsc::UnboundedSender<ScanCommand>,
        snapshots: watch::Receiver<ScanSnapshot>,
        outcome: watch::Receiver<Option<ScanOutcome>>,
        terminate: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            commands,
            snapshots,
            outcome,
            terminate,
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn progress(&self) -> ScanProgress {
        self.snapshots.borrow().progress.clone()
    }

    pub fn results_so_far(&self) -> Vec<FindingRecord> {
        self.snapshots.borrow().results.as_ref().clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.snapshots.borrow().progress.cancel_requested
    }

    pub fn current_batch_size(&self) -> usize {
        self.snapshots.borrow().progress.batch_size
    }

    /// Fire-and-forget. Observed at the next batch boundary; repeats are
    /// no-ops.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<()> {
        self.send(ScanCommand::Cancel {
            reason: reason.into(),
            received_at: Utc::now(),
        })
    }

    /// Holds the execution at the next batch boundary for `duration`.
    pub fn pause(&self, duration: Duration) -> Result<()> {
        self.send(ScanCommand::Pause { duration })
    }

    /// Changes the size of batches started after this call.
    pub async fn update_batch_size(&self, size: usize) -> Result<String> {
        let (reply, response) = oneshot::channel();
        self.send(ScanCommand::UpdateBatchSize { size, reply })?;
        response.await.map_err(|_| self.closed())?
    }

    pub fn outcome(&self) -> Option<ScanOutcome> {
        self.outcome.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Resolves once the execution reaches a terminal status.
    pub async fn wait(&self) -> Result<ScanOutcome> {
        let mut outcome = self.outcome.clone();
        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| {
                ScanError::Terminated(format!(
                    "{} stopped without an outcome",
                    self.execution_id
                ))
            })?;
        settled.clone().ok_or_else(|| {
            ScanError::Terminated(format!("{} has no outcome", self.execution_id))
        })
    }

    /// Stops the execution at its next suspension point. It still finalizes
    /// as `failed` with whatever it had accumulated.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    fn send(&self, command: ScanCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| self.closed())
    }

    fn closed(&self) -> ScanError {
        ScanError::SignalRejected(format!(
            "{} is finalizing or finished",
            self.execution_id
        ))
    }
}
