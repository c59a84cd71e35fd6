use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use vigil_model::{FindingRecord, ScanRequest, ScanStatus, TargetRecord};

use super::command::{RecordedSignal, ScanCommand, SignalRecord};
use super::handle::ScanOutcome;
use super::state::{ScanSnapshot, ScanState};
use crate::batch::{BatchScheduler, next_batch};
use crate::collaborator::TargetFetcher;
use crate::config::OrchestratorConfig;
use crate::error::{Result, ScanError};
use crate::heartbeat::supervise;
use crate::journal::{StepKey, StepRecorder};
use crate::report;
use crate::retry::execute_with_retry;

enum Wake<T> {
    Done(T),
    Command(ScanCommand),
    MailboxClosed,
    Deadline,
    Terminated,
}

/// The control loop of one execution: fetch, batches, report.
///
/// Runs on a single task and owns all mutable state. Collaborator work is
/// handed off as owned futures and awaited through [`Workflow::suspend`], so
/// signals keep flowing while a fetch or batch is in flight.
pub(crate) struct Workflow {
    request: ScanRequest,
    config: OrchestratorConfig,
    fetcher: Arc<dyn TargetFetcher>,
    scheduler: BatchScheduler,
    recorder: StepRecorder,
    state: ScanState,
    commands: mpsc::UnboundedReceiver<ScanCommand>,
    commands_open: bool,
    snapshots: watch::Sender<ScanSnapshot>,
    outcome: watch::Sender<Option<ScanOutcome>>,
    terminate: CancellationToken,
    deadline: Pin<Box<Sleep>>,
    /// Batches dispatched so far; signals are journaled against it.
    boundary: usize,
    signal_seq: usize,
    recorded_signals: VecDeque<SignalRecord>,
}

pub(crate) struct WorkflowParts {
    pub request: ScanRequest,
    pub config: OrchestratorConfig,
    pub fetcher: Arc<dyn TargetFetcher>,
    pub scheduler: BatchScheduler,
    pub recorder: StepRecorder,
    pub commands: mpsc::UnboundedReceiver<ScanCommand>,
    pub snapshots: watch::Sender<ScanSnapshot>,
    pub outcome: watch::Sender<Option<ScanOutcome>>,
    pub terminate: CancellationToken,
}

impl Workflow {
    pub(crate) fn new(parts: WorkflowParts) -> Self {
        let state = ScanState::new(
            parts.request.target_group().clone(),
            parts.config.batch_size,
            parts.config.max_batch_size,
        );
        let deadline = Box::pin(tokio::time::sleep(parts.config.execution_timeout()));
        Self {
            request: parts.request,
            config: parts.config,
            fetcher: parts.fetcher,
            scheduler: parts.scheduler,
            recorder: parts.recorder,
            state,
            commands: parts.commands,
            commands_open: true,
            snapshots: parts.snapshots,
            outcome: parts.outcome,
            terminate: parts.terminate,
            deadline,
            boundary: 0,
            signal_seq: 0,
            recorded_signals: VecDeque::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!(target_group = %self.request.target_group(), "scan started");
        let result = self.execute().await;
        self.finalize(result).await;
    }

    async fn execute(&mut self) -> Result<()> {
        self.state.begin_fetch()?;
        self.publish();
        self.load_recorded_signals().await?;

        let targets = self.fetch_targets().await?;
        self.state.targets_fetched(targets.len())?;
        self.publish();
        tracing::info!(total = targets.len(), "targets fetched");

        let mut offset = 0;
        loop {
            self.apply_recorded_signals(Some(self.boundary));
            if self.cancel_observed()? {
                break;
            }
            if let Some(duration) = self.state.take_pause() {
                self.pause(duration).await?;
                if self.cancel_observed()? {
                    break;
                }
            }

            let Some(range) =
                next_batch(offset, targets.len(), self.state.batch_size())
            else {
                break;
            };
            tracing::debug!(
                batch_start = range.start,
                batch_len = range.len(),
                "dispatching batch"
            );

            self.boundary += 1;
            let work = self.scheduler.clone().run(
                self.request.target_group().clone(),
                self.request.shared_credential(),
                self.recorder.clone(),
                range.start,
                targets[range.clone()].to_vec(),
            );
            let findings = self.suspend(Box::pin(work)).await??;
            self.apply_batch(findings);
            offset = range.end;
        }
        Ok(())
    }

    async fn load_recorded_signals(&mut self) -> Result<()> {
        while let Some(record) = self
            .recorder
            .replay::<SignalRecord>(&StepKey::signal(self.signal_seq))
            .await?
        {
            self.recorded_signals.push_back(record);
            self.signal_seq += 1;
        }
        if self.signal_seq > 0 {
            tracing::info!(signals = self.signal_seq, "replaying recorded signals");
        }
        Ok(())
    }

    /// Re-applies journaled signals observed at or before `boundary`, or all
    /// of them when `boundary` is `None`. Pauses were already served.
    fn apply_recorded_signals(&mut self, boundary: Option<usize>) {
        let mut applied = false;
        while let Some(record) = self.recorded_signals.front() {
            if boundary.is_some_and(|boundary| record.boundary > boundary) {
                break;
            }
            let Some(record) = self.recorded_signals.pop_front() else {
                break;
            };
            match record.signal {
                RecordedSignal::Cancel {
                    reason,
                    received_at,
                } => {
                    if self.state.request_cancel(reason, received_at) {
                        tracing::info!(
                            reason = self.state.cancel_reason().unwrap_or_default(),
                            "replayed cancellation"
                        );
                    }
                }
                RecordedSignal::Pause { duration_ms } => {
                    tracing::debug!(duration_ms, "recorded pause skipped on replay");
                }
                RecordedSignal::BatchSize { size } => {
                    match self.state.update_batch_size(size) {
                        Ok(message) => tracing::info!(%message, "replayed batch size"),
                        Err(err) => tracing::warn!(
                            error = %err,
                            "recorded batch size no longer applies"
                        ),
                    }
                }
            }
            applied = true;
        }
        if applied {
            self.publish();
        }
    }

    async fn record_signal(&mut self, signal: RecordedSignal) {
        let record = SignalRecord {
            boundary: self.boundary,
            signal,
        };
        self.recorder
            .record_or_warn(&StepKey::signal(self.signal_seq), &record)
            .await;
        self.signal_seq += 1;
    }

    /// At a batch boundary: moves to `cancelling` if a cancel is pending.
    fn cancel_observed(&mut self) -> Result<bool> {
        if !self.state.cancel_requested() {
            return Ok(false);
        }
        self.state.enter_cancelling()?;
        self.publish();
        tracing::info!(
            reason = self.state.cancel_reason().unwrap_or_default(),
            scanned = self.state.progress().scanned,
            "cancellation observed at batch boundary"
        );
        Ok(true)
    }

    fn apply_batch(&mut self, findings: Vec<FindingRecord>) {
        let size = findings.len();
        self.state.apply_batch(findings);
        self.publish();
        let progress = self.state.progress();
        tracing::info!(
            batch_len = size,
            scanned = progress.scanned,
            errors = progress.errors,
            total = progress.total,
            "batch complete"
        );
    }

    async fn fetch_targets(&mut self) -> Result<Vec<TargetRecord>> {
        let step = StepKey::fetch_targets();
        if let Some(targets) = self.recorder.replay(&step).await? {
            return Ok(targets);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let options = self.config.fetch;
        let target_group = self.request.target_group().clone();
        let credential = self.request.shared_credential();
        let work = async move {
            execute_with_retry("fetch", &options, |_| {
                let fetcher = Arc::clone(&fetcher);
                let target_group = target_group.clone();
                let credential = credential.clone();
                supervise(options.heartbeat_timeout(), move |heartbeat| async move {
                    fetcher
                        .fetch(&target_group, credential.as_deref(), &heartbeat)
                        .await
                })
            })
            .await
        };

        let targets = self.suspend(Box::pin(work)).await?.map_err(|exhausted| {
            ScanError::FetchFailed(format!(
                "{} (after {} attempt(s))",
                exhausted.error, exhausted.attempts
            ))
        })?;
        self.recorder.record_or_warn(&step, &targets).await;
        Ok(targets)
    }

    async fn pause(&mut self, duration: std::time::Duration) -> Result<()> {
        self.state.set_paused(true);
        self.publish();
        tracing::info!(duration_ms = duration.as_millis() as u64, "pausing");

        let mut sleep = Box::pin(tokio::time::sleep(duration));
        let outcome = loop {
            let wake = self.wait_once(sleep.as_mut()).await;
            match wake {
                Wake::Done(()) => break Ok(()),
                Wake::Command(command) => {
                    self.handle_command(command).await;
                    if self.state.cancel_requested() {
                        tracing::info!("pause ended early by cancellation");
                        break Ok(());
                    }
                }
                Wake::MailboxClosed => self.commands_open = false,
                Wake::Deadline => break Err(self.deadline_error()),
                Wake::Terminated => break Err(terminated_error()),
            }
        };

        self.state.set_paused(false);
        self.publish();
        outcome
    }

    /// Awaits `work` while serving the mailbox. Fails on the execution
    /// deadline or termination; dropping `work` then aborts it.
    async fn suspend<T>(&mut self, mut work: BoxFuture<'static, T>) -> Result<T> {
        loop {
            match self.wait_once(work.as_mut()).await {
                Wake::Done(value) => return Ok(value),
                Wake::Command(command) => self.handle_command(command).await,
                Wake::MailboxClosed => self.commands_open = false,
                Wake::Deadline => return Err(self.deadline_error()),
                Wake::Terminated => return Err(terminated_error()),
            }
        }
    }

    async fn wait_once<F>(&mut self, work: Pin<&mut F>) -> Wake<F::Output>
    where
        F: std::future::Future + ?Sized,
    {
        tokio::select! {
            biased;
            _ = self.terminate.cancelled() => Wake::Terminated,
            _ = self.deadline.as_mut() => Wake::Deadline,
            command = self.commands.recv(), if self.commands_open => match command {
                Some(command) => Wake::Command(command),
                None => Wake::MailboxClosed,
            },
            value = work => Wake::Done(value),
        }
    }

    /// Applies a live signal and journals it once accepted.
    async fn handle_command(&mut self, command: ScanCommand) {
        match command {
            ScanCommand::Cancel {
                reason,
                received_at,
            } => {
                if self.state.request_cancel(reason.clone(), received_at) {
                    tracing::info!(
                        reason = self.state.cancel_reason().unwrap_or_default(),
                        "cancellation requested"
                    );
                    self.publish();
                    self.record_signal(RecordedSignal::Cancel {
                        reason,
                        received_at,
                    })
                    .await;
                } else {
                    tracing::debug!("duplicate cancellation ignored");
                }
            }
            ScanCommand::Pause { duration } => {
                self.state.request_pause(duration);
                let duration_ms = duration.as_millis() as u64;
                tracing::info!(duration_ms, "pause requested");
                self.record_signal(RecordedSignal::Pause { duration_ms }).await;
            }
            ScanCommand::UpdateBatchSize { size, reply } => {
                let result = self.state.update_batch_size(size);
                match &result {
                    Ok(message) => {
                        tracing::info!(%message);
                        self.publish();
                        self.record_signal(RecordedSignal::BatchSize { size }).await;
                    }
                    Err(err) => tracing::warn!(error = %err, "batch size update rejected"),
                }
                let _ = reply.send(result);
            }
        }
    }

    fn deadline_error(&self) -> ScanError {
        ScanError::ExecutionTimeout(self.config.execution_timeout())
    }

    /// Drains the mailbox, settles the terminal status and publishes the
    /// outcome. Every signal whose send succeeded is applied before the
    /// status is settled; later senders get a rejection.
    async fn finalize(mut self, result: Result<()>) {
        self.apply_recorded_signals(None);
        self.state.begin_finalizing();
        self.commands.close();
        // `recv` after `close` yields buffered and in-flight sends, then None.
        while let Some(command) = self.commands.recv().await {
            self.handle_command(command).await;
        }

        let failure = match result {
            Ok(()) => self.settle_success().err(),
            Err(err) => Some(err),
        };
        let failure = failure.map(|err| {
            if let Err(transition) = self.state.finish(ScanStatus::Failed) {
                tracing::error!(error = %transition, "could not mark execution failed");
            }
            err.to_string()
        });

        let results = self.state.results().to_vec();
        let report = if failure.is_some() && results.is_empty() {
            None
        } else {
            Some(report::generate(
                self.request.target_group(),
                &results,
                if self.state.status() == ScanStatus::Cancelled {
                    self.state.cancellation_summary()
                } else {
                    None
                },
            ))
        };

        self.publish();
        let status = self.state.status();
        match &failure {
            Some(reason) => tracing::warn!(%status, %reason, "scan failed"),
            None => tracing::info!(
                %status,
                scanned = self.state.progress().scanned,
                errors = self.state.progress().errors,
                "scan finished"
            ),
        }

        self.outcome.send_replace(Some(ScanOutcome {
            execution_id: self.recorder.execution_id().clone(),
            status,
            progress: self.state.progress().clone(),
            results,
            report,
            failure,
        }));
    }

    fn settle_success(&mut self) -> Result<()> {
        if self.state.cancel_requested() {
            self.state.enter_cancelling()?;
            self.state.finish(ScanStatus::Cancelled)
        } else {
            self.state.finish(ScanStatus::Completed)
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }
}

fn terminated_error() -> ScanError {
    ScanError::Terminated("terminated before completion".to_string())
}
