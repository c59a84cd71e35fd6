use std::any::type_name_of_val;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use vigil_model::{ExecutionId, FindingRecord, ScanProgress, ScanRequest};

use super::handle::{ScanHandle, ScanOutcome};
use super::state::ScanState;
use super::workflow::{Workflow, WorkflowParts};
use crate::batch::BatchScheduler;
use crate::codec::PayloadCodec;
use crate::collaborator::{TargetChecker, TargetFetcher};
use crate::config::OrchestratorConfig;
use crate::error::{Result, ScanError};
use crate::journal::{StepJournal, StepRecorder};

/// Entry point for starting, querying and signalling scan executions.
///
/// At most one execution per target group is live: executions are keyed by
/// the deterministic id derived from the group, and starting a group again
/// terminates the previous execution first.
pub struct ScanEngine {
    config: OrchestratorConfig,
    fetcher: Arc<dyn TargetFetcher>,
    checker: Arc<dyn TargetChecker>,
    journal: Arc<dyn StepJournal>,
    codec: Arc<dyn PayloadCodec>,
    executions: RwLock<HashMap<ExecutionId, ScanHandle>>,
}

impl fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let execution_count = self
            .executions
            .try_read()
            .map(|guard| guard.len())
            .unwrap_or_default();

        f.debug_struct("ScanEngine")
            .field("config", &self.config)
            .field("fetcher_type", &type_name_of_val(self.fetcher.as_ref()))
            .field("checker_type", &type_name_of_val(self.checker.as_ref()))
            .field("journal_type", &type_name_of_val(self.journal.as_ref()))
            .field("codec", &self.codec)
            .field("execution_count", &execution_count)
            .finish()
    }
}

impl ScanEngine {
    pub fn new(
        config: OrchestratorConfig,
        fetcher: Arc<dyn TargetFetcher>,
        checker: Arc<dyn TargetChecker>,
        journal: Arc<dyn StepJournal>,
        codec: Arc<dyn PayloadCodec>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            checker,
            journal,
            codec,
            executions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validates the input and starts a fresh execution, superseding any
    /// live execution for the same group.
    pub async fn start(
        &self,
        target_group: &str,
        credential: Option<&str>,
    ) -> Result<ExecutionId> {
        let request = ScanRequest::new(target_group, credential)?;
        let handle = self.start_request(request).await?;
        Ok(handle.execution_id().clone())
    }

    pub async fn start_request(&self, request: ScanRequest) -> Result<ScanHandle> {
        self.launch(request, true).await
    }

    /// Re-runs an execution against its existing journal. Steps recorded by
    /// an earlier run are replayed instead of calling collaborators again.
    pub async fn recover(&self, request: ScanRequest) -> Result<ScanHandle> {
        self.launch(request, false).await
    }

    async fn launch(&self, request: ScanRequest, fresh: bool) -> Result<ScanHandle> {
        let execution_id = request.execution_id();
        // The registry lock is never held while a superseded run winds down.
        let mut executions = loop {
            let prior = self.executions.read().await.get(&execution_id).cloned();
            if let Some(prior) = prior.filter(|prior| !prior.is_finished()) {
                tracing::info!(
                    execution_id = %execution_id,
                    "superseding in-flight execution"
                );
                prior.terminate();
                if let Err(err) = prior.wait().await {
                    tracing::warn!(
                        execution_id = %execution_id,
                        error = %err,
                        "superseded execution ended without an outcome"
                    );
                }
            }

            let executions = self.executions.write().await;
            // Another start may have won the race; supersede it too.
            let raced = executions
                .get(&execution_id)
                .is_some_and(|current| !current.is_finished());
            if !raced {
                break executions;
            }
        };

        if fresh {
            self.journal.clear(&execution_id).await?;
        }

        let state = ScanState::new(
            request.target_group().clone(),
            self.config.batch_size,
            self.config.max_batch_size,
        );
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let terminate = CancellationToken::new();

        let handle = ScanHandle::new(
            execution_id.clone(),
            command_tx,
            snapshot_rx,
            outcome_rx,
            terminate.clone(),
        );

        let span = tracing::info_span!(
            "scan",
            execution_id = %execution_id,
            replay = !fresh
        );
        let workflow = Workflow::new(WorkflowParts {
            config: self.config.clone(),
            fetcher: Arc::clone(&self.fetcher),
            scheduler: BatchScheduler::new(Arc::clone(&self.checker), self.config.check),
            recorder: StepRecorder::new(
                Arc::clone(&self.journal),
                Arc::clone(&self.codec),
                execution_id.clone(),
            ),
            request,
            commands: command_rx,
            snapshots: snapshot_tx,
            outcome: outcome_tx,
            terminate,
        });
        tokio::spawn(workflow.run().instrument(span));

        executions.insert(execution_id, handle.clone());
        Ok(handle)
    }

    pub async fn handle(&self, execution_id: &ExecutionId) -> Result<ScanHandle> {
        let guard = self.executions.read().await;
        guard
            .get(execution_id)
            .cloned()
            .ok_or_else(|| ScanError::ExecutionNotFound(execution_id.clone()))
    }

    pub async fn progress(&self, execution_id: &ExecutionId) -> Result<ScanProgress> {
        Ok(self.handle(execution_id).await?.progress())
    }

    pub async fn results_so_far(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Vec<FindingRecord>> {
        Ok(self.handle(execution_id).await?.results_so_far())
    }

    pub async fn is_cancel_requested(&self, execution_id: &ExecutionId) -> Result<bool> {
        Ok(self.handle(execution_id).await?.is_cancel_requested())
    }

    pub async fn current_batch_size(&self, execution_id: &ExecutionId) -> Result<usize> {
        Ok(self.handle(execution_id).await?.current_batch_size())
    }

    pub async fn cancel(
        &self,
        execution_id: &ExecutionId,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.handle(execution_id).await?.cancel(reason)
    }

    pub async fn pause(&self, execution_id: &ExecutionId, duration: Duration) -> Result<()> {
        self.handle(execution_id).await?.pause(duration)
    }

    pub async fn update_batch_size(
        &self,
        execution_id: &ExecutionId,
        size: usize,
    ) -> Result<String> {
        self.handle(execution_id).await?.update_batch_size(size).await
    }

    pub async fn wait(&self, execution_id: &ExecutionId) -> Result<ScanOutcome> {
        self.handle(execution_id).await?.wait().await
    }

    /// Terminates every live execution and waits for each to settle.
    pub async fn shutdown(&self) {
        let handles: Vec<ScanHandle> = {
            let guard = self.executions.read().await;
            guard.values().cloned().collect()
        };
        for handle in handles {
            if handle.is_finished() {
                continue;
            }
            handle.terminate();
            if let Err(err) = handle.wait().await {
                tracing::warn!(
                    execution_id = %handle.execution_id(),
                    error = %err,
                    "execution ended without an outcome during shutdown"
                );
            }
        }
    }
}
