//! Step-result cache that makes executions replayable.
//!
//! Every collaborator-facing step (the fetch, each check, each finished
//! batch) stores its result under a stable [`StepKey`]; every accepted
//! signal is stored in arrival order as well. Before a step runs,
//! the orchestrator consults the journal; a recorded result is replayed
//! instead of calling the collaborator again. Results are sealed through the
//! configured [`PayloadCodec`] so nothing sensitive rests in plain text.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use vigil_model::{ExecutionId, TargetId};

use crate::codec::{Envelope, PayloadCodec};
use crate::error::Result;

const FETCH_STEP: &str = "fetch-targets";

/// Stable identity of one recorded step within an execution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepKey(String);

impl StepKey {
    pub fn fetch_targets() -> Self {
        Self(FETCH_STEP.to_string())
    }

    /// Key of the batch covering `offset..offset + len` of the fetched list.
    pub fn batch(offset: usize, len: usize) -> Self {
        Self(format!("batch/{offset}+{len}"))
    }

    /// Key of the check of the target at `index` in the fetched list. The
    /// index keeps repeated ids apart.
    pub fn check(index: usize, target: &TargetId) -> Self {
        Self(format!("check/{index}/{target}"))
    }

    /// Key of the `seq`-th accepted signal.
    pub fn signal(seq: usize) -> Self {
        Self(format!("signal/{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for recorded step results, keyed by execution and step.
#[async_trait]
pub trait StepJournal: Send + Sync {
    async fn load(
        &self,
        execution: &ExecutionId,
        step: &StepKey,
    ) -> Result<Option<Vec<u8>>>;

    async fn store(
        &self,
        execution: &ExecutionId,
        step: &StepKey,
        payload: Vec<u8>,
    ) -> Result<()>;

    /// Forgets every step of `execution`.
    async fn clear(&self, execution: &ExecutionId) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryJournal {
    entries: RwLock<HashMap<ExecutionId, BTreeMap<StepKey, Vec<u8>>>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored bytes of an execution, ordered by step key.
    pub async fn entries(
        &self,
        execution: &ExecutionId,
    ) -> Vec<(StepKey, Vec<u8>)> {
        let guard = self.entries.read().await;
        guard
            .get(execution)
            .map(|steps| {
                steps
                    .iter()
                    .map(|(key, bytes)| (key.clone(), bytes.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn step_count(&self, execution: &ExecutionId) -> usize {
        let guard = self.entries.read().await;
        guard.get(execution).map(BTreeMap::len).unwrap_or(0)
    }
}

#[async_trait]
impl StepJournal for InMemoryJournal {
    async fn load(
        &self,
        execution: &ExecutionId,
        step: &StepKey,
    ) -> Result<Option<Vec<u8>>> {
        let guard = self.entries.read().await;
        Ok(guard
            .get(execution)
            .and_then(|steps| steps.get(step))
            .cloned())
    }

    async fn store(
        &self,
        execution: &ExecutionId,
        step: &StepKey,
        payload: Vec<u8>,
    ) -> Result<()> {
        let mut guard = self.entries.write().await;
        guard
            .entry(execution.clone())
            .or_default()
            .insert(step.clone(), payload);
        Ok(())
    }

    async fn clear(&self, execution: &ExecutionId) -> Result<()> {
        let mut guard = self.entries.write().await;
        guard.remove(execution);
        Ok(())
    }
}

/// Journal access bound to one execution and one codec.
#[derive(Clone)]
pub struct StepRecorder {
    journal: Arc<dyn StepJournal>,
    codec: Arc<dyn PayloadCodec>,
    execution_id: ExecutionId,
}

impl fmt::Debug for StepRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRecorder")
            .field("execution_id", &self.execution_id)
            .field("journal", &std::any::type_name_of_val(self.journal.as_ref()))
            .field("codec", &self.codec)
            .finish()
    }
}

impl StepRecorder {
    pub fn new(
        journal: Arc<dyn StepJournal>,
        codec: Arc<dyn PayloadCodec>,
        execution_id: ExecutionId,
    ) -> Self {
        Self {
            journal,
            codec,
            execution_id,
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Returns the recorded result of `step`, if any. A record that fails
    /// to open or parse is an error, never a silent miss.
    pub async fn replay<T>(&self, step: &StepKey) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(bytes) = self.journal.load(&self.execution_id, step).await?
        else {
            return Ok(None);
        };
        let envelope = Envelope::from_bytes(&bytes)?;
        let plain = self.codec.decode(&envelope)?;
        let value = serde_json::from_slice(&plain)?;
        tracing::debug!(step = %step, "replayed step result");
        Ok(Some(value))
    }

    pub async fn record<T>(&self, step: &StepKey, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let plain = serde_json::to_vec(value)?;
        let envelope = self.codec.encode(&plain)?;
        self.journal
            .store(&self.execution_id, step, envelope.to_bytes()?)
            .await
    }

    /// Like [`record`](Self::record), but a failure only costs replay
    /// ability, so it is logged and swallowed.
    pub async fn record_or_warn<T>(&self, step: &StepKey, value: &T)
    where
        T: Serialize + ?Sized,
    {
        if let Err(err) = self.record(step, value).await {
            tracing::warn!(step = %step, error = %err, "failed to record step");
        }
    }
}
