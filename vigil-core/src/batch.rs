use std::fmt;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use vigil_model::{Credential, FindingRecord, TargetGroupId, TargetRecord};

use crate::collaborator::TargetChecker;
use crate::error::{Result, ScanError};
use crate::journal::{StepKey, StepRecorder};
use crate::retry::{OperationConfig, execute_with_retry};

/// Next contiguous slice of at most `batch_size` targets starting at
/// `offset`, or `None` once the list is exhausted.
pub fn next_batch(
    offset: usize,
    total: usize,
    batch_size: usize,
) -> Option<Range<usize>> {
    if offset >= total || batch_size == 0 {
        return None;
    }
    Some(offset..total.min(offset + batch_size))
}

/// Splits `total` targets into contiguous batches of a fixed size.
pub fn plan(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut offset = 0;
    while let Some(range) = next_batch(offset, total, batch_size) {
        offset = range.end;
        batches.push(range);
    }
    batches
}

/// Runs one batch of checks concurrently and joins every task before
/// returning. A failing target becomes an errored finding; it never
/// cancels its siblings.
#[derive(Clone)]
pub struct BatchScheduler {
    checker: Arc<dyn TargetChecker>,
    options: OperationConfig,
}

impl fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("checker", &std::any::type_name_of_val(self.checker.as_ref()))
            .field("options", &self.options)
            .finish()
    }
}

impl BatchScheduler {
    pub fn new(checker: Arc<dyn TargetChecker>, options: OperationConfig) -> Self {
        Self { checker, options }
    }

    /// Findings of `targets`, which sit at `offset` in the fetched list.
    /// Results come back in completion order and are journaled as a unit.
    pub async fn run(
        self,
        target_group: TargetGroupId,
        credential: Option<Arc<Credential>>,
        recorder: StepRecorder,
        offset: usize,
        targets: Vec<TargetRecord>,
    ) -> Result<Vec<FindingRecord>> {
        let step = StepKey::batch(offset, targets.len());
        if let Some(findings) = recorder.replay(&step).await? {
            return Ok(findings);
        }

        let mut tasks = JoinSet::new();
        for (position, target) in targets.into_iter().enumerate() {
            let task = check_target(
                Arc::clone(&self.checker),
                self.options,
                target_group.clone(),
                credential.clone(),
                recorder.clone(),
                offset + position,
                target.clone(),
            );
            tasks.spawn(async move {
                match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(target_id = %target.id, "check task panicked");
                        Ok(FindingRecord::failed(
                            target.id.clone(),
                            "check panicked",
                            Utc::now(),
                        ))
                    }
                }
            });
        }

        let mut findings = Vec::with_capacity(tasks.len());
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(finding)) => findings.push(finding),
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "check step could not be replayed");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(ScanError::Journal(format!(
                        "check task did not complete: {join_err}"
                    )));
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        recorder.record_or_warn(&step, &findings).await;
        Ok(findings)
    }
}

async fn check_target(
    checker: Arc<dyn TargetChecker>,
    options: OperationConfig,
    target_group: TargetGroupId,
    credential: Option<Arc<Credential>>,
    recorder: StepRecorder,
    index: usize,
    target: TargetRecord,
) -> Result<FindingRecord> {
    let step = StepKey::check(index, &target.id);
    if let Some(finding) = recorder.replay(&step).await? {
        return Ok(finding);
    }

    let outcome = execute_with_retry("check", &options, |_| {
        checker.check(&target_group, &target, credential.as_deref())
    })
    .await;

    let finding = match outcome {
        Ok(finding) => finding,
        Err(exhausted) => {
            let err = ScanError::PartialTask {
                target: target.id.to_string(),
                attempts: exhausted.attempts,
                message: exhausted.error.to_string(),
            };
            tracing::warn!(target_id = %target.id, error = %err, "recording errored finding");
            FindingRecord::failed(target.id.clone(), err.to_string(), Utc::now())
        }
    };

    recorder.record_or_warn(&step, &finding).await;
    Ok(finding)
}
