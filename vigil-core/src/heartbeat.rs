use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::collaborator::CollaboratorError;

/// Liveness signal handed to long-running collaborator calls.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    tx: Arc<watch::Sender<u64>>,
}

impl Heartbeat {
    pub fn channel() -> (Heartbeat, HeartbeatMonitor) {
        let (tx, rx) = watch::channel(0);
        (Heartbeat { tx: Arc::new(tx) }, HeartbeatMonitor { rx })
    }

    /// A heartbeat nobody watches.
    pub fn detached() -> Heartbeat {
        Self::channel().0
    }

    pub fn beat(&self) {
        self.tx.send_modify(|count| *count += 1);
    }

    pub fn count(&self) -> u64 {
        *self.tx.borrow()
    }
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    rx: watch::Receiver<u64>,
}

impl HeartbeatMonitor {
    /// Resolves once no beat has been seen for `limit`. Never resolves after
    /// every [`Heartbeat`] handle is gone, since the operation is over.
    pub async fn stalled(mut self, limit: Duration) -> Duration {
        loop {
            match tokio::time::timeout(limit, self.rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return std::future::pending::<Duration>().await,
                Err(_) => return limit,
            }
        }
    }
}

/// Runs one attempt of a heartbeating operation. Without a limit the beats
/// are simply ignored.
pub async fn supervise<T, F, Fut>(
    limit: Option<Duration>,
    operation: F,
) -> Result<T, CollaboratorError>
where
    F: FnOnce(Heartbeat) -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let (heartbeat, monitor) = Heartbeat::channel();
    let work = operation(heartbeat);
    match limit {
        None => work.await,
        Some(limit) => {
            tokio::select! {
                result = work => result,
                silent = monitor.stalled(limit) => {
                    tracing::warn!(
                        silent_for = ?silent,
                        "operation stopped heartbeating"
                    );
                    Err(CollaboratorError::Stalled(silent))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn steady_beats_keep_operation_alive() {
        let result = supervise(Some(Duration::from_secs(30)), |hb| async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_secs(20)).await;
                hb.beat();
            }
            Ok::<_, CollaboratorError>(hb.count())
        })
        .await;
        assert_eq!(result, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_past_the_limit_is_a_stall() {
        let result = supervise(Some(Duration::from_secs(30)), |hb| async move {
            hb.beat();
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok::<_, CollaboratorError>(())
        })
        .await;
        assert_eq!(
            result,
            Err(CollaboratorError::Stalled(Duration::from_secs(30)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsupervised_operations_may_stay_quiet() {
        let result = supervise(None, |_hb| async move {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<_, CollaboratorError>("done")
        })
        .await;
        assert_eq!(result, Ok("done"));
    }
}
