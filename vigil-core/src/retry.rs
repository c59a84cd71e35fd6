use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collaborator::CollaboratorError;

/// Retry classification of a single error instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input or a permanent refusal. Never retried.
    Terminal,
    /// Timeouts, rate limits, dropped connections, stalled heartbeats.
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Exponential backoff with a ceiling on both attempts and delay.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub max_interval_ms: u64,
}

impl RetryPolicy {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// Delay before the attempt that follows failed attempt `attempt`
    /// (1-based): `min(initial * coefficient^(attempt - 1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_interval_ms as f64
            * self.backoff_coefficient.powi(exponent);
        let capped = raw.min(self.max_interval_ms as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn decide(&self, class: ErrorClass, attempt: u32) -> RetryDecision {
        match class {
            ErrorClass::Terminal => RetryDecision::GiveUp,
            ErrorClass::Transient if attempt >= self.max_attempts => {
                RetryDecision::GiveUp
            }
            ErrorClass::Transient => {
                RetryDecision::RetryAfter(self.delay_for_attempt(attempt))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval_ms: 2_000,
            backoff_coefficient: 2.0,
            max_interval_ms: 60_000,
        }
    }
}

/// Per-operation execution options.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct OperationConfig {
    /// Upper bound on a single attempt.
    pub start_to_close_ms: u64,
    /// Maximum silence between heartbeats, for operations that beat.
    #[serde(default)]
    pub heartbeat_timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl OperationConfig {
    pub fn fetch_defaults() -> Self {
        Self {
            start_to_close_ms: 120_000,
            heartbeat_timeout_ms: Some(30_000),
            retry: RetryPolicy::default(),
        }
    }

    pub fn check_defaults() -> Self {
        Self {
            start_to_close_ms: 60_000,
            heartbeat_timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn start_to_close(&self) -> Duration {
        Duration::from_millis(self.start_to_close_ms)
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout_ms.map(Duration::from_millis)
    }
}

/// Final error of an operation that ran out of attempts or hit a terminal
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub error: CollaboratorError,
}

/// Drives `attempt` until it succeeds, fails terminally, or exhausts the
/// policy. Each attempt is bounded by the operation's start-to-close window;
/// an elapsed window counts as a transient timeout.
pub async fn execute_with_retry<T, F, Fut>(
    operation: &str,
    options: &OperationConfig,
    mut attempt: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let window = options.start_to_close();
    let mut number = 1;
    loop {
        let outcome = match tokio::time::timeout(window, attempt(number)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CollaboratorError::Timeout(window)),
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match options.retry.decide(error.class(), number) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    operation,
                    attempt = number,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                number += 1;
            }
            RetryDecision::GiveUp => {
                tracing::debug!(
                    operation,
                    attempt = number,
                    error = %error,
                    class = ?error.class(),
                    "giving up"
                );
                return Err(RetryExhausted {
                    attempts: number,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_backoff_doubles_until_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=7)
            .map(|attempt| policy.delay_for_attempt(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn terminal_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(ErrorClass::Terminal, 1), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(ErrorClass::Transient, 1),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(policy.decide(ErrorClass::Transient, 5), RetryDecision::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();
        let result = execute_with_retry(
            "check",
            &OperationConfig::check_defaults(),
            |attempt| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(CollaboratorError::Connection("reset".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after the first failure, 4s after the second.
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_transient_failures_report_attempts() {
        let result: Result<(), _> = execute_with_retry(
            "check",
            &OperationConfig::check_defaults(),
            |_| async { Err(CollaboratorError::RateLimited { retry_after: None }) },
        )
        .await;
        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 5);
        assert_eq!(
            exhausted.error,
            CollaboratorError::RateLimited { retry_after: None }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_stops_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = execute_with_retry(
            "fetch",
            &OperationConfig::fetch_defaults(),
            |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(CollaboratorError::InvalidCredential)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_retry() {
        let options = OperationConfig {
            start_to_close_ms: 1_000,
            heartbeat_timeout_ms: None,
            retry: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
        };
        let result = execute_with_retry("check", &options, |attempt| async move {
            if attempt == 1 {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            Ok::<_, CollaboratorError>(attempt)
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn operation_tables_parse_with_partial_retry() {
        let parsed: OperationConfig = serde_json::from_str(
            r#"{"start_to_close_ms": 5000, "retry": {"max_attempts": 2}}"#,
        )
        .unwrap();
        assert_eq!(parsed.heartbeat_timeout_ms, None);
        assert_eq!(parsed.retry.max_attempts, 2);
        assert_eq!(parsed.retry.initial_interval_ms, 2_000);
    }
}
