use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::retry::OperationConfig;

/// Knobs for one scan engine. Every field has a default so partial
/// configuration files stay valid.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Targets checked concurrently per batch.
    pub batch_size: usize,
    /// Upper bound accepted by runtime batch-size updates.
    pub max_batch_size: usize,
    /// Hard ceiling on a whole execution.
    pub execution_timeout_ms: u64,
    /// Fetch: long window, liveness enforced through heartbeats.
    pub fetch: OperationConfig,
    /// Per-target check: short fixed window.
    pub check: OperationConfig,
}

impl OrchestratorConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(ScanError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > self.max_batch_size {
            return Err(ScanError::InvalidConfig(format!(
                "batch_size must be between 1 and {}, got {}",
                self.max_batch_size, self.batch_size
            )));
        }
        if self.execution_timeout_ms == 0 {
            return Err(ScanError::InvalidConfig(
                "execution_timeout_ms must be positive".to_string(),
            ));
        }
        for (name, op) in [("fetch", &self.fetch), ("check", &self.check)] {
            if op.start_to_close_ms == 0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{name}.start_to_close_ms must be positive"
                )));
            }
            if op.heartbeat_timeout_ms == Some(0) {
                return Err(ScanError::InvalidConfig(format!(
                    "{name}.heartbeat_timeout_ms must be positive when set"
                )));
            }
            if op.retry.max_attempts == 0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{name}.retry.max_attempts must be at least 1"
                )));
            }
            let coefficient = op.retry.backoff_coefficient;
            if coefficient.is_nan() || coefficient < 1.0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{name}.retry.backoff_coefficient must be >= 1.0"
                )));
            }
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_batch_size: 50,
            execution_timeout_ms: 30 * 60 * 1_000,
            fetch: OperationConfig::fetch_defaults(),
            check: OperationConfig::check_defaults(),
        }
    }
}
