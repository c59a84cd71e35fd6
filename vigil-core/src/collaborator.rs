//! Ports to the external service being audited.
//!
//! The orchestrator never talks to the network itself; it drives a
//! [`TargetFetcher`] once per execution and a [`TargetChecker`] once per
//! target. Both report failures as [`CollaboratorError`], and every error
//! instance carries its own retry classification.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use vigil_model::{Credential, FindingRecord, TargetGroupId, TargetRecord};

use crate::heartbeat::Heartbeat;
use crate::retry::ErrorClass;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Target group not found: {0}")]
    GroupNotFound(String),

    #[error("Credential rejected by the remote service")]
    InvalidCredential,

    #[error("Rate limited by the remote service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No heartbeat for {0:?}; operation considered stalled")]
    Stalled(Duration),

    #[error("{message}")]
    Other { message: String, retryable: bool },
}

impl CollaboratorError {
    pub fn other(message: impl Into<String>, retryable: bool) -> Self {
        CollaboratorError::Other {
            message: message.into(),
            retryable,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CollaboratorError::GroupNotFound(_)
            | CollaboratorError::InvalidCredential => ErrorClass::Terminal,
            CollaboratorError::RateLimited { .. }
            | CollaboratorError::Timeout(_)
            | CollaboratorError::Connection(_)
            | CollaboratorError::Stalled(_) => ErrorClass::Transient,
            CollaboratorError::Other { retryable, .. } => {
                if *retryable {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Terminal
                }
            }
        }
    }
}

/// Lists the targets of a group, in the order they should be batched.
///
/// Implementations paginate internally and must call [`Heartbeat::beat`] at
/// least once per heartbeat window while working.
#[async_trait]
pub trait TargetFetcher: Send + Sync {
    async fn fetch(
        &self,
        target_group: &TargetGroupId,
        credential: Option<&Credential>,
        heartbeat: &Heartbeat,
    ) -> Result<Vec<TargetRecord>, CollaboratorError>;
}

/// Evaluates the security controls of a single target.
#[async_trait]
pub trait TargetChecker: Send + Sync {
    async fn check(
        &self,
        target_group: &TargetGroupId,
        target: &TargetRecord,
        credential: Option<&Credential>,
    ) -> Result<FindingRecord, CollaboratorError>;
}
