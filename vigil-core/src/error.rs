use std::time::Duration;

use thiserror::Error;
use vigil_model::{ExecutionId, ModelError};

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Validation error: {0}")]
    Validation(#[from] ModelError),

    #[error("Transient failure in {operation}: {message}")]
    Transient { operation: String, message: String },

    #[error("Check for {target} failed after {attempts} attempt(s): {message}")]
    PartialTask {
        target: String,
        attempts: u32,
        message: String,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Execution exceeded its {0:?} ceiling")]
    ExecutionTimeout(Duration),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Execution terminated: {0}")]
    Terminated(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("Signal rejected: {0}")]
    SignalRejected(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Step journal error: {0}")]
    Journal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
