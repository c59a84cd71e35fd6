use std::fmt::{self, Display};

use crate::progress::ScanStatus;

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidTargetGroup(String),
    InvalidCredential(&'static str),
    InvalidBatchSize { requested: usize, max: usize },
    InvalidTransition { from: ScanStatus, to: ScanStatus },
    InvalidComplianceRate(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidTargetGroup(msg) => {
                write!(f, "invalid target group: {msg}")
            }
            ModelError::InvalidCredential(msg) => {
                write!(f, "invalid credential: {msg}")
            }
            ModelError::InvalidBatchSize { requested, max } => write!(
                f,
                "batch size must be between 1 and {max}, got {requested}"
            ),
            ModelError::InvalidTransition { from, to } => {
                write!(f, "illegal status transition {from} -> {to}")
            }
            ModelError::InvalidComplianceRate(raw) => {
                write!(f, "invalid compliance rate: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
