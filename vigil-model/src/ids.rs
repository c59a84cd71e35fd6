use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::{ModelError, Result};

const MAX_GROUP_LEN: usize = 39;
const EXECUTION_PREFIX: &str = "compliance-scan-";

static GROUP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9]|-[A-Za-z0-9])*$")
        .expect("target group pattern is valid")
});

/// Validated identifier of the collection being audited (an organization).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct TargetGroupId(String);

impl TargetGroupId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidTargetGroup(
                "identifier is empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_GROUP_LEN {
            return Err(ModelError::InvalidTargetGroup(format!(
                "identifier exceeds {MAX_GROUP_LEN} characters"
            )));
        }
        if !GROUP_PATTERN.is_match(trimmed) {
            return Err(ModelError::InvalidTargetGroup(format!(
                "'{trimmed}' may only contain alphanumerics and single inner hyphens"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic execution key; one live execution per group.
    pub fn execution_id(&self) -> ExecutionId {
        ExecutionId(format!(
            "{EXECUTION_PREFIX}{}",
            self.0.to_ascii_lowercase()
        ))
    }
}

impl TryFrom<String> for TargetGroupId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TargetGroupId> for String {
    fn from(value: TargetGroupId) -> Self {
        value.0
    }
}

impl fmt::Display for TargetGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single audited target (a repository name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TargetId(String);

impl TargetId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle key of a scan execution, derived from its target group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
