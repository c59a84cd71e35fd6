use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::TargetId;

/// Security controls tracked for every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SecurityControl {
    SecretScanning,
    DependabotAlerts,
    CodeScanning,
}

impl SecurityControl {
    pub const ALL: [SecurityControl; 3] = [
        SecurityControl::SecretScanning,
        SecurityControl::DependabotAlerts,
        SecurityControl::CodeScanning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityControl::SecretScanning => "secret_scanning",
            SecurityControl::DependabotAlerts => "dependabot_alerts",
            SecurityControl::CodeScanning => "code_scanning",
        }
    }
}

impl fmt::Display for SecurityControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of one control on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ControlStatus {
    Enabled,
    Disabled,
    NotConfigured,
    NoAccess,
    #[default]
    Unknown,
    Error,
}

/// Result of checking a single target. Append-only once produced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FindingRecord {
    pub target_id: TargetId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub controls: BTreeMap<SecurityControl, ControlStatus>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl FindingRecord {
    /// Every control starts out `unknown`.
    pub fn new(target_id: impl Into<TargetId>, completed_at: DateTime<Utc>) -> Self {
        let controls = SecurityControl::ALL
            .iter()
            .map(|control| (*control, ControlStatus::Unknown))
            .collect();
        Self {
            target_id: target_id.into(),
            controls,
            error: None,
            completed_at,
        }
    }

    /// Finding recorded for a target whose check could not complete.
    pub fn failed(
        target_id: impl Into<TargetId>,
        message: impl Into<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let controls = SecurityControl::ALL
            .iter()
            .map(|control| (*control, ControlStatus::Error))
            .collect();
        Self {
            target_id: target_id.into(),
            controls,
            error: Some(message.into()),
            completed_at,
        }
    }

    pub fn with_status(
        mut self,
        control: SecurityControl,
        status: ControlStatus,
    ) -> Self {
        self.controls.insert(control, status);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Missing controls read as `unknown`.
    pub fn status(&self, control: SecurityControl) -> ControlStatus {
        self.controls.get(&control).copied().unwrap_or_default()
    }

    pub fn is_fully_compliant(&self) -> bool {
        SecurityControl::ALL
            .iter()
            .all(|control| self.status(*control) == ControlStatus::Enabled)
    }

    /// Only a check that could not complete is errored. A single control
    /// reporting `error` still leaves a readable, non-compliant finding.
    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }
}
