use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::finding::SecurityControl;
use crate::ids::{TargetGroupId, TargetId};

const NOT_APPLICABLE: &str = "N/A";

/// Share of fully compliant targets, or an explicit marker for empty groups.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "RateRepr", into = "RateRepr")
)]
pub enum ComplianceRate {
    Percent(f64),
    NotApplicable,
}

impl ComplianceRate {
    pub fn from_counts(compliant: usize, total: usize) -> Self {
        if total == 0 {
            ComplianceRate::NotApplicable
        } else {
            ComplianceRate::Percent(compliant as f64 / total as f64 * 100.0)
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self {
            ComplianceRate::Percent(value) => Some(*value),
            ComplianceRate::NotApplicable => None,
        }
    }
}

impl fmt::Display for ComplianceRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceRate::Percent(value) => write!(f, "{value:.1}%"),
            ComplianceRate::NotApplicable => f.write_str(NOT_APPLICABLE),
        }
    }
}

impl FromStr for ComplianceRate {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed == NOT_APPLICABLE {
            return Ok(ComplianceRate::NotApplicable);
        }
        trimmed
            .strip_suffix('%')
            .and_then(|number| number.trim().parse::<f64>().ok())
            .filter(|value| (0.0..=100.0).contains(value))
            .map(ComplianceRate::Percent)
            .ok_or_else(|| ModelError::InvalidComplianceRate(raw.to_string()))
    }
}

/// Wire form: the full-precision percentage as a number, `"N/A"` for empty
/// groups. Text such as `"50.0%"` is still accepted on input.
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
enum RateRepr {
    Percent(f64),
    Text(String),
}

#[cfg(feature = "serde")]
impl TryFrom<RateRepr> for ComplianceRate {
    type Error = ModelError;

    fn try_from(value: RateRepr) -> Result<Self> {
        match value {
            RateRepr::Percent(value) if (0.0..=100.0).contains(&value) => {
                Ok(ComplianceRate::Percent(value))
            }
            RateRepr::Percent(value) => {
                Err(ModelError::InvalidComplianceRate(value.to_string()))
            }
            RateRepr::Text(text) => text.parse(),
        }
    }
}

#[cfg(feature = "serde")]
impl From<ComplianceRate> for RateRepr {
    fn from(value: ComplianceRate) -> Self {
        match value {
            ComplianceRate::Percent(value) => RateRepr::Percent(value),
            ComplianceRate::NotApplicable => {
                RateRepr::Text(NOT_APPLICABLE.to_string())
            }
        }
    }
}

/// Attached to reports of runs that stopped on a cancellation signal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CancellationSummary {
    pub reason: String,
    pub scanned_before_cancel: usize,
}

/// Compliance summary of one execution. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Report {
    pub target_group: TargetGroupId,
    pub total: usize,
    pub fully_compliant: usize,
    pub compliance_rate: ComplianceRate,
    pub controls_enabled: BTreeMap<SecurityControl, usize>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub errors: usize,
    pub non_compliant: Vec<TargetId>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub cancellation: Option<CancellationSummary>,
}

impl Report {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }

    pub fn enabled_count(&self, control: SecurityControl) -> usize {
        self.controls_enabled.get(&control).copied().unwrap_or(0)
    }
}
