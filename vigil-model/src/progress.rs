use std::fmt;

use crate::error::{ModelError, Result};
use crate::finding::FindingRecord;
use crate::ids::TargetGroupId;

/// Lifecycle of a scan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanStatus {
    Starting,
    Fetching,
    Scanning,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Cancelled | ScanStatus::Failed
        )
    }

    /// Forward-only edges of the execution state machine. `Failed` can be
    /// entered from any live state.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        use ScanStatus::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Starting, Fetching)
            | (Fetching, Scanning)
            | (Scanning, Cancelling)
            | (Scanning, Completed)
            | (Cancelling, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Starting => "starting",
            ScanStatus::Fetching => "fetching",
            ScanStatus::Scanning => "scanning",
            ScanStatus::Cancelling => "cancelling",
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live counters of one execution, served to progress queries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanProgress {
    pub target_group: TargetGroupId,
    pub total: usize,
    pub scanned: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub errors: usize,
    pub status: ScanStatus,
    #[cfg_attr(feature = "serde", serde(default))]
    pub batch_size: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    pub cancel_requested: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub paused: bool,
}

impl ScanProgress {
    pub fn new(target_group: TargetGroupId, batch_size: usize) -> Self {
        Self {
            target_group,
            total: 0,
            scanned: 0,
            compliant: 0,
            non_compliant: 0,
            errors: 0,
            status: ScanStatus::Starting,
            batch_size,
            cancel_requested: false,
            paused: false,
        }
    }

    pub fn advance(&mut self, next: ScanStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Number of targets with a recorded outcome, successful or not.
    pub fn processed(&self) -> usize {
        self.scanned + self.errors
    }

    /// Folds one completed batch into the counters. Errored findings count
    /// against `errors` only, never against `scanned`.
    pub fn record_batch(&mut self, findings: &[FindingRecord]) {
        for finding in findings {
            if finding.is_errored() {
                self.errors += 1;
            } else {
                self.scanned += 1;
                if finding.is_fully_compliant() {
                    self.compliant += 1;
                } else {
                    self.non_compliant += 1;
                }
            }
        }
        debug_assert!(
            self.processed() <= self.total,
            "processed {} exceeds total {}",
            self.processed(),
            self.total
        );
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let raw = self.scanned as f64 / self.total as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{ControlStatus, SecurityControl};
    use chrono::Utc;

    fn progress() -> ScanProgress {
        ScanProgress::new(TargetGroupId::parse("acme").unwrap(), 10)
    }

    #[test]
    fn happy_path_transitions_are_forward_only() {
        let mut p = progress();
        p.advance(ScanStatus::Fetching).unwrap();
        p.advance(ScanStatus::Scanning).unwrap();
        assert!(p.advance(ScanStatus::Fetching).is_err());
        p.advance(ScanStatus::Completed).unwrap();
        assert!(p.advance(ScanStatus::Failed).is_err(), "terminal stays terminal");
    }

    #[test]
    fn cancellation_passes_through_cancelling() {
        let mut p = progress();
        p.advance(ScanStatus::Fetching).unwrap();
        p.advance(ScanStatus::Scanning).unwrap();
        assert!(p.advance(ScanStatus::Cancelled).is_err());
        p.advance(ScanStatus::Cancelling).unwrap();
        assert!(p.advance(ScanStatus::Completed).is_err());
        p.advance(ScanStatus::Cancelled).unwrap();
    }

    #[test]
    fn failed_is_reachable_from_any_live_state() {
        for steps in [
            vec![],
            vec![ScanStatus::Fetching],
            vec![ScanStatus::Fetching, ScanStatus::Scanning],
            vec![ScanStatus::Fetching, ScanStatus::Scanning, ScanStatus::Cancelling],
        ] {
            let mut p = progress();
            for step in steps {
                p.advance(step).unwrap();
            }
            p.advance(ScanStatus::Failed).unwrap();
        }
    }

    #[test]
    fn batch_counters_split_errors_from_scanned() {
        let mut p = progress();
        p.total = 3;
        let now = Utc::now();
        let compliant = SecurityControl::ALL.iter().fold(
            FindingRecord::new("a", now),
            |f, c| f.with_status(*c, ControlStatus::Enabled),
        );
        let partial = FindingRecord::new("b", now);
        let errored = FindingRecord::failed("c", "boom", now);
        p.record_batch(&[compliant, partial, errored]);

        assert_eq!(p.scanned, 2);
        assert_eq!(p.compliant, 1);
        assert_eq!(p.non_compliant, 1);
        assert_eq!(p.errors, 1);
        assert!(p.processed() <= p.total);
        assert_eq!(p.percent_complete(), 66.7);
    }

    #[test]
    fn percent_complete_handles_empty_groups() {
        assert_eq!(progress().percent_complete(), 0.0);
    }
}
