use std::collections::BTreeMap;

use vigil_model::{
    CancellationSummary, ComplianceRate, ControlStatus, FindingRecord, Report,
    SecurityControl, TargetGroupId,
};

/// Aggregates findings into a compliance report.
///
/// Errored findings count toward `total` and `errors` but are excluded from
/// both the compliant tally and the non-compliant list.
pub fn generate(
    target_group: &TargetGroupId,
    findings: &[FindingRecord],
    cancellation: Option<CancellationSummary>,
) -> Report {
    let total = findings.len();
    let mut fully_compliant = 0;
    let mut errors = 0;
    let mut non_compliant = Vec::new();
    let mut controls_enabled: BTreeMap<SecurityControl, usize> = SecurityControl::ALL
        .iter()
        .map(|control| (*control, 0))
        .collect();

    for finding in findings {
        for control in SecurityControl::ALL {
            if finding.status(control) == ControlStatus::Enabled {
                *controls_enabled.entry(control).or_default() += 1;
            }
        }

        if finding.is_errored() {
            errors += 1;
        } else if finding.is_fully_compliant() {
            fully_compliant += 1;
        } else {
            non_compliant.push(finding.target_id.clone());
        }
    }

    Report {
        target_group: target_group.clone(),
        total,
        fully_compliant,
        compliance_rate: ComplianceRate::from_counts(fully_compliant, total),
        controls_enabled,
        errors,
        non_compliant,
        cancellation,
    }
}
