//! Compliance evaluation
//!
//! Pure functions of (snapshot, baseline, matrix). No I/O, no clocks, no
//! randomness: identical inputs always give identical findings and score.

use std::sync::Arc;

use crate::models::{
    Baseline, BaselineEntry, CompareMode, ComplianceFinding, SettingSnapshot, SettingValue,
};
use crate::risk::RiskMatrix;

/// Findings and score for one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub findings: Vec<ComplianceFinding>,
    pub score: u8,
}

/// Holds the shared risk matrix so workers can evaluate without passing it around
#[derive(Debug, Clone)]
pub struct ComplianceEvaluator {
    matrix: Arc<RiskMatrix>,
}

impl ComplianceEvaluator {
    pub fn new(matrix: Arc<RiskMatrix>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &RiskMatrix {
        &self.matrix
    }

    pub fn evaluate(&self, snapshot: &SettingSnapshot, baseline: &Baseline) -> Evaluation {
        let findings = evaluate(snapshot, baseline, &self.matrix);
        let score = compliance_score(&findings);
        Evaluation { findings, score }
    }
}

/// One finding per baseline entry for the snapshot's scope kind, in declaration order
pub fn evaluate(
    snapshot: &SettingSnapshot,
    baseline: &Baseline,
    matrix: &RiskMatrix,
) -> Vec<ComplianceFinding> {
    baseline
        .entries_for(snapshot.scope.kind)
        .map(|entry| evaluate_entry(snapshot, entry, matrix))
        .collect()
}

fn evaluate_entry(
    snapshot: &SettingSnapshot,
    entry: &BaselineEntry,
    matrix: &RiskMatrix,
) -> ComplianceFinding {
    let current = snapshot.get(&entry.key);

    match current {
        Some(value) if compare(entry.compare_mode, value, &entry.expected) => ComplianceFinding::compliant(
            snapshot.scope.clone(),
            entry.key.clone(),
            value.clone(),
            entry.expected.clone(),
            entry.compare_mode,
            entry.risk_weight,
        ),
        _ => ComplianceFinding::non_compliant(
            snapshot.scope.clone(),
            entry.key.clone(),
            current.cloned(),
            entry.expected.clone(),
            entry.compare_mode,
            entry.risk_weight,
            matrix.classify(&entry.key, current),
        ),
    }
}

/// Strict on variant: an enum never equals a string with the same text
pub fn compare(mode: CompareMode, current: &SettingValue, expected: &SettingValue) -> bool {
    match mode {
        CompareMode::Equals => current == expected,
        CompareMode::MaxBound => match (current, expected) {
            (SettingValue::Int(current), SettingValue::Int(limit)) => current <= limit,
            _ => false,
        },
    }
}

/// 100 × compliant weight / total weight, rounded.
///
/// Exactly 100 only when every finding is compliant; rounding never lifts a
/// partially compliant scope to 100. A scope with no applicable settings
/// scores 100.
pub fn compliance_score(findings: &[ComplianceFinding]) -> u8 {
    let total: f64 = findings.iter().map(|f| f.risk_weight).sum();
    if findings.is_empty() || total <= 0.0 {
        return 100;
    }

    let compliant: f64 = findings
        .iter()
        .filter(|f| f.compliant)
        .map(|f| f.risk_weight)
        .sum();

    let score = (compliant / total * 100.0).round().clamp(0.0, 100.0) as u8;
    if score == 100 && findings.iter().any(|f| !f.compliant) {
        99
    } else {
        score
    }
}
