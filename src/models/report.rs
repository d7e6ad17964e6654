use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::audit_result::SiteAuditResult;
use super::finding::RiskLevel;
use super::remediation::{ExecutionResult, RemediationMode, TransactionOutcome};
use crate::drift::DriftReport;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub run_id: Uuid,
    pub baseline: String,
    pub baseline_version: String,
    pub mode: RemediationMode,
    pub generated_at: String,
}

/// Aggregated output of one run, handed to external reporting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub metadata: ReportMetadata,
    pub tenant_result: Option<SiteAuditResult>,
    /// Sorted by scope id
    pub site_results: Vec<SiteAuditResult>,
    /// Present only when remediation ran; tenant first, then sites by scope id
    pub remediation: Vec<ExecutionResult>,
    pub drift: Vec<DriftReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub scopes: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub findings: usize,
    pub non_compliant: usize,
    pub by_risk: BTreeMap<String, usize>,
    /// Mean of reachable scope scores; `None` when nothing was reachable
    pub aggregate_score: Option<u8>,
    pub outcomes: BTreeMap<String, usize>,
}

impl ComplianceReport {
    pub fn all_results(&self) -> impl Iterator<Item = &SiteAuditResult> {
        self.tenant_result.iter().chain(self.site_results.iter())
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        let mut score_total: u32 = 0;

        for result in self.all_results() {
            summary.scopes += 1;

            if !result.reachable {
                summary.unreachable += 1;
                continue;
            }

            summary.reachable += 1;
            score_total += u32::from(result.compliance_score.unwrap_or(0));

            for finding in &result.findings {
                summary.findings += 1;
                if !finding.compliant {
                    summary.non_compliant += 1;
                    *summary
                        .by_risk
                        .entry(finding.risk_level.as_str().to_string())
                        .or_insert(0) += 1;
                }
            }
        }

        if summary.reachable > 0 {
            let mean = f64::from(score_total) / summary.reachable as f64;
            summary.aggregate_score = Some(mean.round() as u8);
        }

        for result in &self.remediation {
            *summary
                .outcomes
                .entry(result.outcome.as_str().to_string())
                .or_insert(0) += 1;
        }

        summary
    }

    pub fn is_fully_compliant(&self) -> bool {
        self.all_results().all(|r| r.is_fully_compliant())
    }

    pub fn has_failed_remediation(&self) -> bool {
        self.remediation.iter().any(|r| {
            matches!(
                r.outcome,
                TransactionOutcome::RolledBack | TransactionOutcome::RollbackIncomplete
            )
        })
    }

    pub fn count_at_risk(&self, level: RiskLevel) -> usize {
        self.all_results()
            .flat_map(|r| r.findings.iter())
            .filter(|f| f.risk_level == level)
            .count()
    }
}
