use serde::{Deserialize, Serialize};

use super::finding::{ComplianceFinding, RiskLevel};
use super::scope::Scope;

/// Why a scope produced no findings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFailure {
    Unreachable,
    PermissionDenied,
    InvalidScope,
    DeadlineExceeded,
    Internal,
}

impl ScopeFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeFailure::Unreachable => "unreachable",
            ScopeFailure::PermissionDenied => "permission_denied",
            ScopeFailure::InvalidScope => "invalid_scope",
            ScopeFailure::DeadlineExceeded => "deadline_exceeded",
            ScopeFailure::Internal => "internal",
        }
    }
}

/// All findings for one scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteAuditResult {
    pub scope: Scope,
    pub findings: Vec<ComplianceFinding>,
    /// 0-100; absent for unreachable scopes so they never enter an aggregate
    pub compliance_score: Option<u8>,
    pub reachable: bool,
    pub failure: Option<ScopeFailure>,
    pub error: Option<String>,
}

impl SiteAuditResult {
    pub fn reachable(scope: Scope, findings: Vec<ComplianceFinding>, compliance_score: u8) -> Self {
        Self {
            scope,
            findings,
            compliance_score: Some(compliance_score),
            reachable: true,
            failure: None,
            error: None,
        }
    }

    pub fn unreachable(scope: Scope, failure: ScopeFailure, error: impl Into<String>) -> Self {
        Self {
            scope,
            findings: Vec::new(),
            compliance_score: None,
            reachable: false,
            failure: Some(failure),
            error: Some(error.into()),
        }
    }

    pub fn non_compliant(&self) -> impl Iterator<Item = &ComplianceFinding> {
        self.findings.iter().filter(|f| !f.compliant)
    }

    pub fn is_fully_compliant(&self) -> bool {
        self.reachable && self.findings.iter().all(|f| f.compliant)
    }

    /// Highest risk among this scope's findings
    pub fn max_risk(&self) -> RiskLevel {
        self.findings
            .iter()
            .map(|f| f.risk_level)
            .max()
            .unwrap_or(RiskLevel::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_has_no_findings_or_score() {
        let result = SiteAuditResult::unreachable(
            Scope::site("https://contoso.sharepoint.com/sites/gone"),
            ScopeFailure::Unreachable,
            "connection refused",
        );
        assert!(!result.reachable);
        assert!(result.findings.is_empty());
        assert!(result.compliance_score.is_none());
        assert!(!result.is_fully_compliant());
        assert_eq!(result.max_risk(), RiskLevel::None);
    }

    #[test]
    fn test_failure_names() {
        assert_eq!(ScopeFailure::PermissionDenied.as_str(), "permission_denied");
        assert_eq!(
            serde_json::to_string(&ScopeFailure::DeadlineExceeded).unwrap(),
            "\"deadline_exceeded\""
        );
    }
}
