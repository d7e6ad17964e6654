// Posture data models

pub mod audit;
pub mod audit_result;
pub mod baseline;
pub mod finding;
pub mod remediation;
pub mod report;
pub mod scope;
pub mod snapshot;
pub mod value;

// Re-exports for convenience
pub use audit::{AuditEvent, AuditEventType};
pub use audit_result::{ScopeFailure, SiteAuditResult};
pub use baseline::{Baseline, BaselineEntry, CompareMode};
pub use finding::{ComplianceFinding, RiskLevel};
pub use remediation::{
    ActionRecord, ActionStatus, ExecutionResult, RemediationAction, RemediationMode,
    RemediationTransaction, TransactionOutcome, TransactionState,
};
pub use report::{ComplianceReport, ReportMetadata, ReportSummary};
pub use scope::{Scope, ScopeKind};
pub use snapshot::SettingSnapshot;
pub use value::{SettingValue, ValueType};
