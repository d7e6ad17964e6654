// Posture - security baseline compliance and remediation engine
// Module re-exports

pub mod baseline;
pub mod commands;
pub mod config;
pub mod db;
pub mod drift;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod orchestrator;
pub mod rate_limiter;
pub mod remediation;
pub mod retry;
pub mod risk;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use models::{
    Baseline, BaselineEntry, CompareMode, ComplianceFinding, ComplianceReport, ExecutionResult,
    RemediationAction, RemediationMode, RiskLevel, Scope, ScopeKind, SettingSnapshot,
    SettingValue, SiteAuditResult, TransactionOutcome, TransactionState,
};

pub use baseline::{BaselineBuilder, BaselineRegistry, BUILTIN_BASELINE};
pub use commands::{Engine, RunRequest};
pub use config::EngineConfig;
pub use db::{get_db_path, init_db, AuditStore};
pub use error::{ActionError, BaselineError, EngineError, SourceError};
pub use evaluator::ComplianceEvaluator;
pub use orchestrator::{AuditOrchestrator, ScopeLocks};
pub use remediation::{ConfirmAction, RemediationCoordinator, RemediationExecutor, RemediationPlanner};
pub use retry::RetryPolicy;
pub use risk::RiskMatrix;
pub use source::{InMemorySource, SettingSource, ThrottledSource};
