//! Entry points consumed from outside the library (the binary, embedding apps)
//!
//! Run Commands:
//! - Engine::run: audit a set of scopes, optionally remediate, produce a report
//!
//! Audit Commands:
//! - get_audit_events: Retrieve a run's audit trail with filters

pub mod audit;
pub mod run;

pub use audit::{get_audit_events, AuditFilters};
pub use run::{Engine, RunRequest};
