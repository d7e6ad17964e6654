//! Audit event utility functions
//!
//! Provides helper functions for creating audit events across the audit and
//! remediation pipelines

use uuid::Uuid;

use crate::models::{AuditEvent, AuditEventType, Scope};

/// Helper function to create audit events
///
/// Creates an AuditEvent with the given correlation ids and current timestamp.
/// Ids that are `None` are left unset so the event can be recorded before a
/// run or transaction exists.
///
/// # Arguments
/// * `event_type` - Type of audit event
/// * `run_id` - Run the event belongs to
/// * `scope` - Tenant or site the event concerns
/// * `transaction_id` - Remediation transaction the event belongs to
/// * `description` - Human-readable description of the event
pub fn create_audit_event(
    event_type: AuditEventType,
    run_id: Option<&str>,
    scope: Option<&Scope>,
    transaction_id: Option<Uuid>,
    description: &str,
) -> AuditEvent {
    let mut event = AuditEvent::new(event_type, description.to_string());
    if let Some(run_id) = run_id {
        event = event.with_run_id(run_id);
    }
    if let Some(scope) = scope {
        event = event.with_scope_id(scope.id.clone());
    }
    if let Some(transaction_id) = transaction_id {
        event = event.with_transaction_id(transaction_id);
    }
    event
}
