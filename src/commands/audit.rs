//! Audit trail commands
//!
//! Handles audit event retrieval and filtering for a finished run

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::AuditStore;
use crate::models::AuditEvent;

/// Audit event filter options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilters {
    pub event_type: Option<Vec<String>>,
    pub scope_id: Option<String>,
    pub transaction_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<usize>,
}

/// Get a run's audit events with optional filters
///
/// Returns: events in the order they were recorded
pub fn get_audit_events(store: &AuditStore, run_id: &str, filters: Option<AuditFilters>) -> Result<Vec<AuditEvent>> {
    let mut events = store
        .events_for_run(run_id)
        .context(format!("Failed to fetch audit events for run {}", run_id))?;

    let Some(f) = filters else {
        return Ok(events);
    };

    events.retain(|event| {
        if let Some(ref event_types) = f.event_type {
            if !event_types.contains(&event.event_type) {
                return false;
            }
        }

        if let Some(ref scope_id) = f.scope_id {
            if event.scope_id.as_ref() != Some(scope_id) {
                return false;
            }
        }

        if let Some(ref tx_id) = f.transaction_id {
            if event.transaction_id.as_ref() != Some(tx_id) {
                return false;
            }
        }

        // RFC 3339 timestamps compare lexically
        if let Some(ref start) = f.start_date {
            if event.created_at < *start {
                return false;
            }
        }

        if let Some(ref end) = f.end_date {
            if event.created_at > *end {
                return false;
            }
        }

        true
    });

    if let Some(limit) = f.limit {
        events.truncate(limit);
    }

    Ok(events)
}
