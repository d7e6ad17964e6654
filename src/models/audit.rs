use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    #[serde(rename = "run_started")]
    RunStarted,
    #[serde(rename = "scope_audited")]
    ScopeAudited,
    #[serde(rename = "scope_unreachable")]
    ScopeUnreachable,
    #[serde(rename = "transaction_started")]
    TransactionStarted,
    #[serde(rename = "action_applied")]
    ActionApplied,
    #[serde(rename = "action_failed")]
    ActionFailed,
    #[serde(rename = "transaction_committed")]
    TransactionCommitted,
    #[serde(rename = "transaction_rolled_back")]
    TransactionRolledBack,
    #[serde(rename = "rollback_incomplete")]
    RollbackIncomplete,
    #[serde(rename = "run_completed")]
    RunCompleted,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RunStarted => "run_started",
            AuditEventType::ScopeAudited => "scope_audited",
            AuditEventType::ScopeUnreachable => "scope_unreachable",
            AuditEventType::TransactionStarted => "transaction_started",
            AuditEventType::ActionApplied => "action_applied",
            AuditEventType::ActionFailed => "action_failed",
            AuditEventType::TransactionCommitted => "transaction_committed",
            AuditEventType::TransactionRolledBack => "transaction_rolled_back",
            AuditEventType::RollbackIncomplete => "rollback_incomplete",
            AuditEventType::RunCompleted => "run_completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "run_started" => Some(AuditEventType::RunStarted),
            "scope_audited" => Some(AuditEventType::ScopeAudited),
            "scope_unreachable" => Some(AuditEventType::ScopeUnreachable),
            "transaction_started" => Some(AuditEventType::TransactionStarted),
            "action_applied" => Some(AuditEventType::ActionApplied),
            "action_failed" => Some(AuditEventType::ActionFailed),
            "transaction_committed" => Some(AuditEventType::TransactionCommitted),
            "transaction_rolled_back" => Some(AuditEventType::TransactionRolledBack),
            "rollback_incomplete" => Some(AuditEventType::RollbackIncomplete),
            "run_completed" => Some(AuditEventType::RunCompleted),
            _ => None,
        }
    }
}

/// Represents an audit trail event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub id: i64,
    pub run_id: Option<String>,
    pub event_type: String,
    pub scope_id: Option<String>,
    pub transaction_id: Option<String>,
    pub description: String,
    pub metadata: Option<String>,
    pub created_at: String,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, description: String) -> Self {
        Self {
            id: 0,
            run_id: None,
            event_type: event_type.as_str().to_string(),
            scope_id: None,
            transaction_id: None,
            description,
            metadata: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn get_event_type(&self) -> Option<AuditEventType> {
        AuditEventType::from_str(&self.event_type)
    }

    pub fn with_run_id(mut self, run_id: impl ToString) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn with_scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl ToString) -> Self {
        self.transaction_id = Some(transaction_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata.to_string());
        self
    }

    pub fn get_metadata(&self) -> Option<Value> {
        self.metadata
            .as_ref()
            .and_then(|m| serde_json::from_str(m).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_type_round_trip() {
        for event_type in [
            AuditEventType::RunStarted,
            AuditEventType::ScopeAudited,
            AuditEventType::ScopeUnreachable,
            AuditEventType::TransactionStarted,
            AuditEventType::ActionApplied,
            AuditEventType::ActionFailed,
            AuditEventType::TransactionCommitted,
            AuditEventType::TransactionRolledBack,
            AuditEventType::RollbackIncomplete,
            AuditEventType::RunCompleted,
        ] {
            assert_eq!(AuditEventType::from_str(event_type.as_str()), Some(event_type));
        }
        assert_eq!(AuditEventType::from_str("invalid"), None);
    }

    #[test]
    fn test_audit_event_creation() {
        let event = AuditEvent::new(AuditEventType::RunStarted, "Audit started".to_string());
        assert_eq!(event.event_type, "run_started");
        assert_eq!(event.description, "Audit started");
        assert_eq!(event.scope_id, None);
        assert_eq!(event.transaction_id, None);
        assert_eq!(event.get_event_type(), Some(AuditEventType::RunStarted));
    }

    #[test]
    fn test_audit_event_with_ids() {
        let tx = uuid::Uuid::new_v4();
        let event = AuditEvent::new(AuditEventType::ActionApplied, "Applied".to_string())
            .with_run_id("run-1")
            .with_scope_id("https://contoso.sharepoint.com/sites/hr")
            .with_transaction_id(tx);

        assert_eq!(event.run_id.as_deref(), Some("run-1"));
        assert_eq!(
            event.scope_id.as_deref(),
            Some("https://contoso.sharepoint.com/sites/hr")
        );
        assert_eq!(event.transaction_id, Some(tx.to_string()));
    }

    #[test]
    fn test_audit_event_with_metadata() {
        let metadata = serde_json::json!({
            "key": "sharingCapability",
            "attempts": 2
        });

        let event = AuditEvent::new(AuditEventType::ActionFailed, "Apply failed".to_string())
            .with_metadata(metadata.clone());

        assert_eq!(event.get_metadata(), Some(metadata));
    }

    #[test]
    fn test_audit_event_serde() {
        let event = AuditEvent::new(AuditEventType::ScopeAudited, "Audited".to_string())
            .with_scope_id("contoso");
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }
}
