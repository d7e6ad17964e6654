use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::RiskLevel;
use super::scope::Scope;
use super::value::SettingValue;

/// Policy for turning non-compliant findings into changes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RemediationMode {
    ReportOnly,
    Interactive,
    Automatic,
}

impl RemediationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationMode::ReportOnly => "report_only",
            RemediationMode::Interactive => "interactive",
            RemediationMode::Automatic => "automatic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "report_only" | "report-only" | "report" => Some(RemediationMode::ReportOnly),
            "interactive" => Some(RemediationMode::Interactive),
            "automatic" | "auto" => Some(RemediationMode::Automatic),
            _ => None,
        }
    }
}

/// A planned fix for one finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemediationAction {
    pub scope: Scope,
    pub setting_key: String,
    pub target_value: SettingValue,
    /// Value observed at plan time; `None` if the setting was absent
    pub previous_value: Option<SettingValue>,
    pub risk_level: RiskLevel,
    pub requires_confirmation: bool,
    pub depends_on: Option<String>,
    pub applied: bool,
}

/// Lifecycle of a remediation transaction. Only `Pending` has successors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Pending,
    Committed,
    RolledBack,
    RollbackIncomplete,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled_back",
            TransactionState::RollbackIncomplete => "rollback_incomplete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionState::Pending),
            "committed" => Some(TransactionState::Committed),
            "rolled_back" => Some(TransactionState::RolledBack),
            "rollback_incomplete" => Some(TransactionState::RollbackIncomplete),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Pending)
    }
}

/// Ordered group of actions against a single scope
#[derive(Debug, Clone)]
pub struct RemediationTransaction {
    pub id: Uuid,
    pub scope: Scope,
    actions: Vec<RemediationAction>,
    state: TransactionState,
}

impl RemediationTransaction {
    /// Returns `None` if any action targets a different scope
    pub fn new(scope: Scope, actions: Vec<RemediationAction>) -> Option<Self> {
        if actions.iter().any(|a| a.scope != scope) {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4(),
            scope,
            actions,
            state: TransactionState::Pending,
        })
    }

    pub fn actions(&self) -> &[RemediationAction] {
        &self.actions
    }

    pub(crate) fn actions_mut(&mut self) -> &mut [RemediationAction] {
        &mut self.actions
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Move out of `Pending`. Returns false, leaving the state untouched, if
    /// the transaction was already closed or `to` is `Pending`.
    pub fn close(&mut self, to: TransactionState) -> bool {
        if self.state.is_terminal() || !to.is_terminal() {
            return false;
        }
        self.state = to;
        true
    }
}

/// Per-scope remediation outcome as surfaced to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
    RollbackIncomplete,
    Skipped,
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOutcome::Committed => "committed",
            TransactionOutcome::RolledBack => "rolled_back",
            TransactionOutcome::RollbackIncomplete => "rollback_incomplete",
            TransactionOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    NotAttempted,
    Applied,
    Declined,
    /// Dropped because the tenant setting it depends on was not brought into line
    Skipped,
    Failed,
    RolledBack,
    RollbackFailed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::NotAttempted => "not_attempted",
            ActionStatus::Applied => "applied",
            ActionStatus::Declined => "declined",
            ActionStatus::Skipped => "skipped",
            ActionStatus::Failed => "failed",
            ActionStatus::RolledBack => "rolled_back",
            ActionStatus::RollbackFailed => "rollback_failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_attempted" => Some(ActionStatus::NotAttempted),
            "applied" => Some(ActionStatus::Applied),
            "declined" => Some(ActionStatus::Declined),
            "skipped" => Some(ActionStatus::Skipped),
            "failed" => Some(ActionStatus::Failed),
            "rolled_back" => Some(ActionStatus::RolledBack),
            "rollback_failed" => Some(ActionStatus::RollbackFailed),
            _ => None,
        }
    }
}

/// What happened to one action during execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub setting_key: String,
    pub previous_value: Option<SettingValue>,
    pub target_value: SettingValue,
    pub status: ActionStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

impl ActionRecord {
    pub fn for_action(action: &RemediationAction) -> Self {
        Self {
            setting_key: action.setting_key.clone(),
            previous_value: action.previous_value.clone(),
            target_value: action.target_value.clone(),
            status: ActionStatus::NotAttempted,
            attempts: 0,
            error: None,
        }
    }
}

/// Outcome of executing (or skipping) one scope's transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub scope: Scope,
    pub transaction_id: Option<Uuid>,
    pub outcome: TransactionOutcome,
    pub actions: Vec<ActionRecord>,
    pub error: Option<String>,
    /// Set when a remote value changed under us; the scope should be audited again
    pub needs_reaudit: bool,
}

impl ExecutionResult {
    pub fn skipped(scope: Scope, reason: impl Into<String>) -> Self {
        Self {
            scope,
            transaction_id: None,
            outcome: TransactionOutcome::Skipped,
            actions: Vec::new(),
            error: Some(reason.into()),
            needs_reaudit: false,
        }
    }

    pub fn applied_keys(&self) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Applied)
            .map(|a| a.setting_key.as_str())
    }
}
