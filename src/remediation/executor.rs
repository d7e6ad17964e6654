//! Transactional execution of one scope's remediation actions
//!
//! Actions run in order under the scope's lock. Each one is re-read first and
//! aborts the transaction if the remote value moved since plan time. The
//! first failure rolls back every applied action in reverse order; if any
//! restore fails the transaction ends `RollbackIncomplete` and the report
//! says which settings are left changed.

use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;

use super::confirm::{AutoConfirm, ConfirmAction};
use crate::db::AuditStore;
use crate::error::ActionError;
use crate::models::{
    ActionRecord, ActionStatus, AuditEventType, ExecutionResult, RemediationAction,
    RemediationTransaction, TransactionOutcome, TransactionState,
};
use crate::orchestrator::ScopeLocks;
use crate::retry::{RetryError, RetryPolicy};
use crate::source::SettingSource;
use crate::utils::create_audit_event;

pub struct RemediationExecutor {
    source: Arc<dyn SettingSource>,
    confirm: Arc<dyn ConfirmAction>,
    locks: ScopeLocks,
    retry: RetryPolicy,
    deadline: Option<Instant>,
    store: Option<AuditStore>,
    run_id: Option<String>,
}

impl RemediationExecutor {
    pub fn new(source: Arc<dyn SettingSource>) -> Self {
        Self {
            source,
            confirm: Arc::new(AutoConfirm),
            locks: ScopeLocks::new(),
            retry: RetryPolicy::default(),
            deadline: None,
            store: None,
            run_id: None,
        }
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn ConfirmAction>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_locks(mut self, locks: ScopeLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Persist transactions and events, correlated to `run_id`
    pub fn with_store(mut self, store: AuditStore, run_id: Option<String>) -> Self {
        self.store = Some(store);
        self.run_id = run_id;
        self
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run a transaction to a terminal state.
    ///
    /// Never fails: every problem ends up in the returned `ExecutionResult`.
    pub async fn execute(&self, mut tx: RemediationTransaction) -> ExecutionResult {
        let scope = tx.scope.clone();
        if tx.is_empty() {
            return ExecutionResult::skipped(scope, "no actions planned");
        }

        let mut records: Vec<ActionRecord> = tx.actions().iter().map(ActionRecord::for_action).collect();

        let mut approved = vec![true; records.len()];
        for (i, action) in tx.actions().iter().enumerate() {
            if action.requires_confirmation && !self.confirm.confirm(action).await {
                tracing::info!(scope = %scope, key = %action.setting_key, "Action declined");
                approved[i] = false;
                records[i].status = ActionStatus::Declined;
            }
        }

        if !approved.iter().any(|a| *a) {
            return ExecutionResult {
                scope,
                transaction_id: None,
                outcome: TransactionOutcome::Skipped,
                actions: records,
                error: Some("all actions declined".to_string()),
                needs_reaudit: false,
            };
        }

        if self.deadline_passed() {
            let reason = "deadline exceeded before transaction started".to_string();
            tracing::warn!(scope = %scope, transaction_id = %tx.id, "{}", reason);
            self.persist("begin transaction", |store| store.begin_transaction(self.run_id.as_deref(), &tx));
            tx.close(TransactionState::RolledBack);
            self.persist("close transaction", |store| {
                store.close_transaction(&tx.id.to_string(), tx.state(), &records)
            });
            self.emit(AuditEventType::TransactionRolledBack, &tx, &reason, None);

            return ExecutionResult {
                scope,
                transaction_id: Some(tx.id),
                outcome: TransactionOutcome::RolledBack,
                actions: records,
                error: Some(reason),
                needs_reaudit: false,
            };
        }

        let _guard = self.locks.acquire(&scope).await;

        self.persist("begin transaction", |store| store.begin_transaction(self.run_id.as_deref(), &tx));
        self.emit(
            AuditEventType::TransactionStarted,
            &tx,
            &format!("Remediating {} setting(s) on {}", approved.iter().filter(|a| **a).count(), scope),
            None,
        );

        let mut failure: Option<ActionError> = None;
        for i in 0..records.len() {
            if !approved[i] {
                continue;
            }

            let action = tx.actions()[i].clone();
            match self.apply_action(&action, &mut records[i]).await {
                Ok(()) => {
                    tx.actions_mut()[i].applied = true;
                    records[i].status = ActionStatus::Applied;
                    tracing::info!(
                        scope = %scope,
                        key = %action.setting_key,
                        attempts = records[i].attempts,
                        "Setting applied"
                    );
                    self.emit(
                        AuditEventType::ActionApplied,
                        &tx,
                        &format!("{} set to {}", action.setting_key, action.target_value),
                        Some(json!({ "key": action.setting_key, "attempts": records[i].attempts })),
                    );
                }
                Err(err) => {
                    if !matches!(err, ActionError::DeadlineExceeded { .. }) {
                        records[i].status = ActionStatus::Failed;
                    }
                    records[i].error = Some(err.to_string());
                    tracing::warn!(
                        scope = %scope,
                        key = %action.setting_key,
                        attempts = records[i].attempts,
                        error = %err,
                        "Action failed, rolling back"
                    );
                    self.emit(
                        AuditEventType::ActionFailed,
                        &tx,
                        &err.to_string(),
                        Some(json!({ "key": action.setting_key, "attempts": records[i].attempts })),
                    );
                    failure = Some(err);
                    break;
                }
            }
        }

        let outcome = match &failure {
            None => {
                tx.close(TransactionState::Committed);
                tracing::info!(scope = %scope, transaction_id = %tx.id, "Transaction committed");
                self.emit(AuditEventType::TransactionCommitted, &tx, "Transaction committed", None);
                TransactionOutcome::Committed
            }
            Some(_) => {
                if self.rollback(&mut tx, &mut records).await {
                    tx.close(TransactionState::RolledBack);
                    tracing::info!(scope = %scope, transaction_id = %tx.id, "Transaction rolled back");
                    self.emit(AuditEventType::TransactionRolledBack, &tx, "Transaction rolled back", None);
                    TransactionOutcome::RolledBack
                } else {
                    tx.close(TransactionState::RollbackIncomplete);
                    let stranded: Vec<&str> = records
                        .iter()
                        .filter(|r| r.status == ActionStatus::RollbackFailed)
                        .map(|r| r.setting_key.as_str())
                        .collect();
                    tracing::error!(
                        scope = %scope,
                        transaction_id = %tx.id,
                        settings = ?stranded,
                        "Rollback incomplete, settings left changed"
                    );
                    self.emit(
                        AuditEventType::RollbackIncomplete,
                        &tx,
                        &format!("Rollback incomplete: {} left changed", stranded.join(", ")),
                        Some(json!({ "settings": stranded })),
                    );
                    TransactionOutcome::RollbackIncomplete
                }
            }
        };

        self.persist("close transaction", |store| {
            store.close_transaction(&tx.id.to_string(), tx.state(), &records)
        });

        let needs_reaudit = failure.as_ref().is_some_and(ActionError::is_conflict);
        ExecutionResult {
            scope,
            transaction_id: Some(tx.id),
            outcome,
            actions: records,
            error: failure.map(|e| e.to_string()),
            needs_reaudit,
        }
    }

    /// Re-verify then write one action. `record.attempts` counts write attempts.
    async fn apply_action(&self, action: &RemediationAction, record: &mut ActionRecord) -> Result<(), ActionError> {
        let key = action.setting_key.as_str();
        if self.deadline_passed() {
            return Err(ActionError::DeadlineExceeded { key: key.to_string() });
        }

        let source = &self.source;
        let scope = &action.scope;

        let read = self
            .retry
            .run(self.deadline, move |_| source.get_setting(scope, key))
            .await;
        let current = read.result.map_err(|e| action_error(key, e))?;
        if current != action.previous_value {
            return Err(ActionError::conflict(key, action.previous_value.as_ref(), current.as_ref()));
        }

        let target = &action.target_value;
        let write = self
            .retry
            .run(self.deadline, move |_| source.apply_setting(scope, key, target))
            .await;
        record.attempts = write.attempts;
        write.result.map_err(|e| action_error(key, e))
    }

    /// Restore applied actions in reverse order. Returns false if any could not be restored.
    ///
    /// Runs to completion even past the deadline.
    async fn rollback(&self, tx: &mut RemediationTransaction, records: &mut [ActionRecord]) -> bool {
        let mut complete = true;
        let source = &self.source;

        for i in (0..records.len()).rev() {
            if !tx.actions()[i].applied {
                continue;
            }

            let action = tx.actions()[i].clone();
            let key = action.setting_key.as_str();
            let scope = &action.scope;

            let Some(previous) = action.previous_value.as_ref() else {
                records[i].status = ActionStatus::RollbackFailed;
                records[i].error = Some("setting was absent before remediation and cannot be removed".to_string());
                complete = false;
                continue;
            };

            let restore = self
                .retry
                .run(None, move |_| source.apply_setting(scope, key, previous))
                .await;

            match restore.result {
                Ok(()) => {
                    tx.actions_mut()[i].applied = false;
                    records[i].status = ActionStatus::RolledBack;
                    tracing::debug!(scope = %scope, key, "Setting restored");
                }
                Err(e) => {
                    let err = action_error(key, e);
                    tracing::error!(scope = %scope, key, error = %err, "Failed to restore setting");
                    records[i].status = ActionStatus::RollbackFailed;
                    records[i].error = Some(err.to_string());
                    complete = false;
                }
            }
        }

        complete
    }

    fn emit(&self, event_type: AuditEventType, tx: &RemediationTransaction, description: &str, metadata: Option<serde_json::Value>) {
        let Some(store) = &self.store else {
            return;
        };

        let mut event = create_audit_event(event_type, self.run_id.as_deref(), Some(&tx.scope), Some(tx.id), description);
        if let Some(metadata) = metadata {
            event = event.with_metadata(metadata);
        }
        if let Err(e) = store.record_event(&event) {
            tracing::warn!(event = event_type.as_str(), error = %e, "Failed to record audit event");
        }
    }

    fn persist<T>(&self, what: &str, op: impl FnOnce(&AuditStore) -> anyhow::Result<T>) {
        if let Some(store) = &self.store {
            if let Err(e) = op(store) {
                tracing::warn!(error = %e, "Failed to {}", what);
            }
        }
    }
}

fn action_error(key: &str, err: RetryError) -> ActionError {
    match err {
        RetryError::Source(e) => ActionError::Source(e),
        RetryError::DeadlineExceeded(_) => ActionError::DeadlineExceeded { key: key.to_string() },
    }
}
