//! Remediation: planning, confirmation and transactional execution
//!
//! The tenant transaction always runs first. Site transactions then run
//! concurrently, bounded like audits, after dropping any action whose
//! `dependsOn` tenant setting was not brought into line.

pub mod confirm;
pub mod executor;
pub mod planner;

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::models::{
    ActionRecord, ActionStatus, ExecutionResult, RemediationAction, RemediationMode,
    RemediationTransaction, SiteAuditResult, TransactionOutcome,
};

pub use confirm::{AutoConfirm, ConfirmAction, ConfirmWith, DenyAll};
pub use executor::RemediationExecutor;
pub use planner::{group_by_scope, RemediationPlanner};

pub struct RemediationCoordinator {
    executor: Arc<RemediationExecutor>,
    concurrency_limit: usize,
}

impl RemediationCoordinator {
    pub fn new(executor: RemediationExecutor, concurrency_limit: usize) -> Self {
        Self {
            executor: Arc::new(executor),
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// One result per audited scope: tenant first, then sites by id.
    /// Returns nothing in report-only mode.
    pub async fn remediate(
        &self,
        planner: &RemediationPlanner<'_>,
        mode: RemediationMode,
        tenant: Option<&SiteAuditResult>,
        sites: &[SiteAuditResult],
    ) -> Vec<ExecutionResult> {
        if mode == RemediationMode::ReportOnly {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(sites.len() + 1);

        let tenant_outcome = match tenant {
            Some(audit) => {
                let outcome = match plan_scope(planner, mode, audit) {
                    Err(skipped) => skipped,
                    Ok(tx) => self.executor.execute(tx).await,
                };
                results.push(outcome.clone());
                Some(outcome)
            }
            None => None,
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut tasks = Vec::new();

        for audit in sites {
            let tx = match plan_scope(planner, mode, audit) {
                Err(skipped) => {
                    tasks.push(Pending::Done(skipped));
                    continue;
                }
                Ok(tx) => tx,
            };

            let scope = tx.scope.clone();
            let (allowed, blocked): (Vec<RemediationAction>, Vec<RemediationAction>) = tx
                .actions()
                .iter()
                .cloned()
                .partition(|a| dependency_settled(a, tenant, tenant_outcome.as_ref()));

            let blocked: Vec<ActionRecord> = blocked.iter().map(blocked_record).collect();
            if !blocked.is_empty() {
                tracing::info!(scope = %scope, skipped = blocked.len(), "Dropping actions with unsettled tenant dependencies");
            }

            let Some(tx) = RemediationTransaction::new(scope.clone(), allowed).filter(|tx| !tx.is_empty()) else {
                let mut skipped = ExecutionResult::skipped(scope, "no actions left after dependency check");
                skipped.actions = blocked;
                tasks.push(Pending::Done(skipped));
                continue;
            };

            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(_permit) => executor.execute(tx).await,
                    Err(_) => ExecutionResult::skipped(tx.scope.clone(), "worker pool closed"),
                }
            });
            tasks.push(Pending::Running { scope, handle, blocked });
        }

        let mut site_results = Vec::with_capacity(tasks.len());
        for task in tasks {
            site_results.push(match task {
                Pending::Done(result) => result,
                Pending::Running { scope, handle, blocked } => match handle.await {
                    Ok(mut result) => {
                        result.actions.extend(blocked);
                        result
                    }
                    Err(e) => {
                        tracing::error!(scope = %scope, error = %e, "Remediation task failed");
                        ExecutionResult::skipped(scope, e.to_string())
                    }
                },
            });
        }

        site_results.sort_by(|a, b| a.scope.id.cmp(&b.scope.id));
        results.extend(site_results);
        results
    }
}

enum Pending {
    Done(ExecutionResult),
    Running {
        scope: crate::models::Scope,
        handle: tokio::task::JoinHandle<ExecutionResult>,
        blocked: Vec<ActionRecord>,
    },
}

/// The scope's transaction, or the `Skipped` result to report instead
fn plan_scope(
    planner: &RemediationPlanner<'_>,
    mode: RemediationMode,
    audit: &SiteAuditResult,
) -> Result<RemediationTransaction, ExecutionResult> {
    if !audit.reachable {
        return Err(ExecutionResult::skipped(audit.scope.clone(), "scope was not audited"));
    }

    planner
        .plan_transactions(&audit.findings, mode)
        .into_iter()
        .next()
        .ok_or_else(|| ExecutionResult::skipped(audit.scope.clone(), "no actions planned"))
}

/// A site action may run if it has no tenant dependency, the tenant was not
/// part of this run, the tenant setting already complies, or the tenant
/// action for it committed.
fn dependency_settled(
    action: &RemediationAction,
    tenant: Option<&SiteAuditResult>,
    tenant_outcome: Option<&ExecutionResult>,
) -> bool {
    let Some(key) = action.depends_on.as_deref() else {
        return true;
    };
    let Some(tenant) = tenant else {
        return true;
    };

    if tenant.findings.iter().any(|f| f.setting_key == key && f.compliant) {
        return true;
    }

    tenant_outcome.is_some_and(|r| {
        r.outcome == TransactionOutcome::Committed && r.applied_keys().any(|k| k == key)
    })
}

fn blocked_record(action: &RemediationAction) -> ActionRecord {
    let mut record = ActionRecord::for_action(action);
    record.status = ActionStatus::Skipped;
    record.error = Some(format!(
        "tenant setting {} was not brought into compliance",
        action.depends_on.as_deref().unwrap_or_default()
    ));
    record
}
