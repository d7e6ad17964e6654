//! Audit fan-out
//!
//! Each scope is audited independently on its own task. A semaphore bounds
//! how many are in flight, and failures become `reachable: false` results
//! instead of aborting the batch. Output is sorted by scope id regardless of
//! completion order.

pub mod scope_lock;

use async_channel::Sender;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::{EngineError, SourceError};
use crate::evaluator::ComplianceEvaluator;
use crate::models::{Baseline, Scope, ScopeFailure, SettingSnapshot, SiteAuditResult};
use crate::retry::{RetryError, RetryPolicy};
use crate::source::SettingSource;

pub use scope_lock::{ScopeGuard, ScopeLocks};

/// Published once per finished scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditProgress {
    pub scope_id: String,
    pub completed: usize,
    pub total: usize,
    pub reachable: bool,
}

/// A scope's result plus the snapshot it was computed from, when one was taken
#[derive(Debug, Clone)]
pub struct ScopeAudit {
    pub result: SiteAuditResult,
    pub snapshot: Option<SettingSnapshot>,
}

impl ScopeAudit {
    fn failed(scope: Scope, failure: ScopeFailure, error: impl Into<String>) -> Self {
        Self {
            result: SiteAuditResult::unreachable(scope, failure, error),
            snapshot: None,
        }
    }
}

pub struct AuditOrchestrator {
    source: Arc<dyn SettingSource>,
    evaluator: ComplianceEvaluator,
    locks: ScopeLocks,
    retry: RetryPolicy,
    deadline: Option<Instant>,
    progress: Option<Sender<AuditProgress>>,
}

/// Everything a worker task needs, shared read-only
struct Worker {
    source: Arc<dyn SettingSource>,
    evaluator: ComplianceEvaluator,
    locks: ScopeLocks,
    retry: RetryPolicy,
    deadline: Option<Instant>,
    baseline: Arc<Baseline>,
    progress: Option<Sender<AuditProgress>>,
    completed: AtomicUsize,
    total: usize,
}

impl AuditOrchestrator {
    pub fn new(source: Arc<dyn SettingSource>, evaluator: ComplianceEvaluator) -> Self {
        Self {
            source,
            evaluator,
            locks: ScopeLocks::new(),
            retry: RetryPolicy::default(),
            deadline: None,
            progress: None,
        }
    }

    /// Share a lock table with remediation so both respect per-scope exclusion
    pub fn with_locks(mut self, locks: ScopeLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Retry policy for transient snapshot read failures
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_progress(mut self, progress: Sender<AuditProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Audit every scope and return one result per distinct scope, sorted by id
    pub async fn audit(
        &self,
        scopes: &[Scope],
        baseline: Arc<Baseline>,
        concurrency_limit: usize,
    ) -> Result<Vec<SiteAuditResult>, EngineError> {
        Ok(self
            .audit_detailed(scopes, baseline, concurrency_limit)
            .await?
            .into_iter()
            .map(|a| a.result)
            .collect())
    }

    /// Like `audit`, but keeps each scope's snapshot for persistence and drift
    pub async fn audit_detailed(
        &self,
        scopes: &[Scope],
        baseline: Arc<Baseline>,
        concurrency_limit: usize,
    ) -> Result<Vec<ScopeAudit>, EngineError> {
        if concurrency_limit == 0 {
            return Err(EngineError::InvalidConcurrency);
        }

        let scopes = dedup_scopes(scopes);
        let worker = Arc::new(Worker {
            source: Arc::clone(&self.source),
            evaluator: self.evaluator.clone(),
            locks: self.locks.clone(),
            retry: self.retry.clone(),
            deadline: self.deadline,
            baseline,
            progress: self.progress.clone(),
            completed: AtomicUsize::new(0),
            total: scopes.len(),
        });

        tracing::info!(
            scopes = scopes.len(),
            concurrency_limit,
            baseline = %worker.baseline.name,
            "Starting audit"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let mut tasks = Vec::with_capacity(scopes.len());

        for scope in scopes {
            let worker = Arc::clone(&worker);
            let semaphore = Arc::clone(&semaphore);
            let task_scope = scope.clone();

            let task = tokio::spawn(async move {
                let audit = match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.audit_scope(task_scope).await,
                    Err(_) => ScopeAudit::failed(task_scope, ScopeFailure::Internal, "worker pool closed"),
                };
                worker.report_progress(&audit.result).await;
                audit
            });
            tasks.push((scope, task));
        }

        let mut audits = Vec::with_capacity(tasks.len());
        for (scope, task) in tasks {
            match task.await {
                Ok(audit) => audits.push(audit),
                Err(e) => {
                    tracing::error!(scope = %scope, error = %e, "Audit task failed");
                    audits.push(ScopeAudit::failed(scope, ScopeFailure::Internal, e.to_string()));
                }
            }
        }

        audits.sort_by(|a, b| {
            a.result
                .scope
                .id
                .cmp(&b.result.scope.id)
                .then(a.result.scope.kind.cmp(&b.result.scope.kind))
        });

        let unreachable = audits.iter().filter(|a| !a.result.reachable).count();
        tracing::info!(
            scopes = audits.len(),
            unreachable,
            "Audit finished"
        );

        Ok(audits)
    }
}

impl Worker {
    async fn audit_scope(&self, scope: Scope) -> ScopeAudit {
        if !scope.is_valid() {
            tracing::warn!(scope = %scope, "Skipping invalid scope id");
            return ScopeAudit::failed(scope, ScopeFailure::InvalidScope, "invalid scope id");
        }

        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return ScopeAudit::failed(scope, ScopeFailure::DeadlineExceeded, "deadline exceeded before audit started");
        }

        let _guard = self.locks.acquire(&scope).await;

        let source = &self.source;
        let attempted = self
            .retry
            .run(self.deadline, |_| source.get_snapshot(&scope))
            .await;

        match attempted.result {
            Ok(snapshot) => {
                let evaluation = self.evaluator.evaluate(&snapshot, &self.baseline);
                tracing::debug!(
                    scope = %scope,
                    score = evaluation.score,
                    findings = evaluation.findings.len(),
                    "Scope audited"
                );
                ScopeAudit {
                    result: SiteAuditResult::reachable(scope, evaluation.findings, evaluation.score),
                    snapshot: Some(snapshot),
                }
            }
            Err(RetryError::Source(err)) => {
                tracing::warn!(scope = %scope, attempts = attempted.attempts, error = %err, "Scope unreachable");
                ScopeAudit::failed(scope, failure_for(&err), err.to_string())
            }
            Err(RetryError::DeadlineExceeded(last)) => {
                let message = match last {
                    Some(err) => format!("deadline exceeded after {}", err),
                    None => "deadline exceeded".to_string(),
                };
                tracing::warn!(scope = %scope, "{}", message);
                ScopeAudit::failed(scope, ScopeFailure::DeadlineExceeded, message)
            }
        }
    }

    async fn report_progress(&self, result: &SiteAuditResult) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &self.progress {
            // A dropped receiver is fine; nobody is listening
            let _ = progress
                .send(AuditProgress {
                    scope_id: result.scope.id.clone(),
                    completed,
                    total: self.total,
                    reachable: result.reachable,
                })
                .await;
        }
    }
}

fn failure_for(err: &SourceError) -> ScopeFailure {
    match err {
        SourceError::Unreachable { .. } | SourceError::Transient { .. } => ScopeFailure::Unreachable,
        SourceError::PermissionDenied { .. } => ScopeFailure::PermissionDenied,
        SourceError::InvalidValue { .. } => ScopeFailure::Internal,
    }
}

/// First occurrence wins
pub fn dedup_scopes(scopes: &[Scope]) -> Vec<Scope> {
    let mut seen = HashSet::with_capacity(scopes.len());
    scopes
        .iter()
        .filter(|s| seen.insert((*s).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineBuilder;
    use crate::models::{CompareMode, SettingValue};
    use crate::risk::RiskMatrix;
    use crate::source::InMemorySource;
    use std::time::Duration;

    fn baseline() -> Arc<Baseline> {
        Arc::new(
            BaselineBuilder::new("strict", "1.0")
                .site("externalResharing", SettingValue::Bool(false), CompareMode::Equals, 1.0)
                .build()
                .unwrap(),
        )
    }

    fn site(name: &str) -> Scope {
        Scope::site(format!("https://contoso.sharepoint.com/sites/{}", name))
    }

    fn orchestrator(source: Arc<InMemorySource>) -> AuditOrchestrator {
        AuditOrchestrator::new(
            source,
            ComplianceEvaluator::new(Arc::new(RiskMatrix::builtin().unwrap())),
        )
        .with_retry(RetryPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        })
    }

    fn source_with(sites: &[&str]) -> InMemorySource {
        sites.iter().fold(InMemorySource::new(), |source, name| {
            source.with_scope(site(name), [("externalResharing", SettingValue::Bool(false))])
        })
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_fatal() {
        let source = Arc::new(source_with(&["a"]));
        let err = orchestrator(source).audit(&[site("a")], baseline(), 0).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidConcurrency));
    }

    #[tokio::test]
    async fn test_results_sorted_and_deduplicated() {
        let source = Arc::new(source_with(&["c", "a", "b"]));
        let scopes = vec![site("c"), site("a"), site("b"), site("a")];

        let results = orchestrator(source).audit(&scopes, baseline(), 3).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.scope.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "https://contoso.sharepoint.com/sites/a",
                "https://contoso.sharepoint.com/sites/b",
                "https://contoso.sharepoint.com/sites/c",
            ]
        );
        assert!(results.iter().all(|r| r.compliance_score == Some(100)));
    }

    #[tokio::test]
    async fn test_invalid_scope_reported_not_fatal() {
        let source = Arc::new(source_with(&["a"]));
        let scopes = vec![site("a"), Scope::site("not a url")];

        let results = orchestrator(source.clone()).audit(&scopes, baseline(), 2).await.unwrap();
        assert_eq!(results.len(), 2);
        let invalid = results.iter().find(|r| r.scope.id == "not a url").unwrap();
        assert!(!invalid.reachable);
        assert_eq!(invalid.failure, Some(ScopeFailure::InvalidScope));
        assert_eq!(invalid.error.as_deref(), Some("invalid scope id"));
        assert_eq!(source.read_count(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_is_per_scope() {
        let source = Arc::new(source_with(&["a", "b"]));
        source.set_permission_denied(&site("b"));

        let results = orchestrator(source).audit(&[site("a"), site("b")], baseline(), 2).await.unwrap();
        assert!(results[0].reachable);
        assert_eq!(results[1].failure, Some(ScopeFailure::PermissionDenied));
        assert!(results[1].findings.is_empty());
        assert_eq!(results[1].compliance_score, None);
    }

    #[tokio::test]
    async fn test_expired_deadline_starts_nothing() {
        let source = Arc::new(source_with(&["a", "b"]));
        let results = orchestrator(source.clone())
            .with_deadline(Some(Instant::now()))
            .audit(&[site("a"), site("b")], baseline(), 2)
            .await
            .unwrap();

        assert!(results
            .iter()
            .all(|r| r.failure == Some(ScopeFailure::DeadlineExceeded)));
        assert_eq!(source.read_count(), 0);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let source = Arc::new(source_with(&["a", "b", "c"]));
        let (tx, rx) = async_channel::unbounded();

        orchestrator(source)
            .with_progress(tx)
            .audit(&[site("a"), site("b"), site("c")], baseline(), 2)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.total == 3));
        let mut completed: Vec<usize> = events.iter().map(|e| e.completed).collect();
        completed.sort();
        assert_eq!(completed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dropped_progress_receiver_is_ignored() {
        let source = Arc::new(source_with(&["a"]));
        let (tx, rx) = async_channel::bounded(1);
        drop(rx);

        let results = orchestrator(source)
            .with_progress(tx)
            .audit(&[site("a")], baseline(), 1)
            .await
            .unwrap();
        assert!(results[0].reachable);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let scopes = vec![site("b"), site("a"), site("b"), Scope::tenant("contoso")];
        assert_eq!(dedup_scopes(&scopes), vec![site("b"), site("a"), Scope::tenant("contoso")]);
    }
}
