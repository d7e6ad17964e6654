//! Audit run command
//!
//! Wires baseline lookup, fan-out audit, drift, remediation and persistence
//! into one call that produces a `ComplianceReport`.

use async_channel::Sender;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::baseline::BaselineRegistry;
use crate::config::EngineConfig;
use crate::db::AuditStore;
use crate::drift::{self, DriftReport};
use crate::error::EngineError;
use crate::evaluator::ComplianceEvaluator;
use crate::models::{
    ActionStatus, AuditEventType, ComplianceReport, ExecutionResult, RemediationMode,
    ReportMetadata, Scope, ScopeKind, SettingSnapshot, SiteAuditResult,
};
use crate::orchestrator::{AuditOrchestrator, AuditProgress, ScopeAudit, ScopeLocks};
use crate::remediation::{
    AutoConfirm, ConfirmAction, RemediationCoordinator, RemediationExecutor, RemediationPlanner,
};
use crate::retry::RetryPolicy;
use crate::risk::RiskMatrix;
use crate::source::{SettingSource, ThrottledSource};
use crate::utils::create_audit_event;

/// One invocation of the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub mode: RemediationMode,
    pub concurrency_limit: usize,
    /// Tenant id, audited (and remediated) before any site
    pub tenant: Option<String>,
    /// Site URLs
    pub scopes: Vec<String>,
    pub baseline_name: String,
    #[serde(default)]
    pub include_low_risk: bool,
    #[serde(default)]
    pub deadline: Option<Duration>,
}

impl RunRequest {
    pub fn new(baseline_name: impl Into<String>, mode: RemediationMode) -> Self {
        Self {
            mode,
            concurrency_limit: crate::config::DEFAULT_CONCURRENCY,
            tenant: None,
            scopes: Vec::new(),
            baseline_name: baseline_name.into(),
            include_low_risk: false,
            deadline: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_sites<I, S>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(sites.into_iter().map(Into::into));
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn include_low_risk(mut self, include: bool) -> Self {
        self.include_low_risk = include;
        self
    }

    fn requested_scopes(&self) -> Vec<Scope> {
        self.tenant
            .iter()
            .map(Scope::tenant)
            .chain(self.scopes.iter().map(Scope::site))
            .collect()
    }
}

/// Long-lived engine handle: everything a run needs except the request
pub struct Engine {
    source: Arc<dyn SettingSource>,
    registry: Arc<BaselineRegistry>,
    matrix: Arc<RiskMatrix>,
    retry: RetryPolicy,
    store: Option<AuditStore>,
    confirm: Arc<dyn ConfirmAction>,
    progress: Option<Sender<AuditProgress>>,
    locks: ScopeLocks,
}

impl Engine {
    pub fn new(source: Arc<dyn SettingSource>, registry: BaselineRegistry) -> Result<Self, EngineError> {
        let matrix = RiskMatrix::builtin().map_err(|e| EngineError::RiskMatrix(e.to_string()))?;
        Ok(Self {
            source,
            registry: Arc::new(registry),
            matrix: Arc::new(matrix),
            retry: RetryPolicy::default(),
            store: None,
            confirm: Arc::new(AutoConfirm),
            progress: None,
            locks: ScopeLocks::new(),
        })
    }

    /// Engine for the given configuration: built-in plus on-disk baselines,
    /// a file-backed audit store and the configured throttle.
    pub fn from_config(config: &EngineConfig, source: Arc<dyn SettingSource>) -> anyhow::Result<Self> {
        let mut registry = BaselineRegistry::with_builtin()?;
        if config.baseline_dir.is_dir() {
            registry.load_dir(&config.baseline_dir)?;
        }

        let source: Arc<dyn SettingSource> = match config.rate_limiter() {
            Some(limits) => Arc::new(ThrottledSource::with_config(source, limits)),
            None => source,
        };

        let store = AuditStore::open(&config.data_dir)?;
        Ok(Self::new(source, registry)?
            .with_retry(config.retry.clone())
            .with_store(store))
    }

    /// Replace the built-in risk matrix
    pub fn with_risk_matrix(mut self, matrix: RiskMatrix) -> Self {
        self.matrix = Arc::new(matrix);
        self
    }

    /// Merge a JSON risk matrix document over the current one
    pub fn with_risk_overrides(mut self, path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::RiskMatrix(format!("{}: {}", path.display(), e)))?;
        let mut matrix = (*self.matrix).clone();
        matrix
            .merge(&content)
            .map_err(|e| EngineError::RiskMatrix(e.to_string()))?;
        self.matrix = Arc::new(matrix);
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_store(mut self, store: AuditStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn ConfirmAction>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_progress(mut self, progress: Sender<AuditProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn store(&self) -> Option<&AuditStore> {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &BaselineRegistry {
        &self.registry
    }

    /// Run one audit, remediating afterwards unless the mode is report-only.
    ///
    /// Fails only on global preconditions: an unknown baseline, nothing to
    /// audit, a zero concurrency limit, or an audit store that cannot record
    /// the run. Everything that goes wrong per scope lands in the report.
    pub async fn run(&self, request: &RunRequest) -> Result<ComplianceReport, EngineError> {
        let baseline = self.registry.get_baseline(&request.baseline_name)?;
        if request.concurrency_limit == 0 {
            return Err(EngineError::InvalidConcurrency);
        }
        let scopes = request.requested_scopes();
        if scopes.is_empty() {
            return Err(EngineError::NoScopes);
        }

        let run_id = Uuid::new_v4();
        let run_key = run_id.to_string();
        let deadline = request.deadline.map(|d| Instant::now() + d);

        if let Some(store) = &self.store {
            store
                .begin_run(&run_key, &baseline.name, &baseline.version, request.mode)
                .map_err(EngineError::Store)?;
        }
        self.record(
            AuditEventType::RunStarted,
            &run_key,
            None,
            &format!(
                "Auditing {} scope(s) against {} {} ({})",
                scopes.len(),
                baseline.name,
                baseline.version,
                request.mode.as_str()
            ),
        );

        tracing::info!(
            run_id = %run_id,
            baseline = %baseline.name,
            mode = request.mode.as_str(),
            scopes = scopes.len(),
            "Run started"
        );

        let mut orchestrator = AuditOrchestrator::new(
            Arc::clone(&self.source),
            ComplianceEvaluator::new(Arc::clone(&self.matrix)),
        )
        .with_locks(self.locks.clone())
        .with_retry(self.retry.clone())
        .with_deadline(deadline);
        if let Some(progress) = &self.progress {
            orchestrator = orchestrator.with_progress(progress.clone());
        }

        let audits = orchestrator
            .audit_detailed(&scopes, Arc::clone(&baseline), request.concurrency_limit)
            .await?;

        let drift = self.persist_audits(&run_key, &audits);
        let snapshots: Vec<SettingSnapshot> = audits.iter().filter_map(|a| a.snapshot.clone()).collect();

        let (tenants, sites): (Vec<SiteAuditResult>, Vec<SiteAuditResult>) = audits
            .into_iter()
            .map(|a| a.result)
            .partition(|r| r.scope.kind == ScopeKind::Tenant);
        let tenant_result = tenants.into_iter().next();

        let remediation = if request.mode == RemediationMode::ReportOnly {
            Vec::new()
        } else {
            let mut executor = RemediationExecutor::new(Arc::clone(&self.source))
                .with_confirm(Arc::clone(&self.confirm))
                .with_locks(self.locks.clone())
                .with_retry(self.retry.clone())
                .with_deadline(deadline);
            if let Some(store) = &self.store {
                executor = executor.with_store(store.clone(), Some(run_key.clone()));
            }

            let planner = RemediationPlanner::new(&baseline).include_low_risk(request.include_low_risk);
            RemediationCoordinator::new(executor, request.concurrency_limit)
                .remediate(&planner, request.mode, tenant_result.as_ref(), &sites)
                .await
        };

        self.persist_snapshots(&run_key, snapshots, &remediation);

        let report = ComplianceReport {
            metadata: ReportMetadata {
                run_id,
                baseline: baseline.name.clone(),
                baseline_version: baseline.version.clone(),
                mode: request.mode,
                generated_at: chrono::Utc::now().to_rfc3339(),
            },
            tenant_result,
            site_results: sites,
            remediation,
            drift,
        };

        let summary = report.summary();
        if let Some(store) = &self.store {
            if let Err(e) = store.complete_run(&run_key, summary.scopes, summary.aggregate_score) {
                tracing::warn!(run_id = %run_id, error = %e, "Failed to complete run record");
            }
        }
        self.record(
            AuditEventType::RunCompleted,
            &run_key,
            None,
            &format!(
                "{} reachable, {} unreachable, {} non-compliant finding(s)",
                summary.reachable, summary.unreachable, summary.non_compliant
            ),
        );

        tracing::info!(
            run_id = %run_id,
            reachable = summary.reachable,
            unreachable = summary.unreachable,
            non_compliant = summary.non_compliant,
            score = ?summary.aggregate_score,
            "Run completed"
        );

        Ok(report)
    }

    /// Store scope results, returning drift against each scope's previous snapshot
    fn persist_audits(&self, run_id: &str, audits: &[ScopeAudit]) -> Vec<DriftReport> {
        let Some(store) = &self.store else {
            return Vec::new();
        };

        let mut reports = Vec::new();
        for audit in audits {
            let result = &audit.result;
            if let Err(e) = store.record_scope_result(run_id, result) {
                tracing::warn!(scope = %result.scope, error = %e, "Failed to record scope result");
            }

            let (event_type, description) = if result.reachable {
                (
                    AuditEventType::ScopeAudited,
                    format!("Scored {}", result.compliance_score.unwrap_or_default()),
                )
            } else {
                (
                    AuditEventType::ScopeUnreachable,
                    result.error.clone().unwrap_or_else(|| "unreachable".to_string()),
                )
            };
            self.record(event_type, run_id, Some(&result.scope), &description);

            let Some(snapshot) = &audit.snapshot else {
                continue;
            };

            match store.latest_snapshot(&snapshot.scope, Some(run_id)) {
                Ok(Some(previous)) => match drift::diff(&previous, snapshot) {
                    Ok(report) => {
                        if report.has_drift() {
                            tracing::info!(
                                scope = %snapshot.scope,
                                changed = report.changed.len(),
                                added = report.added.len(),
                                removed = report.removed.len(),
                                "Drift detected"
                            );
                        }
                        reports.push(report);
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping drift comparison"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(scope = %snapshot.scope, error = %e, "Failed to load previous snapshot"),
            }
        }

        reports
    }

    /// Store each scope's snapshot as it stands after remediation, so the
    /// next run does not report the engine's own changes as drift
    fn persist_snapshots(&self, run_id: &str, snapshots: Vec<SettingSnapshot>, remediation: &[ExecutionResult]) {
        let Some(store) = &self.store else {
            return;
        };

        for mut snapshot in snapshots {
            if let Some(result) = remediation.iter().find(|r| r.scope == snapshot.scope) {
                apply_remediation(&mut snapshot, result);
            }
            if let Err(e) = store.record_snapshot(run_id, &snapshot) {
                tracing::warn!(scope = %snapshot.scope, error = %e, "Failed to record snapshot");
            }
        }
    }

    fn record(&self, event_type: AuditEventType, run_id: &str, scope: Option<&Scope>, description: &str) {
        if let Some(store) = &self.store {
            let event = create_audit_event(event_type, Some(run_id), scope, None, description);
            if let Err(e) = store.record_event(&event) {
                tracing::warn!(event = event_type.as_str(), error = %e, "Failed to record audit event");
            }
        }
    }
}

/// Overlay the values a transaction left in place: applied actions, plus
/// actions whose restore failed
fn apply_remediation(snapshot: &mut SettingSnapshot, result: &ExecutionResult) {
    for record in &result.actions {
        if matches!(record.status, ActionStatus::Applied | ActionStatus::RollbackFailed) {
            snapshot.insert(record.setting_key.clone(), record.target_value.clone());
        }
    }
}
