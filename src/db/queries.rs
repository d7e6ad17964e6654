use rusqlite::{Connection, params, OptionalExtension};
use anyhow::{Result, Context};
use crate::models::*;

/// Row of `audit_runs`
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRunRecord {
    pub id: String,
    pub baseline: String,
    pub baseline_version: String,
    pub mode: String,
    pub scope_count: i64,
    pub aggregate_score: Option<u8>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// Row of `scope_results`
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeResultRecord {
    pub scope_id: String,
    pub scope_kind: String,
    pub reachable: bool,
    pub compliance_score: Option<u8>,
    pub failure: Option<String>,
    pub error: Option<String>,
    pub non_compliant_count: i64,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize value for storage")
}

// ===== AUDIT RUNS =====

pub fn insert_audit_run(conn: &Connection, id: &str, baseline: &str, baseline_version: &str, mode: RemediationMode) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_runs (id, baseline, baseline_version, mode) VALUES (?, ?, ?, ?)",
        params![id, baseline, baseline_version, mode.as_str()],
    ).context("Failed to insert audit run")?;

    Ok(())
}

pub fn complete_audit_run(conn: &Connection, id: &str, scope_count: usize, aggregate_score: Option<u8>) -> Result<()> {
    conn.execute(
        "UPDATE audit_runs SET scope_count = ?, aggregate_score = ?, completed_at = ? WHERE id = ?",
        params![scope_count as i64, aggregate_score, chrono::Utc::now().to_rfc3339(), id],
    ).context("Failed to complete audit run")?;

    Ok(())
}

pub fn select_audit_run(conn: &Connection, id: &str) -> Result<Option<AuditRunRecord>> {
    conn.query_row(
        "SELECT id, baseline, baseline_version, mode, scope_count, aggregate_score, started_at, completed_at FROM audit_runs WHERE id = ?",
        params![id],
        |row| {
            Ok(AuditRunRecord {
                id: row.get(0)?,
                baseline: row.get(1)?,
                baseline_version: row.get(2)?,
                mode: row.get(3)?,
                scope_count: row.get(4)?,
                aggregate_score: row.get(5)?,
                started_at: row.get(6)?,
                completed_at: row.get(7)?,
            })
        },
    )
    .optional()
    .context("Failed to query audit run")
}

// ===== SCOPE RESULTS =====

pub fn insert_scope_result(conn: &Connection, run_id: &str, result: &SiteAuditResult) -> Result<i64> {
    conn.execute(
        "INSERT INTO scope_results (run_id, scope_id, scope_kind, reachable, compliance_score, failure, error, non_compliant_count)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            run_id,
            result.scope.id,
            result.scope.kind.as_str(),
            result.reachable,
            result.compliance_score,
            result.failure.map(|f| f.as_str()),
            result.error,
            result.non_compliant().count() as i64,
        ],
    ).context("Failed to insert scope result")?;

    Ok(conn.last_insert_rowid())
}

pub fn select_scope_results(conn: &Connection, run_id: &str) -> Result<Vec<ScopeResultRecord>> {
    let mut stmt = conn
        .prepare("SELECT scope_id, scope_kind, reachable, compliance_score, failure, error, non_compliant_count FROM scope_results WHERE run_id = ? ORDER BY scope_kind DESC, scope_id")
        .context("Failed to prepare select scope results query")?;

    let results = stmt
        .query_map(params![run_id], |row| {
            Ok(ScopeResultRecord {
                scope_id: row.get(0)?,
                scope_kind: row.get(1)?,
                reachable: row.get(2)?,
                compliance_score: row.get(3)?,
                failure: row.get(4)?,
                error: row.get(5)?,
                non_compliant_count: row.get(6)?,
            })
        })
        .context("Failed to map scope results from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect scope results")?;

    Ok(results)
}

// ===== SNAPSHOTS =====

pub fn insert_snapshot(conn: &Connection, run_id: &str, snapshot: &SettingSnapshot) -> Result<i64> {
    conn.execute(
        "INSERT INTO snapshots (run_id, scope_id, scope_kind, captured_at, snapshot_json) VALUES (?, ?, ?, ?, ?)",
        params![
            run_id,
            snapshot.scope.id,
            snapshot.scope.kind.as_str(),
            snapshot.captured_at,
            to_json(snapshot)?,
        ],
    ).context("Failed to insert snapshot")?;

    Ok(conn.last_insert_rowid())
}

/// Most recent snapshot of `scope` taken outside run `excluding_run`
pub fn select_latest_snapshot(conn: &Connection, scope: &Scope, excluding_run: Option<&str>) -> Result<Option<SettingSnapshot>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT snapshot_json FROM snapshots
             WHERE scope_id = ? AND scope_kind = ? AND (?3 IS NULL OR run_id != ?3)
             ORDER BY id DESC LIMIT 1",
            params![scope.id, scope.kind.as_str(), excluding_run],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query latest snapshot")?;

    json.map(|j| serde_json::from_str(&j).context("Failed to deserialize stored snapshot"))
        .transpose()
}

// ===== TRANSACTIONS =====

pub fn insert_transaction(conn: &Connection, run_id: Option<&str>, tx: &RemediationTransaction) -> Result<()> {
    conn.execute(
        "INSERT INTO transactions (id, run_id, scope_id, scope_kind, state) VALUES (?, ?, ?, ?, ?)",
        params![
            tx.id.to_string(),
            run_id,
            tx.scope.id,
            tx.scope.kind.as_str(),
            tx.state().as_str(),
        ],
    ).context("Failed to insert transaction")?;

    Ok(())
}

pub fn update_transaction_state(conn: &Connection, id: &str, state: TransactionState) -> Result<()> {
    let closed_at = state.is_terminal().then(|| chrono::Utc::now().to_rfc3339());
    conn.execute(
        "UPDATE transactions SET state = ?, closed_at = ? WHERE id = ?",
        params![state.as_str(), closed_at, id],
    ).context("Failed to update transaction state")?;

    Ok(())
}

pub fn select_transaction_state(conn: &Connection, id: &str) -> Result<Option<TransactionState>> {
    let state: Option<String> = conn
        .query_row("SELECT state FROM transactions WHERE id = ?", params![id], |row| row.get(0))
        .optional()
        .context("Failed to query transaction state")?;

    Ok(state.as_deref().and_then(TransactionState::from_str))
}

pub fn insert_transaction_action(conn: &Connection, transaction_id: &str, position: usize, record: &ActionRecord) -> Result<i64> {
    let previous = record.previous_value.as_ref().map(to_json).transpose()?;
    conn.execute(
        "INSERT INTO transaction_actions (transaction_id, position, setting_key, previous_value, target_value, status, attempts, error)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            transaction_id,
            position as i64,
            record.setting_key,
            previous,
            to_json(&record.target_value)?,
            record.status.as_str(),
            record.attempts,
            record.error,
        ],
    ).context("Failed to insert transaction action")?;

    Ok(conn.last_insert_rowid())
}

pub fn select_transaction_actions(conn: &Connection, transaction_id: &str) -> Result<Vec<ActionRecord>> {
    let mut stmt = conn
        .prepare("SELECT setting_key, previous_value, target_value, status, attempts, error FROM transaction_actions WHERE transaction_id = ? ORDER BY position")
        .context("Failed to prepare select transaction actions query")?;

    let rows = stmt
        .query_map(params![transaction_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .context("Failed to map transaction actions from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect transaction actions")?;

    rows.into_iter()
        .map(|(setting_key, previous, target, status, attempts, error)| {
            Ok(ActionRecord {
                setting_key,
                previous_value: previous
                    .map(|p| serde_json::from_str(&p))
                    .transpose()
                    .context("Failed to deserialize previous value")?,
                target_value: serde_json::from_str(&target).context("Failed to deserialize target value")?,
                status: ActionStatus::from_str(&status)
                    .with_context(|| format!("Unknown action status '{}'", status))?,
                attempts,
                error,
            })
        })
        .collect()
}

// ===== AUDIT EVENTS =====

pub fn insert_audit_event(conn: &Connection, event: &AuditEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO audit_events (run_id, event_type, scope_id, transaction_id, description, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            event.run_id,
            event.event_type,
            event.scope_id,
            event.transaction_id,
            event.description,
            event.metadata,
            event.created_at,
        ],
    ).context("Failed to insert audit event")?;

    Ok(conn.last_insert_rowid())
}

fn map_audit_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    Ok(AuditEvent {
        id: row.get(0)?,
        run_id: row.get(1)?,
        event_type: row.get(2)?,
        scope_id: row.get(3)?,
        transaction_id: row.get(4)?,
        description: row.get(5)?,
        metadata: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn select_audit_events(conn: &Connection, run_id: &str) -> Result<Vec<AuditEvent>> {
    let mut stmt = conn
        .prepare("SELECT id, run_id, event_type, scope_id, transaction_id, description, metadata, created_at FROM audit_events WHERE run_id = ? ORDER BY id")
        .context("Failed to prepare select audit events query")?;

    let events = stmt
        .query_map(params![run_id], map_audit_event)
        .context("Failed to map audit events from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect audit events")?;

    Ok(events)
}

pub fn select_audit_events_by_transaction(conn: &Connection, transaction_id: &str) -> Result<Vec<AuditEvent>> {
    let mut stmt = conn
        .prepare("SELECT id, run_id, event_type, scope_id, transaction_id, description, metadata, created_at FROM audit_events WHERE transaction_id = ? ORDER BY id")
        .context("Failed to prepare select audit events query")?;

    let events = stmt
        .query_map(params![transaction_id], map_audit_event)
        .context("Failed to map audit events from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect audit events")?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn site() -> Scope {
        Scope::site("https://contoso.sharepoint.com/sites/hr")
    }

    #[test]
    fn test_audit_run_lifecycle() {
        let conn = conn();
        insert_audit_run(&conn, "run-1", "strict", "1.0", RemediationMode::Automatic).unwrap();

        let run = select_audit_run(&conn, "run-1").unwrap().unwrap();
        assert_eq!(run.mode, "automatic");
        assert!(run.completed_at.is_none());

        complete_audit_run(&conn, "run-1", 3, Some(72)).unwrap();
        let run = select_audit_run(&conn, "run-1").unwrap().unwrap();
        assert_eq!(run.scope_count, 3);
        assert_eq!(run.aggregate_score, Some(72));
        assert!(run.completed_at.is_some());

        assert!(select_audit_run(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_scope_results() {
        let conn = conn();
        insert_audit_run(&conn, "run-1", "strict", "1.0", RemediationMode::ReportOnly).unwrap();
        insert_scope_result(
            &conn,
            "run-1",
            &SiteAuditResult::unreachable(site(), ScopeFailure::Unreachable, "timeout"),
        )
        .unwrap();
        insert_scope_result(&conn, "run-1", &SiteAuditResult::reachable(Scope::tenant("contoso"), vec![], 100)).unwrap();

        let results = select_scope_results(&conn, "run-1").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].scope_kind, "tenant");
        assert_eq!(results[1].failure.as_deref(), Some("unreachable"));
        assert!(!results[1].reachable);
    }

    #[test]
    fn test_scope_result_requires_run() {
        let conn = conn();
        let result = SiteAuditResult::reachable(site(), vec![], 100);
        assert!(insert_scope_result(&conn, "nope", &result).is_err());
    }

    #[test]
    fn test_latest_snapshot_excludes_current_run() {
        let conn = conn();
        insert_audit_run(&conn, "run-1", "strict", "1.0", RemediationMode::ReportOnly).unwrap();
        insert_audit_run(&conn, "run-2", "strict", "1.0", RemediationMode::ReportOnly).unwrap();

        let first = SettingSnapshot::new(site()).with_value("externalResharing", SettingValue::Bool(true));
        let second = SettingSnapshot::new(site()).with_value("externalResharing", SettingValue::Bool(false));
        insert_snapshot(&conn, "run-1", &first).unwrap();
        insert_snapshot(&conn, "run-2", &second).unwrap();

        assert_eq!(select_latest_snapshot(&conn, &site(), None).unwrap(), Some(second));
        assert_eq!(select_latest_snapshot(&conn, &site(), Some("run-2")).unwrap(), Some(first));
        assert_eq!(select_latest_snapshot(&conn, &Scope::tenant("contoso"), None).unwrap(), None);
    }

    #[test]
    fn test_transaction_and_actions() {
        let conn = conn();
        let scope = site();
        let action = RemediationAction {
            scope: scope.clone(),
            setting_key: "externalResharing".to_string(),
            target_value: SettingValue::Bool(false),
            previous_value: None,
            risk_level: RiskLevel::Medium,
            requires_confirmation: false,
            depends_on: None,
            applied: false,
        };
        let tx = RemediationTransaction::new(scope, vec![action.clone()]).unwrap();
        let id = tx.id.to_string();

        insert_transaction(&conn, None, &tx).unwrap();
        assert_eq!(select_transaction_state(&conn, &id).unwrap(), Some(TransactionState::Pending));

        let mut record = ActionRecord::for_action(&action);
        record.status = ActionStatus::RollbackFailed;
        record.attempts = 2;
        record.error = Some("no previous value".to_string());
        insert_transaction_action(&conn, &id, 0, &record).unwrap();

        update_transaction_state(&conn, &id, TransactionState::RollbackIncomplete).unwrap();
        assert_eq!(
            select_transaction_state(&conn, &id).unwrap(),
            Some(TransactionState::RollbackIncomplete)
        );
        assert_eq!(select_transaction_actions(&conn, &id).unwrap(), vec![record]);
    }

    #[test]
    fn test_audit_events_by_run_and_transaction() {
        let conn = conn();
        let event = AuditEvent::new(AuditEventType::ActionApplied, "Applied externalResharing".to_string())
            .with_run_id("run-1")
            .with_transaction_id("tx-1")
            .with_metadata(serde_json::json!({"attempts": 1}));
        insert_audit_event(&conn, &event).unwrap();
        insert_audit_event(&conn, &AuditEvent::new(AuditEventType::RunCompleted, "done".to_string()).with_run_id("run-1")).unwrap();

        let by_run = select_audit_events(&conn, "run-1").unwrap();
        assert_eq!(by_run.len(), 2);
        assert_eq!(by_run[0].get_event_type(), Some(AuditEventType::ActionApplied));

        let by_tx = select_audit_events_by_transaction(&conn, "tx-1").unwrap();
        assert_eq!(by_tx.len(), 1);
        assert_eq!(by_tx[0].get_metadata(), Some(serde_json::json!({"attempts": 1})));
    }
}
