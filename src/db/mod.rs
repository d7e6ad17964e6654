use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use anyhow::{Result, Context};

pub mod migrations;
pub mod queries;

pub use migrations::run_migrations;
pub use queries::*;

use crate::models::{
    ActionRecord, AuditEvent, RemediationMode, RemediationTransaction, Scope, SettingSnapshot,
    SiteAuditResult, TransactionState,
};

/// Database file name inside the data directory
pub const DB_FILE: &str = "posture.db";

/// Path of the database inside `data_dir`, creating the directory if needed
pub fn get_db_path(data_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)
        .context(format!("Failed to create data directory: {:?}", data_dir))?;

    Ok(data_dir.join(DB_FILE))
}

/// Open a connection and bring its schema up to date
pub fn init_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .context(format!("Failed to open database at {:?}", db_path))?;

    configure(&conn)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("Failed to enable WAL mode")?;

    run_migrations(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;

    conn.busy_timeout(std::time::Duration::from_secs(5))
        .context("Failed to set busy timeout")?;

    Ok(())
}

/// Handle to the audit trail database.
///
/// Cloning shares one connection. Calls are short synchronous statements, so
/// the lock is never held across an await point.
#[derive(Clone)]
pub struct AuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl AuditStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = get_db_path(data_dir)?;
        let conn = init_db(&path)?;
        tracing::debug!(path = %path.display(), "Opened audit store");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        configure(&conn)?;
        run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn begin_run(&self, run_id: &str, baseline: &str, version: &str, mode: RemediationMode) -> Result<()> {
        queries::insert_audit_run(&self.conn(), run_id, baseline, version, mode)
    }

    pub fn complete_run(&self, run_id: &str, scope_count: usize, aggregate_score: Option<u8>) -> Result<()> {
        queries::complete_audit_run(&self.conn(), run_id, scope_count, aggregate_score)
    }

    pub fn record_scope_result(&self, run_id: &str, result: &SiteAuditResult) -> Result<i64> {
        queries::insert_scope_result(&self.conn(), run_id, result)
    }

    pub fn record_snapshot(&self, run_id: &str, snapshot: &SettingSnapshot) -> Result<i64> {
        queries::insert_snapshot(&self.conn(), run_id, snapshot)
    }

    pub fn latest_snapshot(&self, scope: &Scope, excluding_run: Option<&str>) -> Result<Option<SettingSnapshot>> {
        queries::select_latest_snapshot(&self.conn(), scope, excluding_run)
    }

    pub fn begin_transaction(&self, run_id: Option<&str>, tx: &RemediationTransaction) -> Result<()> {
        queries::insert_transaction(&self.conn(), run_id, tx)
    }

    /// Close a transaction and store its per-action records in one SQL transaction
    pub fn close_transaction(&self, tx_id: &str, state: TransactionState, records: &[ActionRecord]) -> Result<()> {
        let mut conn = self.conn();
        let sql_tx = conn.transaction().context("Failed to begin SQL transaction")?;
        queries::update_transaction_state(&sql_tx, tx_id, state)?;
        for (position, record) in records.iter().enumerate() {
            queries::insert_transaction_action(&sql_tx, tx_id, position, record)?;
        }
        sql_tx.commit().context("Failed to commit transaction records")?;
        Ok(())
    }

    pub fn transaction_state(&self, tx_id: &str) -> Result<Option<TransactionState>> {
        queries::select_transaction_state(&self.conn(), tx_id)
    }

    pub fn transaction_actions(&self, tx_id: &str) -> Result<Vec<ActionRecord>> {
        queries::select_transaction_actions(&self.conn(), tx_id)
    }

    pub fn record_event(&self, event: &AuditEvent) -> Result<i64> {
        queries::insert_audit_event(&self.conn(), event)
    }

    pub fn events_for_run(&self, run_id: &str) -> Result<Vec<AuditEvent>> {
        queries::select_audit_events(&self.conn(), run_id)
    }

    pub fn events_for_transaction(&self, tx_id: &str) -> Result<Vec<AuditEvent>> {
        queries::select_audit_events_by_transaction(&self.conn(), tx_id)
    }

    pub fn scope_results(&self, run_id: &str) -> Result<Vec<ScopeResultRecord>> {
        queries::select_scope_results(&self.conn(), run_id)
    }

    pub fn run(&self, run_id: &str) -> Result<Option<AuditRunRecord>> {
        queries::select_audit_run(&self.conn(), run_id)
    }
}
