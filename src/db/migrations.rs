use rusqlite::Connection;
use anyhow::{Result, Context};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Index creation statements, safe to run on every open
const INDEX_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_scope_results_run_id ON scope_results(run_id);
CREATE INDEX IF NOT EXISTS idx_snapshots_scope ON snapshots(scope_kind, scope_id, id);
CREATE INDEX IF NOT EXISTS idx_transactions_run_id ON transactions(run_id);
CREATE INDEX IF NOT EXISTS idx_transaction_actions_tx ON transaction_actions(transaction_id);
CREATE INDEX IF NOT EXISTS idx_audit_events_run_id ON audit_events(run_id);
CREATE INDEX IF NOT EXISTS idx_audit_events_type ON audit_events(event_type);
";

/// Current schema version written by `run_migrations`
pub const SCHEMA_VERSION: i64 = 2;

/// Get current database schema version
pub fn get_schema_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to get schema version")?;
    Ok(version)
}

/// Set database schema version
fn set_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(&format!("PRAGMA user_version = {}", version), [])
        .context("Failed to set schema version")?;
    Ok(())
}

/// v0 (empty) to v1: all tables
fn migrate_to_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .context("Failed to execute v1 schema migration")?;
    Ok(())
}

/// v1 to v2: lookup indexes for drift queries and per-run listings
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(INDEX_SQL)
        .context("Failed to create v2 indexes")?;
    Ok(())
}

/// Run all pending migrations. Safe to call on every open.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_to_v1(conn)?;
        set_schema_version(conn, 1)?;
    }

    if current_version < 2 {
        migrate_to_v2(conn)?;
        set_schema_version(conn, 2)?;
    }

    Ok(())
}
