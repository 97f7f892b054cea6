//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_secs()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Every table keeps its lookup keys in columns and the full record as a
/// CBOR `body`.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE subjects (
            subject_id TEXT PRIMARY KEY,
            body BLOB NOT NULL
        );

        CREATE TABLE subject_preferences (
            subject_id TEXT PRIMARY KEY,
            body BLOB NOT NULL
        );

        CREATE TABLE actors (
            actor_id TEXT PRIMARY KEY,
            body BLOB NOT NULL
        );

        -- At most one grant per (subject, actor, category); regrants overwrite.
        CREATE TABLE consents (
            subject_id TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            category TEXT NOT NULL,
            grant_id INTEGER NOT NULL,
            body BLOB NOT NULL,
            PRIMARY KEY (subject_id, actor_id, category)
        );

        CREATE TABLE access_requests (
            request_id INTEGER PRIMARY KEY,
            subject_id TEXT NOT NULL,
            body BLOB NOT NULL
        );

        CREATE TABLE emergency_overrides (
            subject_id TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            activated_at INTEGER NOT NULL,
            body BLOB NOT NULL,
            PRIMARY KEY (subject_id, actor_id, activated_at)
        );

        -- Single row, id = 1.
        CREATE TABLE settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            body BLOB NOT NULL
        );

        CREATE TABLE audit_log (
            seq INTEGER PRIMARY KEY,
            subject_id TEXT,
            actor_id TEXT NOT NULL,
            action TEXT NOT NULL,
            hash BLOB NOT NULL,
            prev_hash BLOB NOT NULL,
            body BLOB NOT NULL
        );

        CREATE TRIGGER audit_log_no_update BEFORE UPDATE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;

        CREATE TRIGGER audit_log_no_delete BEFORE DELETE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;

        CREATE INDEX idx_consents_grant_id ON consents(grant_id);
        CREATE INDEX idx_access_requests_subject ON access_requests(subject_id);
        CREATE INDEX idx_audit_log_subject ON audit_log(subject_id);
        "#,
    )?;

    Ok(())
}

/// Wall-clock seconds, only used to stamp applied migrations.
fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
