//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the Consent Kernel. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! Lookup keys live in columns; each record is stored whole as a CBOR body.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Params};
use serde::de::DeserializeOwned;
use serde::Serialize;

use consent_kernel_core::{
    AccessRequest, Actor, AuditEntry, ConsentGrant, ConsentKey, EmergencyOverride,
    EngineSettings, GrantId, Identity, RequestId, Subject, SubjectPreferences,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Store, Transaction, Write};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// SQLite integers are signed 64-bit.
fn to_sql_int(n: u64, what: &str) -> Result<i64> {
    i64::try_from(n).map_err(|_| {
        StoreError::InvalidData(format!("{} {} exceeds the SQLite integer range", what, n))
    })
}

/// Clamp a bound for range queries.
fn clamp_bound(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn load_one<T: DeserializeOwned, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    let body: Option<Vec<u8>> = conn.query_row(sql, params, |row| row.get(0)).optional()?;
    body.map(|b| decode(&b)).transpose()
}

fn load_many<T: DeserializeOwned, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(params, |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    bodies.iter().map(|b| decode(b)).collect()
}

fn next_id(conn: &Connection, sql: &str) -> Result<u64> {
    let max: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(max as u64 + 1)
}

fn apply_write(conn: &Connection, write: &Write) -> Result<()> {
    match write {
        Write::Subject(subject) => {
            conn.execute(
                "INSERT INTO subjects (subject_id, body) VALUES (?1, ?2)
                 ON CONFLICT(subject_id) DO UPDATE SET body = excluded.body",
                params![subject.id.as_str(), encode(subject)?],
            )?;
        }
        Write::Preferences(id, prefs) => {
            conn.execute(
                "INSERT INTO subject_preferences (subject_id, body) VALUES (?1, ?2)
                 ON CONFLICT(subject_id) DO UPDATE SET body = excluded.body",
                params![id.as_str(), encode(prefs)?],
            )?;
        }
        Write::Actor(actor) => {
            conn.execute(
                "INSERT INTO actors (actor_id, body) VALUES (?1, ?2)
                 ON CONFLICT(actor_id) DO UPDATE SET body = excluded.body",
                params![actor.id.as_str(), encode(actor)?],
            )?;
        }
        Write::Consent(grant) => {
            conn.execute(
                "INSERT INTO consents (subject_id, actor_id, category, grant_id, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(subject_id, actor_id, category)
                 DO UPDATE SET grant_id = excluded.grant_id, body = excluded.body",
                params![
                    grant.key.subject.as_str(),
                    grant.key.actor.as_str(),
                    grant.key.category.as_str(),
                    to_sql_int(grant.id.0, "grant id")?,
                    encode(grant)?,
                ],
            )?;
        }
        Write::Request(request) => {
            conn.execute(
                "INSERT INTO access_requests (request_id, subject_id, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(request_id) DO UPDATE SET body = excluded.body",
                params![
                    to_sql_int(request.id.0, "request id")?,
                    request.subject.as_str(),
                    encode(request)?,
                ],
            )?;
        }
        Write::Override(o) => {
            conn.execute(
                "INSERT INTO emergency_overrides (subject_id, actor_id, activated_at, body)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(subject_id, actor_id, activated_at) DO UPDATE SET body = excluded.body",
                params![
                    o.key.subject.as_str(),
                    o.key.actor.as_str(),
                    to_sql_int(o.key.activated_at, "activation time")?,
                    encode(o)?,
                ],
            )?;
        }
        Write::Settings(settings) => {
            conn.execute(
                "INSERT INTO settings (id, body) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body",
                params![encode(settings)?],
            )?;
        }
    }
    Ok(())
}

fn insert_audit(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (seq, subject_id, actor_id, action, hash, prev_hash, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            to_sql_int(entry.seq, "audit seq")?,
            entry.record.subject.as_ref().map(|s| s.as_str()),
            entry.record.actor.as_str(),
            entry.record.action.as_str(),
            entry.hash.as_bytes().as_slice(),
            entry.prev_hash.as_bytes().as_slice(),
            encode(entry)?,
        ],
    )?;
    Ok(())
}

const AUDIT_HEAD_SQL: &str = "SELECT body FROM audit_log ORDER BY seq DESC LIMIT 1";

#[async_trait]
impl Store for SqliteStore {
    async fn get_subject(&self, id: &Identity) -> Result<Option<Subject>> {
        let id = id.as_str().to_string();
        self.run(move |conn| {
            load_one(conn, "SELECT body FROM subjects WHERE subject_id = ?1", params![id])
        })
        .await
    }

    async fn get_preferences(&self, id: &Identity) -> Result<Option<SubjectPreferences>> {
        let id = id.as_str().to_string();
        self.run(move |conn| {
            load_one(
                conn,
                "SELECT body FROM subject_preferences WHERE subject_id = ?1",
                params![id],
            )
        })
        .await
    }

    async fn get_actor(&self, id: &Identity) -> Result<Option<Actor>> {
        let id = id.as_str().to_string();
        self.run(move |conn| {
            load_one(conn, "SELECT body FROM actors WHERE actor_id = ?1", params![id])
        })
        .await
    }

    async fn get_consent(&self, key: &ConsentKey) -> Result<Option<ConsentGrant>> {
        let key = key.clone();
        self.run(move |conn| {
            load_one(
                conn,
                "SELECT body FROM consents
                 WHERE subject_id = ?1 AND actor_id = ?2 AND category = ?3",
                params![key.subject.as_str(), key.actor.as_str(), key.category.as_str()],
            )
        })
        .await
    }

    async fn list_consents(&self, subject: &Identity) -> Result<Vec<ConsentGrant>> {
        let subject = subject.as_str().to_string();
        let mut grants: Vec<ConsentGrant> = self
            .run(move |conn| {
                load_many(
                    conn,
                    "SELECT body FROM consents WHERE subject_id = ?1",
                    params![subject],
                )
            })
            .await?;
        // Category text order differs from enum order.
        grants.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(grants)
    }

    async fn next_grant_id(&self) -> Result<GrantId> {
        self.run(|conn| next_id(conn, "SELECT COALESCE(MAX(grant_id), 0) FROM consents"))
            .await
            .map(GrantId)
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<AccessRequest>> {
        let id = clamp_bound(id.0);
        self.run(move |conn| {
            load_one(
                conn,
                "SELECT body FROM access_requests WHERE request_id = ?1",
                params![id],
            )
        })
        .await
    }

    async fn list_requests(&self, subject: &Identity) -> Result<Vec<AccessRequest>> {
        let subject = subject.as_str().to_string();
        self.run(move |conn| {
            load_many(
                conn,
                "SELECT body FROM access_requests WHERE subject_id = ?1 ORDER BY request_id",
                params![subject],
            )
        })
        .await
    }

    async fn next_request_id(&self) -> Result<RequestId> {
        self.run(|conn| {
            next_id(
                conn,
                "SELECT COALESCE(MAX(request_id), 0) FROM access_requests",
            )
        })
        .await
        .map(RequestId)
    }

    async fn list_overrides(
        &self,
        subject: &Identity,
        actor: Option<&Identity>,
    ) -> Result<Vec<EmergencyOverride>> {
        let subject = subject.as_str().to_string();
        let actor = actor.map(|a| a.as_str().to_string());
        self.run(move |conn| match actor {
            Some(actor) => load_many(
                conn,
                "SELECT body FROM emergency_overrides
                 WHERE subject_id = ?1 AND actor_id = ?2
                 ORDER BY activated_at",
                params![subject, actor],
            ),
            None => load_many(
                conn,
                "SELECT body FROM emergency_overrides
                 WHERE subject_id = ?1
                 ORDER BY actor_id, activated_at",
                params![subject],
            ),
        })
        .await
    }

    async fn get_settings(&self) -> Result<Option<EngineSettings>> {
        self.run(|conn| load_one(conn, "SELECT body FROM settings WHERE id = 1", []))
            .await
    }

    async fn audit_head(&self) -> Result<Option<AuditEntry>> {
        self.run(|conn| load_one(conn, AUDIT_HEAD_SQL, [])).await
    }

    async fn audit_range(&self, start: u64, end: u64) -> Result<Vec<AuditEntry>> {
        let (start, end) = (clamp_bound(start), clamp_bound(end));
        self.run(move |conn| {
            load_many(
                conn,
                "SELECT body FROM audit_log WHERE seq >= ?1 AND seq <= ?2 ORDER BY seq",
                params![start, end],
            )
        })
        .await
    }

    async fn audit_for_subject(&self, subject: &Identity) -> Result<Vec<AuditEntry>> {
        let subject = subject.as_str().to_string();
        self.run(move |conn| {
            load_many(
                conn,
                "SELECT body FROM audit_log WHERE subject_id = ?1 ORDER BY seq",
                params![subject],
            )
        })
        .await
    }

    async fn commit(&self, tx: Transaction) -> Result<Vec<AuditEntry>> {
        let Transaction { writes, audit } = tx;

        self.run(move |conn| {
            let db = conn.transaction()?;

            for write in &writes {
                apply_write(&db, write)?;
            }

            let mut prev: Option<AuditEntry> = load_one(&db, AUDIT_HEAD_SQL, [])?;
            let mut sealed = Vec::with_capacity(audit.len());
            for record in audit {
                let entry = AuditEntry::seal_after(prev.as_ref(), record)?;
                insert_audit(&db, &entry)?;
                prev = Some(entry.clone());
                sealed.push(entry);
            }

            db.commit()?;
            tracing::debug!(
                writes = writes.len(),
                audited = sealed.len(),
                head = sealed.last().map(|e| e.seq),
                "committed transaction"
            );
            Ok(sealed)
        })
        .await
    }
}
