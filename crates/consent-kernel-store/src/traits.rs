//! Store trait: the abstract interface for engine persistence.
//!
//! This trait allows the engine to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).
//!
//! Reads are individual lookups. All writes go through [`Store::commit`],
//! which applies a [`Transaction`] atomically: the state writes and the audit
//! records that describe them persist together or not at all.

use std::future::Future;

use async_trait::async_trait;
use consent_kernel_core::{
    verify_chain, AccessRequest, Actor, AuditEntry, AuditRecord, ConsentGrant, ConsentKey,
    EmergencyOverride, EngineSettings, GrantId, Identity, RequestId, Subject, SubjectPreferences,
};

use crate::error::Result;

/// A single state write. Every write is an upsert of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Subject(Subject),
    Preferences(Identity, SubjectPreferences),
    Actor(Actor),
    Consent(ConsentGrant),
    Request(AccessRequest),
    Override(EmergencyOverride),
    Settings(EngineSettings),
}

/// A batch of writes plus the audit records that describe them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub writes: Vec<Write>,
    pub audit: Vec<AuditRecord>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state write.
    pub fn write(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    /// Add an audit record. Records are sequenced in the order added.
    pub fn audit(mut self, record: AuditRecord) -> Self {
        self.audit.push(record);
        self
    }

    /// Whether the transaction would change nothing.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.audit.is_empty()
    }
}

/// The Store trait: async interface for engine persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Atomic commits**: a [`Transaction`] is applied all-or-nothing.
/// - **Store-assigned sequence**: the store seals audit records, assigning
///   the next sequence number and the hash link inside the commit, so the
///   audit order always matches commit order.
/// - **No deletes**: nothing the engine writes is ever removed.
/// - **Id allocation**: `next_grant_id` / `next_request_id` return one past
///   the largest id stored. Callers serialize allocate-then-commit.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a subject profile.
    async fn get_subject(&self, id: &Identity) -> Result<Option<Subject>>;

    /// Get a subject's preferences.
    async fn get_preferences(&self, id: &Identity) -> Result<Option<SubjectPreferences>>;

    /// Get an actor.
    async fn get_actor(&self, id: &Identity) -> Result<Option<Actor>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Consent Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the grant stored under a key.
    async fn get_consent(&self, key: &ConsentKey) -> Result<Option<ConsentGrant>>;

    /// All grants a subject has ever given, ordered by key.
    async fn list_consents(&self, subject: &Identity) -> Result<Vec<ConsentGrant>>;

    /// The id to use for the next grant.
    async fn next_grant_id(&self) -> Result<GrantId>;

    // ─────────────────────────────────────────────────────────────────────────
    // Access Requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a request by id.
    async fn get_request(&self, id: RequestId) -> Result<Option<AccessRequest>>;

    /// All requests concerning a subject, ordered by id.
    async fn list_requests(&self, subject: &Identity) -> Result<Vec<AccessRequest>>;

    /// The id to use for the next request.
    async fn next_request_id(&self) -> Result<RequestId>;

    // ─────────────────────────────────────────────────────────────────────────
    // Emergency Overrides
    // ─────────────────────────────────────────────────────────────────────────

    /// Overrides for a subject, optionally narrowed to one actor, ordered by
    /// (actor, activation time).
    async fn list_overrides(
        &self,
        subject: &Identity,
        actor: Option<&Identity>,
    ) -> Result<Vec<EmergencyOverride>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the persisted settings (`None` before initialization).
    async fn get_settings(&self) -> Result<Option<EngineSettings>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Trail
    // ─────────────────────────────────────────────────────────────────────────

    /// The most recent audit entry.
    async fn audit_head(&self) -> Result<Option<AuditEntry>>;

    /// Audit entries with `start <= seq <= end`, ordered by seq.
    async fn audit_range(&self, start: u64, end: u64) -> Result<Vec<AuditEntry>>;

    /// Audit entries naming a subject, ordered by seq.
    async fn audit_for_subject(&self, subject: &Identity) -> Result<Vec<AuditEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a transaction atomically and return the sealed audit entries.
    async fn commit(&self, tx: Transaction) -> Result<Vec<AuditEntry>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Walk the whole audit chain and check every link.
    ///
    /// Returns the number of entries verified.
    fn verify_audit_chain(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Grants between one subject and one actor, across all categories.
    fn consents_between(
        &self,
        subject: &Identity,
        actor: &Identity,
    ) -> impl Future<Output = Result<Vec<ConsentGrant>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn verify_audit_chain(&self) -> Result<u64> {
        let entries = self.audit_range(1, u64::MAX).await?;
        verify_chain(None, &entries)?;
        Ok(entries.len() as u64)
    }

    async fn consents_between(&self, subject: &Identity, actor: &Identity) -> Result<Vec<ConsentGrant>> {
        let mut grants = self.list_consents(subject).await?;
        grants.retain(|grant| &grant.key.actor == actor);
        Ok(grants)
    }
}
