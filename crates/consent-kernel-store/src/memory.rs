//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use consent_kernel_core::{
    AccessRequest, Actor, AuditEntry, ConsentGrant, ConsentKey, EmergencyOverride,
    EngineSettings, GrantId, Identity, OverrideKey, RequestId, Subject, SubjectPreferences,
};

use crate::error::{Result, StoreError};
use crate::traits::{Store, Transaction, Write};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    subjects: HashMap<Identity, Subject>,
    preferences: HashMap<Identity, SubjectPreferences>,
    actors: HashMap<Identity, Actor>,

    /// Ordered so per-subject listings come out sorted by key.
    consents: BTreeMap<ConsentKey, ConsentGrant>,
    requests: BTreeMap<RequestId, AccessRequest>,
    overrides: BTreeMap<OverrideKey, EmergencyOverride>,

    settings: Option<EngineSettings>,

    /// Index `i` holds the entry with seq `i + 1`.
    audit: Vec<AuditEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_subject(&self, id: &Identity) -> Result<Option<Subject>> {
        Ok(self.read()?.subjects.get(id).cloned())
    }

    async fn get_preferences(&self, id: &Identity) -> Result<Option<SubjectPreferences>> {
        Ok(self.read()?.preferences.get(id).cloned())
    }

    async fn get_actor(&self, id: &Identity) -> Result<Option<Actor>> {
        Ok(self.read()?.actors.get(id).cloned())
    }

    async fn get_consent(&self, key: &ConsentKey) -> Result<Option<ConsentGrant>> {
        Ok(self.read()?.consents.get(key).cloned())
    }

    async fn list_consents(&self, subject: &Identity) -> Result<Vec<ConsentGrant>> {
        let inner = self.read()?;
        Ok(inner
            .consents
            .values()
            .filter(|grant| &grant.key.subject == subject)
            .cloned()
            .collect())
    }

    async fn next_grant_id(&self) -> Result<GrantId> {
        let inner = self.read()?;
        let max = inner.consents.values().map(|g| g.id.0).max().unwrap_or(0);
        Ok(GrantId(max + 1))
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<AccessRequest>> {
        Ok(self.read()?.requests.get(&id).cloned())
    }

    async fn list_requests(&self, subject: &Identity) -> Result<Vec<AccessRequest>> {
        let inner = self.read()?;
        Ok(inner
            .requests
            .values()
            .filter(|request| &request.subject == subject)
            .cloned()
            .collect())
    }

    async fn next_request_id(&self) -> Result<RequestId> {
        let inner = self.read()?;
        let max = inner.requests.keys().next_back().map(|id| id.0).unwrap_or(0);
        Ok(RequestId(max + 1))
    }

    async fn list_overrides(
        &self,
        subject: &Identity,
        actor: Option<&Identity>,
    ) -> Result<Vec<EmergencyOverride>> {
        let inner = self.read()?;
        // Key order is (subject, actor, activated_at).
        Ok(inner
            .overrides
            .values()
            .filter(|o| &o.key.subject == subject)
            .filter(|o| actor.map_or(true, |a| &o.key.actor == a))
            .cloned()
            .collect())
    }

    async fn get_settings(&self) -> Result<Option<EngineSettings>> {
        Ok(self.read()?.settings.clone())
    }

    async fn audit_head(&self) -> Result<Option<AuditEntry>> {
        Ok(self.read()?.audit.last().cloned())
    }

    async fn audit_range(&self, start: u64, end: u64) -> Result<Vec<AuditEntry>> {
        let inner = self.read()?;
        Ok(inner
            .audit
            .iter()
            .filter(|entry| entry.seq >= start && entry.seq <= end)
            .cloned()
            .collect())
    }

    async fn audit_for_subject(&self, subject: &Identity) -> Result<Vec<AuditEntry>> {
        let inner = self.read()?;
        Ok(inner
            .audit
            .iter()
            .filter(|entry| entry.record.subject.as_ref() == Some(subject))
            .cloned()
            .collect())
    }

    async fn commit(&self, tx: Transaction) -> Result<Vec<AuditEntry>> {
        let mut inner = self.write()?;

        // Seal first: it is the only step that can fail, so nothing below
        // runs unless the whole transaction will apply.
        let mut sealed: Vec<AuditEntry> = Vec::with_capacity(tx.audit.len());
        for record in tx.audit {
            let entry = AuditEntry::seal_after(sealed.last().or(inner.audit.last()), record)?;
            sealed.push(entry);
        }

        for write in tx.writes {
            match write {
                Write::Subject(subject) => {
                    inner.subjects.insert(subject.id.clone(), subject);
                }
                Write::Preferences(id, prefs) => {
                    inner.preferences.insert(id, prefs);
                }
                Write::Actor(actor) => {
                    inner.actors.insert(actor.id.clone(), actor);
                }
                Write::Consent(grant) => {
                    inner.consents.insert(grant.key.clone(), grant);
                }
                Write::Request(request) => {
                    inner.requests.insert(request.id, request);
                }
                Write::Override(o) => {
                    inner.overrides.insert(o.key.clone(), o);
                }
                Write::Settings(settings) => {
                    inner.settings = Some(settings);
                }
            }
        }

        inner.audit.extend(sealed.iter().cloned());
        Ok(sealed)
    }
}
