//! The Engine: one serialized state machine over a [`Store`].
//!
//! Every mutating operation takes the write gate, reads the clock once,
//! checks its preconditions against the store, and commits its state writes
//! and audit record(s) as one [`Transaction`]. A failed precondition writes
//! nothing, not even an audit entry. The only operation that audits a
//! refusal is [`Engine::authorize`], whose verdict is itself the record.
//!
//! The operations are split across modules by component:
//!
//! - `registry` - subjects, preferences and actors
//! - `ledger` - consent grants
//! - `workflow` - access requests
//! - `emergency` - emergency overrides
//! - `authorize` - the access decision entry point

use std::sync::Arc;

use consent_kernel_core::{
    Actor, ActorCredentials, AuditAction, AuditEntry, AuditRecord, Clock, EngineSettings,
    Identity, Role, Subject, SystemClock, Timestamp,
};
use consent_kernel_store::{Store, StoreError, StoreExt, Transaction, Write};
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::{EngineError, Missing, Result};

/// The consent and access authorization engine.
pub struct Engine<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
    /// Serializes every operation that commits.
    pub(crate) gate: Mutex<()>,
}

impl<S: Store> Engine<S> {
    /// Create an engine on the system clock.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()), config)
    }

    /// Create an engine on an injected clock.
    pub fn with_clock(store: S, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store: Arc::new(store),
            clock,
            config,
            gate: Mutex::new(()),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current time on the engine clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bootstrap & Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Create the root administrator and persist the initial settings.
    pub async fn initialize(&self, admin: &Identity, credentials: ActorCredentials) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        if self.store.get_settings().await?.is_some() {
            return Err(EngineError::AlreadyExists);
        }
        if self.store.get_actor(admin).await?.is_some() {
            return Err(EngineError::AlreadyExists);
        }

        let mut root = Actor::register(admin.clone(), Role::Admin, credentials, now);
        root.verified = true;
        root.verified_at = Some(now);

        let settings = self.config.initial_settings(admin.clone(), now);
        let tx = Transaction::new()
            .write(Write::Actor(root))
            .write(Write::Settings(settings))
            .audit(
                AuditRecord::new(admin.clone(), AuditAction::Initialized, now)
                    .reason(format!("root admin {}", admin)),
            );
        self.commit(tx).await?;

        tracing::info!(admin = %admin, "engine initialized");
        Ok(())
    }

    /// Persisted settings (`None` before initialization).
    pub async fn settings(&self) -> Result<Option<EngineSettings>> {
        Ok(self.store.get_settings().await?)
    }

    /// Block every mutating operation except [`Engine::unpause`].
    pub async fn pause(&self, caller: &Identity) -> Result<()> {
        self.set_paused(caller, true).await
    }

    /// Lift a pause.
    pub async fn unpause(&self, caller: &Identity) -> Result<()> {
        self.set_paused(caller, false).await
    }

    async fn set_paused(&self, caller: &Identity, paused: bool) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.require_admin(caller).await?;
        let mut settings = self.require_settings().await?;
        if settings.paused == paused {
            return Err(EngineError::AlreadyExists);
        }
        settings.paused = paused;

        let action = if paused {
            AuditAction::Paused
        } else {
            AuditAction::Unpaused
        };
        let tx = Transaction::new()
            .write(Write::Settings(settings))
            .audit(AuditRecord::new(caller.clone(), action, now));
        self.commit(tx).await?;

        tracing::info!(caller = %caller, paused, "pause state changed");
        Ok(())
    }

    /// Set the lifetime of future emergency overrides.
    pub async fn set_emergency_timeout(&self, caller: &Identity, units: Timestamp) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_admin(caller).await?;
        if units == 0 {
            return Err(EngineError::InvalidDuration);
        }

        let mut settings = self.require_settings().await?;
        settings.emergency_timeout = units;
        let tx = Transaction::new()
            .write(Write::Settings(settings))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ConfigUpdated, now)
                    .reason(format!("emergency timeout {}", units)),
            );
        self.commit(tx).await?;

        tracing::info!(caller = %caller, units, "emergency timeout updated");
        Ok(())
    }

    /// Set (or clear) the fallback consent duration.
    pub async fn set_default_consent_duration(
        &self,
        caller: &Identity,
        units: Option<Timestamp>,
    ) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_admin(caller).await?;
        if units == Some(0) {
            return Err(EngineError::InvalidDuration);
        }

        let mut settings = self.require_settings().await?;
        settings.default_consent_duration = units;
        let reason = match units {
            Some(units) => format!("default consent duration {}", units),
            None => "default consent duration cleared".to_string(),
        };
        let tx = Transaction::new()
            .write(Write::Settings(settings))
            .audit(AuditRecord::new(caller.clone(), AuditAction::ConfigUpdated, now).reason(reason));
        self.commit(tx).await?;

        tracing::info!(caller = %caller, ?units, "default consent duration updated");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Trail
    // ─────────────────────────────────────────────────────────────────────────

    /// Every audit entry naming `subject`. Visible to the subject and to
    /// administrators.
    pub async fn audit_trail(&self, caller: &Identity, subject: &Identity) -> Result<Vec<AuditEntry>> {
        self.require_self_or_admin(caller, subject).await?;
        Ok(self.store.audit_for_subject(subject).await?)
    }

    /// Audit entries with `start <= seq <= end`. Administrators only.
    pub async fn audit_range(&self, caller: &Identity, start: u64, end: u64) -> Result<Vec<AuditEntry>> {
        self.require_admin(caller).await?;
        Ok(self.store.audit_range(start, end).await?)
    }

    /// Walk the whole audit chain. Returns the number of entries verified.
    pub async fn verify_audit_trail(&self) -> Result<u64> {
        match self.store.verify_audit_chain().await {
            Ok(count) => Ok(count),
            Err(StoreError::Core(err)) => {
                tracing::error!(error = %err, "audit chain verification failed");
                Err(EngineError::Core(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared Preconditions
    // ─────────────────────────────────────────────────────────────────────────

    /// The caller must be a verified, active administrator.
    pub(crate) async fn require_admin(&self, caller: &Identity) -> Result<Actor> {
        match self.store.get_actor(caller).await? {
            Some(actor) if actor.is_admin() => Ok(actor),
            _ => {
                tracing::warn!(caller = %caller, "administrative operation refused");
                Err(EngineError::Unauthorized)
            }
        }
    }

    /// The caller must be `subject` itself or an administrator.
    pub(crate) async fn require_self_or_admin(&self, caller: &Identity, subject: &Identity) -> Result<()> {
        if caller == subject {
            return Ok(());
        }
        self.require_admin(caller).await.map(|_| ())
    }

    /// Settings exist once the engine is initialized. Before that no
    /// administrator exists either, so nobody is authorized.
    pub(crate) async fn require_settings(&self) -> Result<EngineSettings> {
        self.store
            .get_settings()
            .await?
            .ok_or(EngineError::Unauthorized)
    }

    /// The subject must exist and must not be marked deceased.
    pub(crate) async fn require_living_subject(&self, subject: &Identity) -> Result<Subject> {
        let record = self
            .store
            .get_subject(subject)
            .await?
            .ok_or(EngineError::NotFound(Missing::Subject))?;
        if record.deceased {
            tracing::warn!(subject = %subject, "operation on deceased subject refused");
            return Err(EngineError::PatientDeceased);
        }
        Ok(record)
    }

    pub(crate) async fn ensure_unpaused(&self) -> Result<()> {
        let paused = self
            .store
            .get_settings()
            .await?
            .map_or(false, |s| s.paused);
        if paused {
            tracing::warn!("mutation refused while paused");
            return Err(EngineError::SystemPaused);
        }
        Ok(())
    }

    pub(crate) async fn emergency_timeout(&self) -> Result<Timestamp> {
        Ok(self
            .store
            .get_settings()
            .await?
            .map_or(self.config.emergency_timeout, |s| s.emergency_timeout))
    }

    pub(crate) async fn default_consent_duration(&self) -> Result<Option<Timestamp>> {
        Ok(self
            .store
            .get_settings()
            .await?
            .map_or(self.config.default_consent_duration, |s| s.default_consent_duration))
    }

    pub(crate) async fn commit(&self, tx: Transaction) -> Result<Vec<AuditEntry>> {
        Ok(self.store.commit(tx).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use consent_kernel_core::ManualClock;
    use consent_kernel_store::MemoryStore;

    fn engine() -> (Engine<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let engine = Engine::with_clock(MemoryStore::new(), clock.clone(), EngineConfig::default());
        (engine, clock)
    }

    #[tokio::test]
    async fn test_initialize_once() {
        let (engine, _) = engine();
        let root = Identity::new("root");
        engine.initialize(&root, ActorCredentials::default()).await.unwrap();

        let actor = engine.store().get_actor(&root).await.unwrap().unwrap();
        assert!(actor.is_admin());
        assert_eq!(engine.settings().await.unwrap().unwrap().emergency_timeout, 72);

        let err = engine
            .initialize(&Identity::new("other"), ActorCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(engine.verify_audit_trail().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pause_is_admin_only_and_not_idempotent() {
        let (engine, _) = engine();
        let root = Identity::new("root");
        engine.initialize(&root, ActorCredentials::default()).await.unwrap();

        let err = engine.pause(&Identity::new("mallory")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        engine.pause(&root).await.unwrap();
        assert_eq!(engine.pause(&root).await.unwrap_err().kind(), ErrorKind::AlreadyExists);

        let err = engine.set_emergency_timeout(&root, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);

        engine.unpause(&root).await.unwrap();
        engine.set_emergency_timeout(&root, 10).await.unwrap();
        assert_eq!(engine.settings().await.unwrap().unwrap().emergency_timeout, 10);
    }

    #[tokio::test]
    async fn test_pause_is_reported_before_authority() {
        let (engine, _) = engine();
        let root = Identity::new("root");
        let mallory = Identity::new("mallory");
        engine.initialize(&root, ActorCredentials::default()).await.unwrap();
        engine.pause(&root).await.unwrap();

        let err = engine.set_emergency_timeout(&mallory, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);
        let err = engine
            .set_default_consent_duration(&mallory, Some(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);

        // Unpause itself stays admin-only.
        let err = engine.unpause(&mallory).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_zero_durations_rejected() {
        let (engine, _) = engine();
        let root = Identity::new("root");
        engine.initialize(&root, ActorCredentials::default()).await.unwrap();

        let err = engine.set_emergency_timeout(&root, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDuration);
        let err = engine
            .set_default_consent_duration(&root, Some(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDuration);

        engine.set_default_consent_duration(&root, Some(30)).await.unwrap();
        engine.set_default_consent_duration(&root, None).await.unwrap();
        assert_eq!(
            engine.settings().await.unwrap().unwrap().default_consent_duration,
            None
        );
    }

    #[tokio::test]
    async fn test_audit_range_is_admin_only() {
        let (engine, clock) = engine();
        let root = Identity::new("root");
        engine.initialize(&root, ActorCredentials::default()).await.unwrap();
        clock.advance(5);
        engine.set_emergency_timeout(&root, 24).await.unwrap();

        let entries = engine.audit_range(&root, 1, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].record.timestamp, 5);
        assert_eq!(entries[1].record.action, AuditAction::ConfigUpdated);

        let err = engine
            .audit_range(&Identity::new("nobody"), 1, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
