//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an initialized engine on a
//! manual clock, plus shortcuts for registering subjects and verified actors.

use std::sync::{Arc, Once};

use consent_kernel::{Engine, EngineConfig, GrantConsent};
use consent_kernel_core::{
    ActorCredentials, ConsentGrant, DataCategory, Identity, ManualClock, Role, SubjectRegistration,
    Timestamp,
};
use consent_kernel_store::{MemoryStore, SqliteStore, Store};

/// Handle of the root administrator every fixture is initialized with.
pub const ROOT_ADMIN: &str = "root";

/// An initialized engine on a manual clock starting at 0.
pub struct TestFixture<S: Store = MemoryStore> {
    pub engine: Engine<S>,
    pub clock: Arc<ManualClock>,
    pub root: Identity,
}

impl TestFixture<MemoryStore> {
    /// Fixture over an in-memory store.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_store(MemoryStore::new(), EngineConfig::default()).await
    }
}

impl TestFixture<SqliteStore> {
    /// Fixture over an in-memory SQLite database.
    pub async fn sqlite() -> anyhow::Result<Self> {
        Self::with_store(SqliteStore::open_memory()?, EngineConfig::default()).await
    }
}

impl<S: Store> TestFixture<S> {
    /// Fixture over any store, initialized with the root administrator.
    pub async fn with_store(store: S, config: EngineConfig) -> anyhow::Result<Self> {
        init_tracing();
        let clock = Arc::new(ManualClock::new(0));
        let engine = Engine::with_clock(store, clock.clone(), config);
        let root = Identity::new(ROOT_ADMIN);
        engine.initialize(&root, ActorCredentials::default()).await?;
        Ok(Self { engine, clock, root })
    }

    /// Move the clock to `t`.
    pub fn at(&self, t: Timestamp) -> &Self {
        self.clock.set(t);
        self
    }

    /// Register a subject with placeholder attributes.
    pub async fn subject(&self, handle: &str) -> anyhow::Result<Identity> {
        let id = Identity::new(handle);
        self.engine
            .register_subject(&id, SubjectRegistration::born("1970-01-01"))
            .await?;
        Ok(id)
    }

    /// Register and verify an actor.
    pub async fn actor(&self, handle: &str, role: Role) -> anyhow::Result<Identity> {
        let id = Identity::new(handle);
        self.engine
            .register_actor(
                &self.root,
                &id,
                role,
                ActorCredentials::new(format!("LIC-{}", handle), "General Hospital"),
            )
            .await?;
        self.engine.verify_actor(&self.root, &id).await?;
        Ok(id)
    }

    /// Grant consent with an explicit duration (`None` for the fallback
    /// chain).
    pub async fn grant(
        &self,
        subject: &Identity,
        actor: &Identity,
        category: DataCategory,
        duration: Option<Timestamp>,
    ) -> anyhow::Result<ConsentGrant> {
        let mut params = GrantConsent::new(actor.clone(), category).purpose("treatment");
        params.duration = duration;
        Ok(self.engine.grant_consent(subject, params).await?)
    }

    /// Number of audit entries written so far.
    pub async fn audit_len(&self) -> anyhow::Result<u64> {
        Ok(self.engine.store().audit_head().await?.map_or(0, |e| e.seq))
    }
}

/// Install a test-friendly `tracing` subscriber once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}
