//! Consent Ledger: grants, revocations, and their lifecycle.
//!
//! The subject is always the caller. Expiry is lazy: nothing here ever
//! flips a stored status to expired.

use consent_kernel_core::{
    AuditAction, AuditRecord, ConsentGrant, ConsentKey, ConsentStatus, DataCategory, Identity,
    Timestamp,
};
use consent_kernel_perms::role_allows;
use consent_kernel_store::{Store, Transaction, Write};

use crate::engine::Engine;
use crate::error::{EngineError, Missing, Result};

/// Parameters of a new grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantConsent {
    pub actor: Identity,
    pub category: DataCategory,
    /// `None` falls back to the subject's auto-expire preference, then to
    /// the engine default.
    pub duration: Option<Timestamp>,
    pub purpose: String,
    pub restrictions: Option<String>,
}

impl GrantConsent {
    pub fn new(actor: Identity, category: DataCategory) -> Self {
        Self {
            actor,
            category,
            duration: None,
            purpose: String::new(),
            restrictions: None,
        }
    }

    pub fn duration(mut self, duration: Timestamp) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn restrictions(mut self, restrictions: impl Into<String>) -> Self {
        self.restrictions = Some(restrictions.into());
        self
    }
}

impl<S: Store> Engine<S> {
    /// Grant `params.actor` access to one category of the caller's data.
    ///
    /// Overwrites any existing grant for the same key with a fresh, active
    /// grant under a new id.
    pub async fn grant_consent(&self, caller: &Identity, params: GrantConsent) -> Result<ConsentGrant> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_living_subject(caller).await?;
        let actor = self
            .store
            .get_actor(&params.actor)
            .await?
            .ok_or(EngineError::NotFound(Missing::Actor))?;
        if !role_allows(actor.role, params.category) {
            tracing::warn!(
                subject = %caller,
                actor = %actor.id,
                role = %actor.role,
                category = %params.category,
                "grant exceeds role ceiling"
            );
            return Err(EngineError::InsufficientPermissions);
        }

        let duration = self.resolve_duration(caller, params.duration).await?;
        let id = self.store.next_grant_id().await?;
        let key = ConsentKey::new(caller.clone(), params.actor, params.category);
        let grant = ConsentGrant::new(id, key, now, duration, params.purpose, params.restrictions);

        let reason = match grant.expires_at {
            Some(expires) => format!("{} until {}", grant.id, expires),
            None => format!("{} indefinite", grant.id),
        };
        let tx = Transaction::new()
            .write(Write::Consent(grant.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ConsentGranted, now)
                    .subject(caller.clone())
                    .category(grant.key.category)
                    .reason(reason),
            );
        self.commit(tx).await?;

        tracing::info!(
            subject = %caller,
            actor = %grant.key.actor,
            category = %grant.key.category,
            grant = %grant.id,
            expires_at = ?grant.expires_at,
            "consent granted"
        );
        Ok(grant)
    }

    /// Explicit duration, else the subject's auto-expire preference, else
    /// the engine default, else indefinite if allowed.
    async fn resolve_duration(
        &self,
        subject: &Identity,
        explicit: Option<Timestamp>,
    ) -> Result<Option<Timestamp>> {
        let resolved = match explicit {
            Some(d) => Some(d),
            None => {
                let auto_expire = self
                    .store
                    .get_preferences(subject)
                    .await?
                    .and_then(|p| p.auto_expire);
                match auto_expire {
                    Some(d) => Some(d),
                    None => self.default_consent_duration().await?,
                }
            }
        };

        match resolved {
            Some(0) => Err(EngineError::InvalidDuration),
            None if !self.config.allow_indefinite_consent => Err(EngineError::InvalidDuration),
            other => Ok(other),
        }
    }

    /// Revoke the caller's grant to `actor` for `category`.
    ///
    /// Revoking an already revoked grant succeeds and is audited again; the
    /// original revocation time is kept.
    pub async fn revoke_consent(
        &self,
        caller: &Identity,
        actor: &Identity,
        category: DataCategory,
        reason: &str,
    ) -> Result<ConsentGrant> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        let key = ConsentKey::new(caller.clone(), actor.clone(), category);
        let mut grant = self
            .store
            .get_consent(&key)
            .await?
            .ok_or(EngineError::NotFound(Missing::Consent))?;
        grant.revoke(now);

        let tx = Transaction::new()
            .write(Write::Consent(grant.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ConsentRevoked, now)
                    .subject(caller.clone())
                    .category(category)
                    .reason(reason),
            );
        self.commit(tx).await?;

        tracing::info!(subject = %caller, actor = %actor, %category, "consent revoked");
        Ok(grant)
    }

    /// Change the purpose of an active, unexpired grant.
    pub async fn update_consent_purpose(
        &self,
        caller: &Identity,
        actor: &Identity,
        category: DataCategory,
        purpose: &str,
    ) -> Result<ConsentGrant> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_living_subject(caller).await?;
        let key = ConsentKey::new(caller.clone(), actor.clone(), category);
        let mut grant = self
            .store
            .get_consent(&key)
            .await?
            .ok_or(EngineError::NotFound(Missing::Consent))?;
        match grant.effective_status(now) {
            ConsentStatus::Active => {}
            ConsentStatus::Expired => return Err(EngineError::Expired),
            ConsentStatus::Revoked | ConsentStatus::Suspended => {
                return Err(EngineError::NotFound(Missing::Consent))
            }
        }
        grant.purpose = purpose.to_string();
        grant.updated_at = now;

        let tx = Transaction::new()
            .write(Write::Consent(grant.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ConsentPurposeUpdated, now)
                    .subject(caller.clone())
                    .category(category)
                    .reason(purpose),
            );
        self.commit(tx).await?;

        tracing::info!(subject = %caller, actor = %actor, %category, "consent purpose updated");
        Ok(grant)
    }

    /// Temporarily withhold an active grant.
    pub async fn suspend_consent(
        &self,
        caller: &Identity,
        actor: &Identity,
        category: DataCategory,
    ) -> Result<ConsentGrant> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        let key = ConsentKey::new(caller.clone(), actor.clone(), category);
        let mut grant = self
            .store
            .get_consent(&key)
            .await?
            .ok_or(EngineError::NotFound(Missing::Consent))?;
        match grant.effective_status(now) {
            ConsentStatus::Active => {}
            ConsentStatus::Expired => return Err(EngineError::Expired),
            ConsentStatus::Suspended => return Err(EngineError::AlreadyExists),
            ConsentStatus::Revoked => return Err(EngineError::NotFound(Missing::Consent)),
        }
        grant.suspend(now)?;

        let tx = Transaction::new()
            .write(Write::Consent(grant.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ConsentSuspended, now)
                    .subject(caller.clone())
                    .category(category),
            );
        self.commit(tx).await?;

        tracing::info!(subject = %caller, actor = %actor, %category, "consent suspended");
        Ok(grant)
    }

    /// Reinstate a suspended grant, provided it has not expired meanwhile.
    pub async fn resume_consent(
        &self,
        caller: &Identity,
        actor: &Identity,
        category: DataCategory,
    ) -> Result<ConsentGrant> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_living_subject(caller).await?;
        let key = ConsentKey::new(caller.clone(), actor.clone(), category);
        let mut grant = self
            .store
            .get_consent(&key)
            .await?
            .ok_or(EngineError::NotFound(Missing::Consent))?;
        match grant.effective_status(now) {
            ConsentStatus::Suspended if grant.is_expired_at(now) => return Err(EngineError::Expired),
            ConsentStatus::Suspended => {}
            ConsentStatus::Active => return Err(EngineError::AlreadyExists),
            ConsentStatus::Expired => return Err(EngineError::Expired),
            ConsentStatus::Revoked => return Err(EngineError::NotFound(Missing::Consent)),
        }
        grant.resume(now)?;

        let tx = Transaction::new()
            .write(Write::Consent(grant.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ConsentResumed, now)
                    .subject(caller.clone())
                    .category(category),
            );
        self.commit(tx).await?;

        tracing::info!(subject = %caller, actor = %actor, %category, "consent resumed");
        Ok(grant)
    }

    /// The stored grant for a key.
    pub async fn consent(&self, key: &ConsentKey) -> Result<Option<ConsentGrant>> {
        Ok(self.store.get_consent(key).await?)
    }

    /// The status of a grant as observed now, with lazy expiry applied.
    pub async fn consent_status(&self, key: &ConsentKey) -> Result<Option<ConsentStatus>> {
        let now = self.clock.now();
        Ok(self
            .store
            .get_consent(key)
            .await?
            .map(|grant| grant.effective_status(now)))
    }

    /// Every grant a subject has given. Visible to the subject and to
    /// administrators.
    pub async fn consents_for(&self, caller: &Identity, subject: &Identity) -> Result<Vec<ConsentGrant>> {
        self.require_self_or_admin(caller, subject).await?;
        Ok(self.store.list_consents(subject).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use consent_kernel_core::{
        ActorCredentials, GrantId, ManualClock, Role, SubjectPreferences, SubjectRegistration,
    };
    use consent_kernel_store::MemoryStore;

    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;

    struct Setup {
        engine: Engine<MemoryStore>,
        clock: Arc<ManualClock>,
        pt: Identity,
        dr: Identity,
    }

    async fn setup_with(config: EngineConfig) -> Setup {
        let clock = Arc::new(ManualClock::new(0));
        let engine = Engine::with_clock(MemoryStore::new(), clock.clone(), config);
        let root = Identity::new("root");
        let pt = Identity::new("pt");
        let dr = Identity::new("dr");
        engine.initialize(&root, ActorCredentials::default()).await.unwrap();
        engine
            .register_subject(&pt, SubjectRegistration::born("1960-03-03"))
            .await
            .unwrap();
        engine
            .register_actor(&root, &dr, Role::Doctor, ActorCredentials::default())
            .await
            .unwrap();
        engine.verify_actor(&root, &dr).await.unwrap();
        Setup { engine, clock, pt, dr }
    }

    async fn setup() -> Setup {
        setup_with(EngineConfig::default()).await
    }

    #[tokio::test]
    async fn test_grant_sets_expiry_from_explicit_duration() {
        let s = setup().await;
        s.clock.set(10);
        let grant = s
            .engine
            .grant_consent(
                &s.pt,
                GrantConsent::new(s.dr.clone(), DataCategory::LabResults)
                    .duration(100)
                    .purpose("follow-up"),
            )
            .await
            .unwrap();
        assert_eq!(grant.granted_at, 10);
        assert_eq!(grant.expires_at, Some(110));
        assert_eq!(grant.status, ConsentStatus::Active);
    }

    #[tokio::test]
    async fn test_grant_preconditions() {
        let s = setup().await;

        let err = s
            .engine
            .grant_consent(
                &Identity::new("stranger"),
                GrantConsent::new(s.dr.clone(), DataCategory::LabResults),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(Missing::Subject)));

        let err = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(Identity::new("ghost"), DataCategory::LabResults))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(Missing::Actor)));

        let err = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::MentalHealth))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientPermissions);

        let err = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging).duration(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDuration);

        s.engine.mark_deceased(&Identity::new("root"), &s.pt).await.unwrap();
        let err = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PatientDeceased);
    }

    #[tokio::test]
    async fn test_duration_falls_back_to_preferences_then_default() {
        let s = setup().await;
        let root = Identity::new("root");
        s.engine.set_default_consent_duration(&root, Some(500)).await.unwrap();

        let g = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap();
        assert_eq!(g.expires_at, Some(500));

        let prefs = SubjectPreferences {
            auto_expire: Some(40),
            ..SubjectPreferences::default()
        };
        s.engine.update_preferences(&s.pt, prefs).await.unwrap();
        let g = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap();
        assert_eq!(g.expires_at, Some(40));
    }

    #[tokio::test]
    async fn test_indefinite_consent_can_be_disallowed() {
        let s = setup_with(EngineConfig {
            allow_indefinite_consent: false,
            ..EngineConfig::default()
        })
        .await;
        let err = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDuration);
    }

    #[tokio::test]
    async fn test_regrant_overwrites_with_new_id() {
        let s = setup().await;
        let first = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging).duration(5))
            .await
            .unwrap();
        s.engine
            .revoke_consent(&s.pt, &s.dr, DataCategory::Imaging, "changed my mind")
            .await
            .unwrap();
        let second = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap();

        assert_eq!(first.id, GrantId(1));
        assert_eq!(second.id, GrantId(2));
        assert_eq!(second.status, ConsentStatus::Active);
        assert_eq!(second.revoked_at, None);
        assert_eq!(s.engine.consents_for(&s.pt, &s.pt).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_missing_and_repeat() {
        let s = setup().await;
        let err = s
            .engine
            .revoke_consent(&s.pt, &s.dr, DataCategory::Imaging, "")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(Missing::Consent)));

        s.engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap();
        s.clock.set(3);
        s.engine
            .revoke_consent(&s.pt, &s.dr, DataCategory::Imaging, "first")
            .await
            .unwrap();
        s.clock.set(9);
        let again = s
            .engine
            .revoke_consent(&s.pt, &s.dr, DataCategory::Imaging, "second")
            .await
            .unwrap();
        assert_eq!(again.revoked_at, Some(3));

        let trail = s.engine.audit_trail(&s.pt, &s.pt).await.unwrap();
        let revocations = trail
            .iter()
            .filter(|e| e.record.action == AuditAction::ConsentRevoked)
            .count();
        assert_eq!(revocations, 2);
    }

    #[tokio::test]
    async fn test_update_purpose_rules() {
        let s = setup().await;
        s.engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::LabResults).duration(10))
            .await
            .unwrap();

        let g = s
            .engine
            .update_consent_purpose(&s.pt, &s.dr, DataCategory::LabResults, "research")
            .await
            .unwrap();
        assert_eq!(g.purpose, "research");

        s.clock.set(10);
        let err = s
            .engine
            .update_consent_purpose(&s.pt, &s.dr, DataCategory::LabResults, "late")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);

        let err = s
            .engine
            .update_consent_purpose(&s.pt, &s.dr, DataCategory::Imaging, "none")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_suspend_resume_cycle() {
        let s = setup().await;
        s.engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging).duration(50))
            .await
            .unwrap();

        s.engine.suspend_consent(&s.pt, &s.dr, DataCategory::Imaging).await.unwrap();
        let key = ConsentKey::new(s.pt.clone(), s.dr.clone(), DataCategory::Imaging);
        assert_eq!(
            s.engine.consent_status(&key).await.unwrap(),
            Some(ConsentStatus::Suspended)
        );
        let err = s
            .engine
            .suspend_consent(&s.pt, &s.dr, DataCategory::Imaging)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        s.engine.resume_consent(&s.pt, &s.dr, DataCategory::Imaging).await.unwrap();
        assert_eq!(
            s.engine.consent_status(&key).await.unwrap(),
            Some(ConsentStatus::Active)
        );

        s.engine.suspend_consent(&s.pt, &s.dr, DataCategory::Imaging).await.unwrap();
        s.clock.set(60);
        let err = s
            .engine
            .resume_consent(&s.pt, &s.dr, DataCategory::Imaging)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn test_death_freezes_suspended_and_active_grants() {
        let s = setup().await;
        let root = Identity::new("root");
        s.engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap();
        s.engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::LabResults))
            .await
            .unwrap();
        s.engine.suspend_consent(&s.pt, &s.dr, DataCategory::Imaging).await.unwrap();
        s.engine.mark_deceased(&root, &s.pt).await.unwrap();
        let head = s.engine.store().audit_head().await.unwrap();

        let err = s
            .engine
            .resume_consent(&s.pt, &s.dr, DataCategory::Imaging)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PatientDeceased);
        let err = s
            .engine
            .update_consent_purpose(&s.pt, &s.dr, DataCategory::LabResults, "after")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PatientDeceased);
        assert_eq!(s.engine.store().audit_head().await.unwrap(), head);

        let key = ConsentKey::new(s.pt.clone(), s.dr.clone(), DataCategory::Imaging);
        assert_eq!(
            s.engine.consent_status(&key).await.unwrap(),
            Some(ConsentStatus::Suspended)
        );
        let decision = s
            .engine
            .authorize(&s.dr, &s.pt, DataCategory::Imaging, "follow-up")
            .await
            .unwrap();
        assert!(!decision.is_allowed());

        // Withdrawing access stays possible.
        s.engine
            .revoke_consent(&s.pt, &s.dr, DataCategory::LabResults, "estate")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_consent_status_applies_lazy_expiry() {
        let s = setup().await;
        s.engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging).duration(5))
            .await
            .unwrap();
        let key = ConsentKey::new(s.pt.clone(), s.dr.clone(), DataCategory::Imaging);
        s.clock.set(5);
        assert_eq!(
            s.engine.consent_status(&key).await.unwrap(),
            Some(ConsentStatus::Expired)
        );
        assert_eq!(
            s.engine.consent(&key).await.unwrap().unwrap().status,
            ConsentStatus::Active
        );
    }

    #[tokio::test]
    async fn test_consents_for_is_private() {
        let s = setup().await;
        let err = s.engine.consents_for(&s.dr, &s.pt).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(s
            .engine
            .consents_for(&Identity::new("root"), &s.pt)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_paused_blocks_grants() {
        let s = setup().await;
        s.engine.pause(&Identity::new("root")).await.unwrap();
        let err = s
            .engine
            .grant_consent(&s.pt, GrantConsent::new(s.dr.clone(), DataCategory::Imaging))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);
    }
}
