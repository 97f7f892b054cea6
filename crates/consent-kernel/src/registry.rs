//! Identity Registry: subjects, their preferences, and actors.

use consent_kernel_core::{
    Actor, ActorCredentials, AuditAction, AuditRecord, Identity, Role, Subject,
    SubjectPreferences, SubjectRegistration, SubjectUpdate,
};
use consent_kernel_store::{Store, Transaction, Write};

use crate::engine::Engine;
use crate::error::{EngineError, Missing, Result};

impl<S: Store> Engine<S> {
    // ─────────────────────────────────────────────────────────────────────────
    // Subjects
    // ─────────────────────────────────────────────────────────────────────────

    /// Register the caller as a subject. Preferences start at their defaults.
    pub async fn register_subject(&self, caller: &Identity, attrs: SubjectRegistration) -> Result<Subject> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        if self.store.get_subject(caller).await?.is_some() {
            return Err(EngineError::AlreadyExists);
        }

        let subject = Subject::register(caller.clone(), attrs, now);
        let tx = Transaction::new()
            .write(Write::Subject(subject.clone()))
            .write(Write::Preferences(caller.clone(), SubjectPreferences::default()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::SubjectRegistered, now)
                    .subject(caller.clone()),
            );
        self.commit(tx).await?;

        tracing::info!(subject = %caller, "subject registered");
        Ok(subject)
    }

    /// Change the caller's emergency contact or primary provider.
    pub async fn update_subject_profile(&self, caller: &Identity, update: SubjectUpdate) -> Result<Subject> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        let mut subject = self.require_living_subject(caller).await?;
        subject.apply(update, now);

        let tx = Transaction::new()
            .write(Write::Subject(subject.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::SubjectUpdated, now)
                    .subject(caller.clone()),
            );
        self.commit(tx).await?;

        tracing::info!(subject = %caller, "subject profile updated");
        Ok(subject)
    }

    /// Replace the caller's preferences.
    pub async fn update_preferences(&self, caller: &Identity, prefs: SubjectPreferences) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_living_subject(caller).await?;
        if prefs.auto_expire == Some(0) {
            return Err(EngineError::InvalidDuration);
        }

        let reason = format!(
            "emergency override {}",
            if prefs.emergency_override_allowed {
                "allowed"
            } else {
                "refused"
            }
        );
        let tx = Transaction::new()
            .write(Write::Preferences(caller.clone(), prefs))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::PreferencesUpdated, now)
                    .subject(caller.clone())
                    .reason(reason),
            );
        self.commit(tx).await?;

        tracing::info!(subject = %caller, "preferences updated");
        Ok(())
    }

    /// Record a subject's death. Administrators only; the profile is kept.
    pub async fn mark_deceased(&self, caller: &Identity, subject: &Identity) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_admin(caller).await?;
        let mut profile = self
            .store
            .get_subject(subject)
            .await?
            .ok_or(EngineError::NotFound(Missing::Subject))?;
        if profile.deceased {
            return Err(EngineError::AlreadyExists);
        }
        profile.deceased = true;
        profile.updated_at = now;

        let tx = Transaction::new()
            .write(Write::Subject(profile))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::SubjectDeceased, now)
                    .subject(subject.clone()),
            );
        self.commit(tx).await?;

        tracing::info!(caller = %caller, subject = %subject, "subject marked deceased");
        Ok(())
    }

    pub async fn subject(&self, id: &Identity) -> Result<Option<Subject>> {
        Ok(self.store.get_subject(id).await?)
    }

    pub async fn preferences(&self, id: &Identity) -> Result<Option<SubjectPreferences>> {
        Ok(self.store.get_preferences(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Actors
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new, unverified actor. Administrators only.
    ///
    /// A deactivated identity stays registered, so it cannot be registered
    /// again.
    pub async fn register_actor(
        &self,
        caller: &Identity,
        id: &Identity,
        role: Role,
        credentials: ActorCredentials,
    ) -> Result<Actor> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_admin(caller).await?;
        if self.store.get_actor(id).await?.is_some() {
            return Err(EngineError::AlreadyExists);
        }

        let actor = Actor::register(id.clone(), role, credentials, now);
        let tx = Transaction::new()
            .write(Write::Actor(actor.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ActorRegistered, now)
                    .reason(format!("{} as {}", id, role)),
            );
        self.commit(tx).await?;

        tracing::info!(caller = %caller, actor = %id, %role, "actor registered");
        Ok(actor)
    }

    /// Mark an actor's credentials as checked. Administrators only.
    pub async fn verify_actor(&self, caller: &Identity, id: &Identity) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_admin(caller).await?;
        let mut actor = self
            .store
            .get_actor(id)
            .await?
            .ok_or(EngineError::NotFound(Missing::Actor))?;
        if actor.verified {
            return Err(EngineError::AlreadyExists);
        }
        actor.verified = true;
        actor.verified_at = Some(now);

        let tx = Transaction::new()
            .write(Write::Actor(actor))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ActorVerified, now)
                    .reason(id.to_string()),
            );
        self.commit(tx).await?;

        tracing::info!(caller = %caller, actor = %id, "actor verified");
        Ok(())
    }

    /// Permanently deactivate an actor. Callable by an administrator or by
    /// the actor itself.
    pub async fn deactivate_actor(&self, caller: &Identity, id: &Identity) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        if caller != id {
            self.require_admin(caller).await?;
        }
        let mut actor = self
            .store
            .get_actor(id)
            .await?
            .ok_or(EngineError::NotFound(Missing::Actor))?;
        if !actor.active {
            return Err(EngineError::AlreadyExists);
        }
        actor.active = false;
        actor.deactivated_at = Some(now);

        let tx = Transaction::new()
            .write(Write::Actor(actor))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::ActorDeactivated, now)
                    .reason(id.to_string()),
            );
        self.commit(tx).await?;

        tracing::info!(caller = %caller, actor = %id, "actor deactivated");
        Ok(())
    }

    pub async fn actor(&self, id: &Identity) -> Result<Option<Actor>> {
        Ok(self.store.get_actor(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use consent_kernel_core::{ManualClock, NotificationPreference};
    use consent_kernel_store::MemoryStore;

    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;

    async fn engine() -> Engine<MemoryStore> {
        let clock = Arc::new(ManualClock::new(0));
        let engine = Engine::with_clock(MemoryStore::new(), clock, EngineConfig::default());
        engine
            .initialize(&Identity::new("root"), ActorCredentials::default())
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_register_subject_twice() {
        let engine = engine().await;
        let pt = Identity::new("pt");
        engine
            .register_subject(&pt, SubjectRegistration::born("2001-09-09"))
            .await
            .unwrap();
        assert_eq!(
            engine.preferences(&pt).await.unwrap(),
            Some(SubjectPreferences::default())
        );

        let err = engine
            .register_subject(&pt, SubjectRegistration::born("2001-09-09"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_only_admin_registers_actors() {
        let engine = engine().await;
        let root = Identity::new("root");
        let dr = Identity::new("dr");

        let err = engine
            .register_actor(&dr, &dr, Role::Doctor, ActorCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let actor = engine
            .register_actor(&root, &dr, Role::Doctor, ActorCredentials::new("MD-1", "St. Elsewhere"))
            .await
            .unwrap();
        assert!(!actor.verified);

        let err = engine
            .register_actor(&root, &dr, Role::Nurse, ActorCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_unknown_role_name_is_invalid_role() {
        let result: Result<Role> = "surgeon".parse::<Role>().map_err(EngineError::from);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidRole);
    }

    #[tokio::test]
    async fn test_verify_and_deactivate_lifecycle() {
        let engine = engine().await;
        let root = Identity::new("root");
        let nurse = Identity::new("nurse");
        engine
            .register_actor(&root, &nurse, Role::Nurse, ActorCredentials::default())
            .await
            .unwrap();

        let err = engine.verify_actor(&root, &Identity::new("ghost")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(Missing::Actor)));

        engine.verify_actor(&root, &nurse).await.unwrap();
        let err = engine.verify_actor(&root, &nurse).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // self-deactivation is allowed
        engine.deactivate_actor(&nurse, &nurse).await.unwrap();
        let err = engine.deactivate_actor(&root, &nurse).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let actor = engine.actor(&nurse).await.unwrap().unwrap();
        assert!(!actor.is_usable());

        // no way back
        let err = engine
            .register_actor(&root, &nurse, Role::Nurse, ActorCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_deactivate_others() {
        let engine = engine().await;
        let root = Identity::new("root");
        for name in ["a", "b"] {
            let id = Identity::new(name);
            engine
                .register_actor(&root, &id, Role::Technician, ActorCredentials::default())
                .await
                .unwrap();
            engine.verify_actor(&root, &id).await.unwrap();
        }
        let err = engine
            .deactivate_actor(&Identity::new("a"), &Identity::new("b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_profile_and_preferences_updates() {
        let engine = engine().await;
        let pt = Identity::new("pt");

        let err = engine
            .update_preferences(&pt, SubjectPreferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(Missing::Subject)));

        engine
            .register_subject(&pt, SubjectRegistration::born("1999-12-31"))
            .await
            .unwrap();
        let updated = engine
            .update_subject_profile(
                &pt,
                SubjectUpdate {
                    emergency_contact: Some(Some(Identity::new("spouse"))),
                    primary_provider: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.emergency_contact, Some(Identity::new("spouse")));

        let prefs = SubjectPreferences {
            auto_expire: Some(0),
            ..SubjectPreferences::default()
        };
        let err = engine.update_preferences(&pt, prefs).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDuration);

        let prefs = SubjectPreferences {
            notification: NotificationPreference::ImportantOnly,
            emergency_override_allowed: false,
            ..SubjectPreferences::default()
        };
        engine.update_preferences(&pt, prefs.clone()).await.unwrap();
        assert_eq!(engine.preferences(&pt).await.unwrap(), Some(prefs));
    }

    #[tokio::test]
    async fn test_mark_deceased() {
        let engine = engine().await;
        let root = Identity::new("root");
        let pt = Identity::new("pt");
        engine
            .register_subject(&pt, SubjectRegistration::born("1930-01-01"))
            .await
            .unwrap();

        let err = engine.mark_deceased(&pt, &pt).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        engine.mark_deceased(&root, &pt).await.unwrap();
        assert!(engine.subject(&pt).await.unwrap().unwrap().deceased);
        let err = engine.mark_deceased(&root, &pt).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = engine
            .update_preferences(&pt, SubjectPreferences::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PatientDeceased);
        let err = engine
            .update_subject_profile(
                &pt,
                SubjectUpdate {
                    emergency_contact: Some(None),
                    primary_provider: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PatientDeceased);
    }

    #[tokio::test]
    async fn test_pause_is_reported_before_authority() {
        let engine = engine().await;
        let root = Identity::new("root");
        let pt = Identity::new("pt");
        let mallory = Identity::new("mallory");
        engine
            .register_subject(&pt, SubjectRegistration::born("1980-02-02"))
            .await
            .unwrap();
        engine
            .register_actor(&root, &mallory, Role::Nurse, ActorCredentials::default())
            .await
            .unwrap();
        engine.pause(&root).await.unwrap();

        let err = engine
            .register_actor(&mallory, &Identity::new("x"), Role::Nurse, ActorCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);
        let err = engine.verify_actor(&mallory, &mallory).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);
        let err = engine.mark_deceased(&mallory, &pt).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);
        let err = engine.deactivate_actor(&mallory, &root).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemPaused);
    }

    #[tokio::test]
    async fn test_failed_mutations_are_not_audited() {
        let engine = engine().await;
        let before = engine.store().audit_head().await.unwrap().unwrap().seq;

        let _ = engine
            .register_actor(
                &Identity::new("nobody"),
                &Identity::new("x"),
                Role::Nurse,
                ActorCredentials::default(),
            )
            .await;
        let _ = engine.verify_actor(&Identity::new("root"), &Identity::new("ghost")).await;

        let after = engine.store().audit_head().await.unwrap().unwrap().seq;
        assert_eq!(before, after);
    }
}
