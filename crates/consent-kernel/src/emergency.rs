//! Emergency Override Subsystem.
//!
//! An override lets an emergency responder bypass consent for one subject
//! until it expires. Overrides are never ended early.

use consent_kernel_core::{
    AuditAction, AuditRecord, EmergencyOverride, Identity, OverrideKey, Role, SeverityLevel,
    Timestamp,
};
use consent_kernel_store::{Store, Transaction, Write};

use crate::engine::Engine;
use crate::error::{EngineError, Missing, Result};

impl<S: Store> Engine<S> {
    /// Open a time-boxed override for the caller on `subject`.
    pub async fn activate_emergency_access(
        &self,
        caller: &Identity,
        subject: &Identity,
        reason: &str,
        level: SeverityLevel,
    ) -> Result<EmergencyOverride> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        let actor = match self.store.get_actor(caller).await? {
            Some(actor) if actor.is_usable() => actor,
            _ => {
                tracing::warn!(caller = %caller, "emergency activation by unusable actor");
                return Err(EngineError::Unauthorized);
            }
        };
        if actor.role != Role::Emergency {
            tracing::warn!(caller = %caller, role = %actor.role, "emergency activation by non-emergency role");
            return Err(EngineError::InsufficientPermissions);
        }
        self.require_living_subject(subject).await?;
        let allowed = self
            .store
            .get_preferences(subject)
            .await?
            .map_or(true, |p| p.emergency_override_allowed);
        if !allowed {
            tracing::warn!(caller = %caller, subject = %subject, "subject has opted out of emergency overrides");
            return Err(EngineError::InsufficientPermissions);
        }

        let existing = self.store.list_overrides(subject, Some(caller)).await?;
        if existing.iter().any(|o| o.key.activated_at == now) {
            return Err(EngineError::AlreadyExists);
        }

        let timeout = self.emergency_timeout().await?;
        let activated = EmergencyOverride::activate(subject.clone(), caller.clone(), level, reason, now, timeout);
        let tx = Transaction::new()
            .write(Write::Override(activated.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::EmergencyAccess, now)
                    .subject(subject.clone())
                    .reason(format!("{}: {}", level, reason)),
            );
        self.commit(tx).await?;

        tracing::warn!(
            actor = %caller,
            subject = %subject,
            %level,
            expires_at = activated.expires_at,
            "emergency override activated"
        );
        Ok(activated)
    }

    /// Whether `actor` holds a live override on `subject` right now.
    pub async fn check_emergency_access(&self, actor: &Identity, subject: &Identity) -> Result<bool> {
        let now = self.clock.now();
        let overrides = self.store.list_overrides(subject, Some(actor)).await?;
        Ok(overrides.iter().any(|o| o.is_live_at(now)))
    }

    /// Record that the subject has been told about an override.
    pub async fn acknowledge_override_notification(
        &self,
        caller: &Identity,
        subject: &Identity,
        actor: &Identity,
        activated_at: Timestamp,
    ) -> Result<EmergencyOverride> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_self_or_admin(caller, subject).await?;
        let key = OverrideKey {
            subject: subject.clone(),
            actor: actor.clone(),
            activated_at,
        };
        let mut acknowledged = self
            .store
            .list_overrides(subject, Some(actor))
            .await?
            .into_iter()
            .find(|o| o.key == key)
            .ok_or(EngineError::NotFound(Missing::Override))?;
        if acknowledged.subject_notified {
            return Err(EngineError::AlreadyExists);
        }
        acknowledged.subject_notified = true;

        let tx = Transaction::new()
            .write(Write::Override(acknowledged.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::OverrideNotified, now)
                    .subject(subject.clone())
                    .reason(format!("{} at {}", actor, activated_at)),
            );
        self.commit(tx).await?;

        Ok(acknowledged)
    }

    /// Every override ever opened on `subject`. Visible to the subject and
    /// to administrators.
    pub async fn emergency_overrides_for(
        &self,
        caller: &Identity,
        subject: &Identity,
    ) -> Result<Vec<EmergencyOverride>> {
        self.require_self_or_admin(caller, subject).await?;
        Ok(self.store.list_overrides(subject, None).await?)
    }
}
