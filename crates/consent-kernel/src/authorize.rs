//! The access decision entry point.
//!
//! Loads what [`evaluate`] needs, runs it, and records the verdict. Every
//! call appends exactly one audit entry, whether it allows, denies or fails
//! on an unknown subject. Nothing else is written.

use consent_kernel_core::{AuditAction, AuditOutcome, AuditRecord, DataCategory, Identity, Timestamp};
use consent_kernel_perms::{evaluate, Decision, DecisionInput, DenyReason};
use consent_kernel_store::{Store, StoreExt, Transaction};

use crate::engine::Engine;
use crate::error::{EngineError, Missing, Result};

impl<S: Store> Engine<S> {
    /// Decide whether `caller` may access `category` of `subject`'s data.
    ///
    /// Available while paused. An unregistered subject is audited as a
    /// denial and surfaces as `NotFound`.
    pub async fn authorize(
        &self,
        caller: &Identity,
        subject: &Identity,
        category: DataCategory,
        reason: &str,
    ) -> Result<Decision> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        let actor = self.store.get_actor(caller).await?;
        let usable = actor.as_ref().map_or(false, |a| a.is_usable());

        let decision = if !usable {
            Decision::Deny(DenyReason::Unauthorized)
        } else if self.store.get_subject(subject).await?.is_none() {
            let record = decision_record(
                caller,
                subject,
                category,
                now,
                AuditOutcome::Denied,
                "subject-not-found",
                reason,
            );
            self.commit(Transaction::new().audit(record)).await?;
            tracing::warn!(actor = %caller, subject = %subject, %category, "access attempt on unknown subject");
            return Err(EngineError::NotFound(Missing::Subject));
        } else {
            let consents = self.store.consents_between(subject, caller).await?;
            let overrides = self.store.list_overrides(subject, Some(caller)).await?;
            evaluate(&DecisionInput {
                actor: actor.as_ref(),
                subject,
                category,
                consents: &consents,
                overrides: &overrides,
                now,
            })
        };

        let (outcome, basis) = match decision {
            Decision::Allow(basis) => (AuditOutcome::Authorized, basis.as_str()),
            Decision::Deny(why) => (AuditOutcome::Denied, why.as_str()),
        };
        let record = decision_record(caller, subject, category, now, outcome, basis, reason);
        self.commit(Transaction::new().audit(record)).await?;

        if decision.is_allowed() {
            tracing::info!(actor = %caller, subject = %subject, %category, %decision, "access decision");
        } else {
            tracing::warn!(actor = %caller, subject = %subject, %category, %decision, "access denied");
        }
        Ok(decision)
    }
}

fn decision_record(
    caller: &Identity,
    subject: &Identity,
    category: DataCategory,
    now: Timestamp,
    outcome: AuditOutcome,
    basis: &str,
    reason: &str,
) -> AuditRecord {
    AuditRecord::new(caller.clone(), AuditAction::AccessDecision, now)
        .subject(subject.clone())
        .category(category)
        .outcome(outcome)
        .reason(format!("{}: {}", basis, reason))
}
