//! Consent grants.
//!
//! A grant is keyed by (subject, actor, category) and at most one row exists
//! per key. Expiry is lazy: the stored status never flips to `Expired` on its
//! own, so readers must go through [`ConsentGrant::is_active_at`] or
//! [`ConsentGrant::effective_status`] rather than trusting `status`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::role::DataCategory;
use crate::types::{GrantId, Identity, Timestamp};

/// Lifecycle status of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStatus {
    Active,
    Expired,
    Revoked,
    Suspended,
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConsentStatus::Active => "active",
            ConsentStatus::Expired => "expired",
            ConsentStatus::Revoked => "revoked",
            ConsentStatus::Suspended => "suspended",
        })
    }
}

/// The composite key of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsentKey {
    pub subject: Identity,
    pub actor: Identity,
    pub category: DataCategory,
}

impl ConsentKey {
    pub fn new(subject: Identity, actor: Identity, category: DataCategory) -> Self {
        Self {
            subject,
            actor,
            category,
        }
    }

    /// The same (subject, actor) pair with a different category.
    pub fn with_category(&self, category: DataCategory) -> Self {
        Self {
            subject: self.subject.clone(),
            actor: self.actor.clone(),
            category,
        }
    }
}

/// A subject's explicit, scoped authorization for one actor and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentGrant {
    pub id: GrantId,
    pub key: ConsentKey,
    pub granted_at: Timestamp,
    /// `None` means the grant never expires.
    pub expires_at: Option<Timestamp>,
    pub status: ConsentStatus,
    pub purpose: String,
    pub restrictions: Option<String>,
    pub revoked_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl ConsentGrant {
    /// A fresh, active grant.
    pub fn new(
        id: GrantId,
        key: ConsentKey,
        now: Timestamp,
        duration: Option<Timestamp>,
        purpose: impl Into<String>,
        restrictions: Option<String>,
    ) -> Self {
        Self {
            id,
            key,
            granted_at: now,
            expires_at: duration.map(|d| now.saturating_add(d)),
            status: ConsentStatus::Active,
            purpose: purpose.into(),
            restrictions,
            revoked_at: None,
            updated_at: now,
        }
    }

    /// Whether the expiry time has been reached.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }

    /// The active-and-unexpired predicate.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.status == ConsentStatus::Active && !self.is_expired_at(now)
    }

    /// The status as observed at `now`, with lazy expiry applied.
    pub fn effective_status(&self, now: Timestamp) -> ConsentStatus {
        match self.status {
            ConsentStatus::Active if self.is_expired_at(now) => ConsentStatus::Expired,
            status => status,
        }
    }

    /// Mark the grant revoked. Revoking an already revoked grant keeps the
    /// original revocation time.
    pub fn revoke(&mut self, now: Timestamp) {
        if self.status != ConsentStatus::Revoked {
            self.revoked_at = Some(now);
        }
        self.status = ConsentStatus::Revoked;
        self.updated_at = now;
    }

    /// Active → suspended.
    pub fn suspend(&mut self, now: Timestamp) -> Result<(), CoreError> {
        if self.status != ConsentStatus::Active {
            return Err(self.invalid_transition(ConsentStatus::Suspended));
        }
        self.status = ConsentStatus::Suspended;
        self.updated_at = now;
        Ok(())
    }

    /// Suspended → active.
    pub fn resume(&mut self, now: Timestamp) -> Result<(), CoreError> {
        if self.status != ConsentStatus::Suspended {
            return Err(self.invalid_transition(ConsentStatus::Active));
        }
        self.status = ConsentStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    fn invalid_transition(&self, to: ConsentStatus) -> CoreError {
        CoreError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(duration: Option<Timestamp>) -> ConsentGrant {
        let key = ConsentKey::new(
            Identity::new("subject"),
            Identity::new("actor"),
            DataCategory::LabResults,
        );
        ConsentGrant::new(GrantId(1), key, 0, duration, "follow-up", None)
    }

    #[test]
    fn test_expiry_is_exclusive_at_deadline() {
        let g = grant(Some(100));
        assert!(g.is_active_at(0));
        assert!(g.is_active_at(99));
        assert!(!g.is_active_at(100));
        assert!(!g.is_active_at(101));
    }

    #[test]
    fn test_stored_status_alone_is_insufficient() {
        let g = grant(Some(10));
        assert_eq!(g.status, ConsentStatus::Active);
        assert_eq!(g.effective_status(10), ConsentStatus::Expired);
    }

    #[test]
    fn test_indefinite_grant_never_expires() {
        let g = grant(None);
        assert!(g.is_active_at(u64::MAX));
    }

    #[test]
    fn test_revoked_is_inactive() {
        let mut g = grant(None);
        g.revoke(5);
        assert!(!g.is_active_at(5));
        assert_eq!(g.revoked_at, Some(5));

        g.revoke(9);
        assert_eq!(g.revoked_at, Some(5));
        assert_eq!(g.updated_at, 9);
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut g = grant(None);
        g.suspend(1).unwrap();
        assert!(!g.is_active_at(1));
        assert!(g.suspend(2).is_err());
        g.resume(3).unwrap();
        assert!(g.is_active_at(3));
        assert!(g.resume(4).is_err());
    }
}
