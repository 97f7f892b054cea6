//! The authorization decision function.

use std::fmt;

use consent_kernel_core::{
    Actor, ConsentGrant, ConsentStatus, DataCategory, EmergencyOverride, Identity, Role, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::matrix::role_allows;

/// Why access was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllowBasis {
    /// An active, unexpired consent from the subject.
    Consent,
    /// The actor is an administrator.
    AdminRole,
    /// The actor holds a live emergency override for the subject.
    EmergencyOverride,
}

impl AllowBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllowBasis::Consent => "consent",
            AllowBasis::AdminRole => "admin-role",
            AllowBasis::EmergencyOverride => "emergency-override",
        }
    }
}

/// Why access was denied.
///
/// A deny reason only ever describes the requested category; it never hints
/// at grants the actor holds for other categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    /// Actor unknown, unverified or deactivated.
    Unauthorized,
    /// The role matrix excludes the category.
    InsufficientPermissions,
    /// No usable consent (absent, revoked or suspended).
    ConsentRequired,
    /// The consent exists but its expiry time has passed.
    Expired,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthorized => "unauthorized",
            DenyReason::InsufficientPermissions => "insufficient-permissions",
            DenyReason::ConsentRequired => "consent-required",
            DenyReason::Expired => "expired",
        }
    }
}

/// The verdict for one access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Allow(AllowBasis),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow(basis) => write!(f, "allow ({})", basis.as_str()),
            Decision::Deny(reason) => write!(f, "deny ({})", reason.as_str()),
        }
    }
}

/// Everything the decision depends on, loaded by the caller.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    /// `None` if the actor identity is not registered.
    pub actor: Option<&'a Actor>,
    pub subject: &'a Identity,
    pub category: DataCategory,
    /// Consent rows between the subject and the actor. Rows for other pairs
    /// or unrelated categories are ignored.
    pub consents: &'a [ConsentGrant],
    /// Override rows for the subject. Rows for other actors are ignored.
    pub overrides: &'a [EmergencyOverride],
    pub now: Timestamp,
}

/// Resolve one access attempt.
pub fn evaluate(input: &DecisionInput<'_>) -> Decision {
    let actor = match input.actor {
        Some(actor) if actor.is_usable() => actor,
        _ => return Decision::Deny(DenyReason::Unauthorized),
    };

    match actor.role {
        Role::Admin => return Decision::Allow(AllowBasis::AdminRole),
        Role::Emergency if has_live_override(input, &actor.id) => {
            return Decision::Allow(AllowBasis::EmergencyOverride)
        }
        _ => {}
    }

    if !role_allows(actor.role, input.category) {
        return Decision::Deny(DenyReason::InsufficientPermissions);
    }

    consent_decision(input, &actor.id)
}

fn has_live_override(input: &DecisionInput<'_>, actor: &Identity) -> bool {
    input
        .overrides
        .iter()
        .filter(|o| &o.key.subject == input.subject && &o.key.actor == actor)
        .any(|o| o.is_live_at(input.now))
}

fn consent_decision(input: &DecisionInput<'_>, actor: &Identity) -> Decision {
    let candidates = input.consents.iter().filter(|grant| {
        &grant.key.subject == input.subject
            && &grant.key.actor == actor
            && (grant.key.category == input.category || grant.key.category == DataCategory::All)
    });

    let mut expired = false;
    for grant in candidates {
        match grant.effective_status(input.now) {
            ConsentStatus::Active => return Decision::Allow(AllowBasis::Consent),
            ConsentStatus::Expired => expired = true,
            ConsentStatus::Revoked | ConsentStatus::Suspended => {}
        }
    }

    if expired {
        Decision::Deny(DenyReason::Expired)
    } else {
        Decision::Deny(DenyReason::ConsentRequired)
    }
}
