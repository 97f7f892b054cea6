//! Emergency overrides: time-boxed bypass of consent.
//!
//! Overrides are never extended, renewed or ended early. Validity is purely
//! a function of the clock, matching the lazy expiry of consent grants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Identity, Timestamp};

/// How severe the emergency is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeverityLevel {
    Critical,
    Urgent,
    Standard,
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeverityLevel::Critical => "critical",
            SeverityLevel::Urgent => "urgent",
            SeverityLevel::Standard => "standard",
        })
    }
}

/// Composite key of an override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverrideKey {
    pub subject: Identity,
    pub actor: Identity,
    pub activated_at: Timestamp,
}

/// One activation of emergency access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyOverride {
    pub key: OverrideKey,
    pub level: SeverityLevel,
    pub reason: String,
    pub authorized_by: Identity,
    pub expires_at: Timestamp,
    /// The only field that changes after creation.
    pub subject_notified: bool,
}

impl EmergencyOverride {
    /// A new override activated by `actor` at `now`, live for `timeout` units.
    pub fn activate(
        subject: Identity,
        actor: Identity,
        level: SeverityLevel,
        reason: impl Into<String>,
        now: Timestamp,
        timeout: Timestamp,
    ) -> Self {
        Self {
            key: OverrideKey {
                subject,
                actor: actor.clone(),
                activated_at: now,
            },
            level,
            reason: reason.into(),
            authorized_by: actor,
            expires_at: now.saturating_add(timeout),
            subject_notified: false,
        }
    }

    /// Whether the override is in force at `now`.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        now >= self.key.activated_at && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_window() {
        let o = EmergencyOverride::activate(
            Identity::new("pt"),
            Identity::new("medic"),
            SeverityLevel::Critical,
            "cardiac arrest",
            0,
            72,
        );
        assert!(o.is_live_at(0));
        assert!(o.is_live_at(71));
        assert!(!o.is_live_at(72));
        assert!(!o.is_live_at(73));
        assert_eq!(o.authorized_by, Identity::new("medic"));
    }
}
