//! Registry records: subjects, their preferences, and actors.

use serde::{Deserialize, Serialize};

use crate::role::Role;
use crate::types::{Identity, Timestamp};

/// A person whose data is protected.
///
/// Subjects are never deleted; the row is retained for audit completeness
/// even after death.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Identity,
    /// ISO-8601 calendar date, e.g. `1984-02-29`.
    pub date_of_birth: String,
    pub emergency_contact: Option<Identity>,
    pub primary_provider: Option<Identity>,
    pub deceased: bool,
    pub registered_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Attributes supplied when a subject registers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectRegistration {
    pub date_of_birth: String,
    pub emergency_contact: Option<Identity>,
    pub primary_provider: Option<Identity>,
}

impl SubjectRegistration {
    /// Registration with only a date of birth.
    pub fn born(date_of_birth: impl Into<String>) -> Self {
        Self {
            date_of_birth: date_of_birth.into(),
            ..Self::default()
        }
    }

    /// Set the emergency contact.
    pub fn with_emergency_contact(mut self, contact: Identity) -> Self {
        self.emergency_contact = Some(contact);
        self
    }

    /// Set the primary provider.
    pub fn with_primary_provider(mut self, provider: Identity) -> Self {
        self.primary_provider = Some(provider);
        self
    }
}

/// A partial update of a subject's profile. `None` leaves a field unchanged;
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectUpdate {
    pub emergency_contact: Option<Option<Identity>>,
    pub primary_provider: Option<Option<Identity>>,
}

impl Subject {
    /// Build the row for a new registration.
    pub fn register(id: Identity, attrs: SubjectRegistration, now: Timestamp) -> Self {
        Self {
            id,
            date_of_birth: attrs.date_of_birth,
            emergency_contact: attrs.emergency_contact,
            primary_provider: attrs.primary_provider,
            deceased: false,
            registered_at: now,
            updated_at: now,
        }
    }

    /// Apply a profile update.
    pub fn apply(&mut self, update: SubjectUpdate, now: Timestamp) {
        if let Some(contact) = update.emergency_contact {
            self.emergency_contact = contact;
        }
        if let Some(provider) = update.primary_provider {
            self.primary_provider = provider;
        }
        self.updated_at = now;
    }
}

/// How widely a subject is willing to have data shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSharingLevel {
    Minimal,
    #[default]
    Standard,
    Full,
}

/// Which events the subject wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationPreference {
    #[default]
    All,
    ImportantOnly,
    None,
}

/// Per-subject settings. Created with defaults at registration and mutated
/// only by the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectPreferences {
    pub emergency_override_allowed: bool,
    pub research_participation: bool,
    pub data_sharing_level: DataSharingLevel,
    pub notification: NotificationPreference,
    /// Default consent duration when a grant names none.
    pub auto_expire: Option<Timestamp>,
}

impl Default for SubjectPreferences {
    fn default() -> Self {
        Self {
            emergency_override_allowed: true,
            research_participation: false,
            data_sharing_level: DataSharingLevel::default(),
            notification: NotificationPreference::default(),
            auto_expire: None,
        }
    }
}

/// Credentials presented when an actor is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorCredentials {
    pub license: String,
    pub institution: String,
}

impl ActorCredentials {
    pub fn new(license: impl Into<String>, institution: impl Into<String>) -> Self {
        Self {
            license: license.into(),
            institution: institution.into(),
        }
    }
}

/// A roled identity that attempts access: provider, administrator or
/// emergency responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Identity,
    pub role: Role,
    pub license: String,
    pub institution: String,
    pub verified: bool,
    /// Once false, never true again.
    pub active: bool,
    pub registered_at: Timestamp,
    pub verified_at: Option<Timestamp>,
    pub deactivated_at: Option<Timestamp>,
}

impl Actor {
    /// Build the row for a new, unverified registration.
    pub fn register(
        id: Identity,
        role: Role,
        credentials: ActorCredentials,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            role,
            license: credentials.license,
            institution: credentials.institution,
            verified: false,
            active: true,
            registered_at: now,
            verified_at: None,
            deactivated_at: None,
        }
    }

    /// Whether this actor may act at all: verified and still active.
    pub fn is_usable(&self) -> bool {
        self.verified && self.active
    }

    /// Whether this actor may perform administrative operations.
    pub fn is_admin(&self) -> bool {
        self.is_usable() && self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_actor_is_unverified_but_active() {
        let actor = Actor::register(
            Identity::new("nurse-1"),
            Role::Nurse,
            ActorCredentials::new("RN-42", "General"),
            7,
        );
        assert!(!actor.verified);
        assert!(actor.active);
        assert!(!actor.is_usable());
    }

    #[test]
    fn test_unverified_admin_is_not_admin() {
        let mut actor = Actor::register(
            Identity::new("root"),
            Role::Admin,
            ActorCredentials::default(),
            0,
        );
        assert!(!actor.is_admin());
        actor.verified = true;
        assert!(actor.is_admin());
        actor.active = false;
        assert!(!actor.is_admin());
    }

    #[test]
    fn test_subject_update_clears_and_sets() {
        let mut subject = Subject::register(
            Identity::new("s"),
            SubjectRegistration::born("1990-01-01").with_primary_provider(Identity::new("dr")),
            0,
        );
        subject.apply(
            SubjectUpdate {
                emergency_contact: Some(Some(Identity::new("sibling"))),
                primary_provider: Some(None),
            },
            5,
        );
        assert_eq!(subject.emergency_contact, Some(Identity::new("sibling")));
        assert_eq!(subject.primary_provider, None);
        assert_eq!(subject.updated_at, 5);
    }

    #[test]
    fn test_default_preferences_allow_emergency_override() {
        let prefs = SubjectPreferences::default();
        assert!(prefs.emergency_override_allowed);
        assert!(!prefs.research_participation);
        assert_eq!(prefs.auto_expire, None);
    }
}
