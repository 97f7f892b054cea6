//! Runtime-tunable engine settings, persisted alongside the data they govern.

use serde::{Deserialize, Serialize};

use crate::types::{Identity, Timestamp};

/// Default lifetime of an emergency override, in clock units.
pub const DEFAULT_EMERGENCY_TIMEOUT: Timestamp = 72;

/// Persisted engine scalars.
///
/// Exactly one row exists once the engine has been initialized; its absence
/// means the engine has not been bootstrapped yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// The administrative actor created at initialization.
    pub root_admin: Identity,
    pub initialized_at: Timestamp,
    pub emergency_timeout: Timestamp,
    /// Used when neither the grant nor the subject names a duration.
    pub default_consent_duration: Option<Timestamp>,
    pub paused: bool,
}

impl EngineSettings {
    pub fn new(root_admin: Identity, initialized_at: Timestamp) -> Self {
        Self {
            root_admin,
            initialized_at,
            emergency_timeout: DEFAULT_EMERGENCY_TIMEOUT,
            default_consent_duration: None,
            paused: false,
        }
    }
}
