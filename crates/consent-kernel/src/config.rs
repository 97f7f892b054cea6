//! Engine configuration.

use consent_kernel_core::{EngineSettings, Identity, Timestamp, DEFAULT_EMERGENCY_TIMEOUT};

/// Configuration supplied when the engine is constructed.
///
/// `emergency_timeout` and `default_consent_duration` only seed the persisted
/// [`EngineSettings`] at initialization; after that an administrator tunes
/// them at runtime and the persisted values win.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of an emergency override, in clock units.
    pub emergency_timeout: Timestamp,
    /// Consent duration used when neither the grant nor the subject names one.
    pub default_consent_duration: Option<Timestamp>,
    /// Whether a grant with no resolvable duration is indefinite. When false,
    /// such a grant fails with `InvalidDuration`.
    pub allow_indefinite_consent: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            emergency_timeout: DEFAULT_EMERGENCY_TIMEOUT,
            default_consent_duration: None,
            allow_indefinite_consent: true,
        }
    }
}

impl EngineConfig {
    /// The settings row written at initialization.
    pub fn initial_settings(&self, root_admin: Identity, now: Timestamp) -> EngineSettings {
        EngineSettings {
            emergency_timeout: self.emergency_timeout,
            default_consent_duration: self.default_consent_duration,
            ..EngineSettings::new(root_admin, now)
        }
    }
}
