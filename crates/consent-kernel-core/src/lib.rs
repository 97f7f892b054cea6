//! # Consent Kernel Core
//!
//! Shared vocabulary for the Consent Kernel: identities, roles, data
//! categories, consent grants, access requests, emergency overrides, the
//! clock, and the hash-chained audit entry.
//!
//! This crate contains no I/O and no storage. Everything here is plain data
//! plus the small amount of logic that belongs to a single record (expiry,
//! status transitions, hash sealing).
//!
//! ## Key Types
//!
//! - [`Identity`] - An authenticated handle for a subject or an actor
//! - [`ConsentGrant`] - A subject's scoped, revocable authorization
//! - [`EmergencyOverride`] - A time-boxed bypass of consent
//! - [`AuditEntry`] - One sealed link of the audit hash chain
//!
//! ## Time
//!
//! All expiry is lazy and evaluated against a single injected [`Clock`].

pub mod audit;
pub mod canonical;
pub mod clock;
pub mod consent;
pub mod emergency;
pub mod error;
pub mod identity;
pub mod request;
pub mod role;
pub mod settings;
pub mod types;

pub use audit::{verify_chain, AuditAction, AuditEntry, AuditHash, AuditOutcome, AuditRecord};
pub use canonical::canonical_entry_bytes;
pub use clock::{Clock, ManualClock, SystemClock};
pub use consent::{ConsentGrant, ConsentKey, ConsentStatus};
pub use emergency::{EmergencyOverride, OverrideKey, SeverityLevel};
pub use error::CoreError;
pub use identity::{
    Actor, ActorCredentials, DataSharingLevel, NotificationPreference, Subject,
    SubjectPreferences, SubjectRegistration, SubjectUpdate,
};
pub use request::{AccessRequest, RequestStatus};
pub use role::{DataCategory, Role};
pub use settings::{EngineSettings, DEFAULT_EMERGENCY_TIMEOUT};
pub use types::{GrantId, Identity, RequestId, Timestamp};
