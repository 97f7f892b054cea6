//! # Consent Kernel
//!
//! The unified API for the Consent Kernel: a consent and access
//! authorization engine for sensitive personal records.
//!
//! ## Overview
//!
//! The engine decides whether an actor (a provider, administrator or
//! emergency responder) may access one category of a subject's data, and
//! records every decision and state change in a hash-chained audit trail.
//!
//! - **Identity Registry**: subjects, their preferences, and roled actors
//! - **Consent Ledger**: scoped, time-bounded grants the subject controls
//! - **Access Requests**: recorded intent, decided by an administrator
//! - **Emergency Overrides**: time-boxed bypass for emergency responders
//! - **Authorization**: one decision function, one audit entry per call
//!
//! ## Key Concepts
//!
//! - **Consent key**: (subject, actor, category). A regrant overwrites.
//! - **Lazy expiry**: expiry is compared against the clock on every read.
//! - **Role ceiling**: a role bounds what may be granted, it never grants.
//! - **Audit trail**: append-only, gap-free, each entry linked to the last.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use consent_kernel::{Engine, EngineConfig, GrantConsent};
//! use consent_kernel::core::{ActorCredentials, DataCategory, Identity, Role, SubjectRegistration};
//! use consent_kernel::store::SqliteStore;
//!
//! async fn example() {
//!     // Open storage
//!     let store = SqliteStore::open("consent.db").unwrap();
//!
//!     // Create the engine and its root administrator
//!     let engine = Engine::new(store, EngineConfig::default());
//!     let root = Identity::new("root");
//!     engine.initialize(&root, ActorCredentials::default()).await.unwrap();
//!
//!     // Register a subject and a verified provider
//!     let pt = Identity::new("pt-1");
//!     let dr = Identity::new("dr-1");
//!     engine.register_subject(&pt, SubjectRegistration::born("1970-01-01")).await.unwrap();
//!     engine.register_actor(&root, &dr, Role::Doctor, ActorCredentials::default()).await.unwrap();
//!     engine.verify_actor(&root, &dr).await.unwrap();
//!
//!     // The subject grants consent, the provider is allowed
//!     engine
//!         .grant_consent(&pt, GrantConsent::new(dr.clone(), DataCategory::LabResults).duration(3600))
//!         .await
//!         .unwrap();
//!     let decision = engine
//!         .authorize(&dr, &pt, DataCategory::LabResults, "follow-up")
//!         .await
//!         .unwrap();
//!     assert!(decision.is_allowed());
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `consent_kernel::core` - Core records (ConsentGrant, Actor, AuditEntry, etc.)
//! - `consent_kernel::store` - Storage abstraction and SQLite
//! - `consent_kernel::perms` - Role matrix and the decision function

pub mod authorize;
pub mod config;
pub mod emergency;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod workflow;

// Re-export component crates
pub use consent_kernel_core as core;
pub use consent_kernel_perms as perms;
pub use consent_kernel_store as store;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, ErrorKind, Missing, Result};
pub use ledger::GrantConsent;

// Re-export commonly used types
pub use consent_kernel_core::{
    AuditEntry, ConsentGrant, ConsentKey, ConsentStatus, DataCategory, Identity, Role,
    SeverityLevel, Timestamp,
};
pub use consent_kernel_perms::{AllowBasis, Decision, DenyReason};
