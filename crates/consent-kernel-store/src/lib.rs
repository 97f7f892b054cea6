//! # Consent Kernel Store
//!
//! Storage abstraction for the Consent Kernel. Provides a trait-based interface
//! for persisting registry rows, consent grants, access requests, emergency
//! overrides, settings and the audit trail, with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`Transaction`] - A batch of writes plus their audit records
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use consent_kernel_store::{SqliteStore, Store, StoreExt, Transaction};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("consent.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // Check the audit chain end to end
//!     let verified = store.verify_audit_chain().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic commits**: state writes and audit entries persist together or not at all
//! - **Append-only audit**: SQLite triggers abort any UPDATE or DELETE on `audit_log`
//! - **Store-assigned sequence**: the audit hash chain is sealed inside the commit

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreExt, Transaction, Write};
