//! # Consent Kernel Permissions
//!
//! The role permission matrix and the authorization decision function.
//!
//! ## Overview
//!
//! Everything in this crate is pure: no storage, no clock, no side effects.
//! The engine loads the actor, consent rows and override rows, reads the
//! clock once, and hands the lot to [`evaluate`]. The same inputs always
//! produce the same [`Decision`].
//!
//! ## Decision order
//!
//! First match wins:
//!
//! 1. The actor must be registered, verified and active.
//! 2. Admins are allowed; emergency responders with a live override for the
//!    subject are allowed.
//! 3. The role matrix must allow the category.
//! 4. A consent for the exact category (or for `all`) must be active and
//!    unexpired.
//!
//! The role matrix is a ceiling. Outside the admin and override rules it
//! never authorizes access on its own.

pub mod decision;
pub mod matrix;

pub use decision::{evaluate, AllowBasis, Decision, DecisionInput, DenyReason};
pub use matrix::{allowed_categories, role_allows};
