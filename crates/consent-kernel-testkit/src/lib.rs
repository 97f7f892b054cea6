//! # Consent Kernel Testkit
//!
//! Testing utilities for the Consent Kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an initialized engine on a manual clock, over either store
//! - **Generators**: Proptest strategies, including whole operation sequences
//! - **Scenarios**: a fixed cast of subjects and actors that generated
//!   operations run against
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,no_run
//! use consent_kernel_testkit::fixtures::TestFixture;
//! use consent_kernel::{DataCategory, Role};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let fx = TestFixture::new().await?;
//!     let pt = fx.subject("pt").await?;
//!     let dr = fx.actor("dr", Role::Doctor).await?;
//!     fx.grant(&pt, &dr, DataCategory::Imaging, Some(100)).await?;
//!     fx.at(150);
//!     Ok(())
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use consent_kernel_testkit::generators::{ops, Scenario};
//!
//! proptest! {
//!     #[test]
//!     fn audit_chain_always_verifies(ops in ops(40)) {
//!         // run each op through Scenario::apply, then verify the trail
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{init_tracing, TestFixture, ROOT_ADMIN};
pub use generators::{ops, Op, Outcome, Scenario};
