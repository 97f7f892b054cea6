//! Error types for the Consent Kernel Core.

use thiserror::Error;

/// Core errors raised while parsing vocabulary or checking record invariants.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid data category: {0}")]
    InvalidDataType(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("audit chain broken at seq {seq}: {detail}")]
    AuditChainBroken { seq: u64, detail: String },

    #[error("encoding error: {0}")]
    EncodingError(String),
}
