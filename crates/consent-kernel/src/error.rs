//! Error types for the Engine.

use std::fmt;

use consent_kernel_core::CoreError;
use consent_kernel_store::StoreError;
use thiserror::Error;

/// Which record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Missing {
    Subject,
    Actor,
    Consent,
    Request,
    Override,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Missing::Subject => "subject",
            Missing::Actor => "actor",
            Missing::Consent => "consent",
            Missing::Request => "access request",
            Missing::Override => "emergency override",
        })
    }
}

/// Errors that can occur during Engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller is unknown, unverified, deactivated, or lacks the required role.
    #[error("caller is not authorized")]
    Unauthorized,

    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(Missing),

    /// Duplicate registration, or a transition that has already happened.
    #[error("already exists")]
    AlreadyExists,

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid data category: {0}")]
    InvalidDataType(String),

    #[error("invalid duration")]
    InvalidDuration,

    #[error("consent has expired")]
    Expired,

    /// The role matrix or a subject preference forbids the operation.
    #[error("insufficient permissions")]
    InsufficientPermissions,

    #[error("system is paused")]
    SystemPaused,

    #[error("patient is deceased")]
    PatientDeceased,

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Core invariant violation, e.g. a broken audit chain.
    #[error("core error: {0}")]
    Core(CoreError),
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRole(name) => EngineError::InvalidRole(name),
            CoreError::InvalidDataType(name) => EngineError::InvalidDataType(name),
            other => EngineError::Core(other),
        }
    }
}

/// The flat error taxonomy callers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    AlreadyExists,
    InvalidRole,
    InvalidDataType,
    InvalidDuration,
    Expired,
    InsufficientPermissions,
    SystemPaused,
    PatientDeceased,
    /// Storage or integrity failure.
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Unauthorized => ErrorKind::Unauthorized,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists => ErrorKind::AlreadyExists,
            EngineError::InvalidRole(_) => ErrorKind::InvalidRole,
            EngineError::InvalidDataType(_) => ErrorKind::InvalidDataType,
            EngineError::InvalidDuration => ErrorKind::InvalidDuration,
            EngineError::Expired => ErrorKind::Expired,
            EngineError::InsufficientPermissions => ErrorKind::InsufficientPermissions,
            EngineError::SystemPaused => ErrorKind::SystemPaused,
            EngineError::PatientDeceased => ErrorKind::PatientDeceased,
            EngineError::Store(_) | EngineError::Core(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for Engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_map_to_taxonomy() {
        let err: EngineError = CoreError::InvalidRole("janitor".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidRole);

        let err: EngineError = CoreError::InvalidDataType("dental".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidDataType);

        let err: EngineError = CoreError::AuditChainBroken {
            seq: 4,
            detail: String::new(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_not_found_names_the_record() {
        assert_eq!(
            EngineError::NotFound(Missing::Consent).to_string(),
            "consent not found"
        );
        assert_eq!(
            EngineError::NotFound(Missing::Subject).to_string(),
            "subject not found"
        );
    }
}
