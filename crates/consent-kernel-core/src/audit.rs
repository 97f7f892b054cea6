//! The audit trail: append-only, totally ordered, hash-chained.
//!
//! Every authorization decision and every state mutation produces one
//! [`AuditRecord`]. The store seals it into an [`AuditEntry`] by assigning the
//! next sequence number and linking it to the previous entry's hash:
//!
//! ```text
//! hash(n) = Blake3(AUDIT_DOMAIN || canonical(seq n, record n, hash(n-1)))
//! ```
//!
//! Entry 1 links to [`AuditHash::ZERO`]. Editing, dropping or reordering any
//! entry breaks every hash after it, which [`verify_chain`] detects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_entry_bytes;
use crate::error::CoreError;
use crate::role::DataCategory;
use crate::types::{Identity, Timestamp};

/// Domain separator for audit entry hashes.
pub const AUDIT_DOMAIN: &[u8] = b"consent-kernel/audit/v1";

/// A 32-byte Blake3 hash of an audit entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditHash(pub [u8; 32]);

impl AuditHash {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The zero hash: the link target of the first entry.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for AuditHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuditHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for AuditHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl TryFrom<&[u8]> for AuditHash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Initialized,
    SubjectRegistered,
    SubjectUpdated,
    PreferencesUpdated,
    SubjectDeceased,
    ActorRegistered,
    ActorVerified,
    ActorDeactivated,
    ConsentGranted,
    ConsentRevoked,
    ConsentSuspended,
    ConsentResumed,
    ConsentPurposeUpdated,
    AccessRequested,
    RequestApproved,
    RequestDenied,
    EmergencyAccess,
    OverrideNotified,
    AccessDecision,
    Paused,
    Unpaused,
    ConfigUpdated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Initialized => "initialized",
            AuditAction::SubjectRegistered => "subject-registered",
            AuditAction::SubjectUpdated => "subject-updated",
            AuditAction::PreferencesUpdated => "preferences-updated",
            AuditAction::SubjectDeceased => "subject-deceased",
            AuditAction::ActorRegistered => "actor-registered",
            AuditAction::ActorVerified => "actor-verified",
            AuditAction::ActorDeactivated => "actor-deactivated",
            AuditAction::ConsentGranted => "consent-granted",
            AuditAction::ConsentRevoked => "consent-revoked",
            AuditAction::ConsentSuspended => "consent-suspended",
            AuditAction::ConsentResumed => "consent-resumed",
            AuditAction::ConsentPurposeUpdated => "consent-purpose-updated",
            AuditAction::AccessRequested => "access-requested",
            AuditAction::RequestApproved => "request-approved",
            AuditAction::RequestDenied => "request-denied",
            AuditAction::EmergencyAccess => "emergency-access",
            AuditAction::OverrideNotified => "override-notified",
            AuditAction::AccessDecision => "access-decision",
            AuditAction::Paused => "paused",
            AuditAction::Unpaused => "unpaused",
            AuditAction::ConfigUpdated => "config-updated",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the audited operation was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditOutcome {
    Authorized,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Authorized => "authorized",
            AuditOutcome::Denied => "denied",
        }
    }
}

/// An audit record before it has been sequenced and chained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// The caller that performed the operation.
    pub actor: Identity,
    pub subject: Option<Identity>,
    pub category: Option<DataCategory>,
    pub action: AuditAction,
    pub timestamp: Timestamp,
    pub outcome: AuditOutcome,
    pub reason: String,
}

impl AuditRecord {
    /// An authorized record with no subject, category or reason.
    pub fn new(actor: Identity, action: AuditAction, timestamp: Timestamp) -> Self {
        Self {
            actor,
            subject: None,
            category: None,
            action,
            timestamp,
            outcome: AuditOutcome::Authorized,
            reason: String::new(),
        }
    }

    pub fn subject(mut self, subject: Identity) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn category(mut self, category: DataCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// A sealed, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub record: AuditRecord,
    pub prev_hash: AuditHash,
    pub hash: AuditHash,
}

impl AuditEntry {
    /// Sequence and chain a record.
    pub fn seal(seq: u64, record: AuditRecord, prev_hash: AuditHash) -> Result<Self, CoreError> {
        let hash = compute_hash(seq, &record, &prev_hash)?;
        Ok(Self {
            seq,
            record,
            prev_hash,
            hash,
        })
    }

    /// Seal a record as the successor of `prev` (or as the first entry).
    pub fn seal_after(prev: Option<&AuditEntry>, record: AuditRecord) -> Result<Self, CoreError> {
        match prev {
            Some(p) => Self::seal(p.seq + 1, record, p.hash),
            None => Self::seal(1, record, AuditHash::ZERO),
        }
    }

    /// Recompute the hash and compare it with the stored one.
    pub fn verify_hash(&self) -> Result<(), CoreError> {
        let expected = compute_hash(self.seq, &self.record, &self.prev_hash)?;
        if expected != self.hash {
            return Err(CoreError::AuditChainBroken {
                seq: self.seq,
                detail: format!("stored hash {} does not match content", self.hash),
            });
        }
        Ok(())
    }
}

fn compute_hash(seq: u64, record: &AuditRecord, prev: &AuditHash) -> Result<AuditHash, CoreError> {
    let canonical = canonical_entry_bytes(seq, record, prev)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(AUDIT_DOMAIN);
    hasher.update(&canonical);
    Ok(AuditHash(*hasher.finalize().as_bytes()))
}

/// Verify a contiguous run of entries.
///
/// `anchor` is the entry immediately before `entries[0]`, or `None` if the
/// run starts at sequence 1.
pub fn verify_chain(anchor: Option<&AuditEntry>, entries: &[AuditEntry]) -> Result<(), CoreError> {
    let (mut expected_seq, mut expected_prev) = match anchor {
        Some(a) => (a.seq + 1, a.hash),
        None => (1, AuditHash::ZERO),
    };

    for entry in entries {
        if entry.seq != expected_seq {
            return Err(CoreError::AuditChainBroken {
                seq: entry.seq,
                detail: format!("expected seq {}", expected_seq),
            });
        }
        if entry.prev_hash != expected_prev {
            return Err(CoreError::AuditChainBroken {
                seq: entry.seq,
                detail: format!("link {} does not match previous hash {}", entry.prev_hash, expected_prev),
            });
        }
        entry.verify_hash()?;

        expected_seq += 1;
        expected_prev = entry.hash;
    }

    Ok(())
}
