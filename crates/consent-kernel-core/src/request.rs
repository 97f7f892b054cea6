//! Formal access requests.
//!
//! ```text
//! pending --approve--> approved
//! pending --deny-----> denied
//! ```
//!
//! Both outcomes are terminal. Approval is a procedural record only; it never
//! grants consent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::role::DataCategory;
use crate::types::{Identity, RequestId, Timestamp};

/// State of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RequestStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Denied => "denied",
        })
    }
}

/// A recorded request by an actor for access to one category of a subject's
/// data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: RequestId,
    pub requester: Identity,
    pub subject: Identity,
    pub category: DataCategory,
    pub purpose: String,
    pub requested_at: Timestamp,
    pub status: RequestStatus,
    pub decided_by: Option<Identity>,
    pub decided_at: Option<Timestamp>,
    pub decision_note: Option<String>,
}

impl AccessRequest {
    /// A new pending request.
    pub fn pending(
        id: RequestId,
        requester: Identity,
        subject: Identity,
        category: DataCategory,
        purpose: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            requester,
            subject,
            category,
            purpose: purpose.into(),
            requested_at: now,
            status: RequestStatus::Pending,
            decided_by: None,
            decided_at: None,
            decision_note: None,
        }
    }

    /// Move from pending to `to`. Fails if already decided or if `to` is
    /// `Pending`.
    pub fn decide(
        &mut self,
        to: RequestStatus,
        by: Identity,
        now: Timestamp,
        note: Option<String>,
    ) -> Result<(), CoreError> {
        if self.status.is_terminal() || to == RequestStatus::Pending {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.decided_by = Some(by);
        self.decided_at = Some(now);
        self.decision_note = note;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AccessRequest {
        AccessRequest::pending(
            RequestId(1),
            Identity::new("dr"),
            Identity::new("pt"),
            DataCategory::Imaging,
            "pre-op review",
            3,
        )
    }

    #[test]
    fn test_approve_once() {
        let mut r = request();
        r.decide(RequestStatus::Approved, Identity::new("admin"), 4, None)
            .unwrap();
        assert_eq!(r.status, RequestStatus::Approved);
        assert_eq!(r.decided_at, Some(4));

        let err = r
            .decide(RequestStatus::Denied, Identity::new("admin"), 5, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(r.status, RequestStatus::Approved);
    }

    #[test]
    fn test_cannot_decide_back_to_pending() {
        let mut r = request();
        assert!(r
            .decide(RequestStatus::Pending, Identity::new("admin"), 4, None)
            .is_err());
    }
}
