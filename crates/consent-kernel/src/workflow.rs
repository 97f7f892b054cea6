//! Access Request Workflow.
//!
//! Requests record intent only. Approving one does not create a consent; the
//! subject still has to grant it.

use consent_kernel_core::{
    AccessRequest, AuditAction, AuditRecord, DataCategory, Identity, RequestId, RequestStatus,
};
use consent_kernel_perms::role_allows;
use consent_kernel_store::{Store, Transaction, Write};

use crate::engine::Engine;
use crate::error::{EngineError, Missing, Result};

impl<S: Store> Engine<S> {
    /// File a pending request for one category of `subject`'s data.
    pub async fn request_access(
        &self,
        caller: &Identity,
        subject: &Identity,
        category: DataCategory,
        purpose: &str,
    ) -> Result<AccessRequest> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        let actor = match self.store.get_actor(caller).await? {
            Some(actor) if actor.is_usable() => actor,
            _ => {
                tracing::warn!(caller = %caller, "access request from unusable actor");
                return Err(EngineError::Unauthorized);
            }
        };
        if !role_allows(actor.role, category) {
            return Err(EngineError::InsufficientPermissions);
        }
        self.require_living_subject(subject).await?;

        let id = self.store.next_request_id().await?;
        let request = AccessRequest::pending(id, caller.clone(), subject.clone(), category, purpose, now);
        let tx = Transaction::new()
            .write(Write::Request(request.clone()))
            .audit(
                AuditRecord::new(caller.clone(), AuditAction::AccessRequested, now)
                    .subject(subject.clone())
                    .category(category)
                    .reason(format!("{}: {}", id, purpose)),
            );
        self.commit(tx).await?;

        tracing::info!(request = %id, requester = %caller, subject = %subject, %category, "access requested");
        Ok(request)
    }

    /// Mark a pending request approved. Administrators only.
    pub async fn approve_access_request(&self, caller: &Identity, id: RequestId) -> Result<AccessRequest> {
        self.decide_request(caller, id, RequestStatus::Approved, None).await
    }

    /// Mark a pending request denied. Administrators only.
    pub async fn deny_access_request(
        &self,
        caller: &Identity,
        id: RequestId,
        note: Option<String>,
    ) -> Result<AccessRequest> {
        self.decide_request(caller, id, RequestStatus::Denied, note).await
    }

    async fn decide_request(
        &self,
        caller: &Identity,
        id: RequestId,
        to: RequestStatus,
        note: Option<String>,
    ) -> Result<AccessRequest> {
        let _gate = self.gate.lock().await;
        let now = self.clock.now();

        self.ensure_unpaused().await?;
        self.require_admin(caller).await?;
        let mut request = self
            .store
            .get_request(id)
            .await?
            .ok_or(EngineError::NotFound(Missing::Request))?;
        if request.status != RequestStatus::Pending {
            return Err(EngineError::AlreadyExists);
        }
        request.decide(to, caller.clone(), now, note.clone())?;

        let action = match to {
            RequestStatus::Denied => AuditAction::RequestDenied,
            _ => AuditAction::RequestApproved,
        };
        let mut record = AuditRecord::new(caller.clone(), action, now)
            .subject(request.subject.clone())
            .category(request.category);
        record = match note {
            Some(note) => record.reason(format!("{}: {}", id, note)),
            None => record.reason(id.to_string()),
        };
        let tx = Transaction::new()
            .write(Write::Request(request.clone()))
            .audit(record);
        self.commit(tx).await?;

        tracing::info!(request = %id, status = %request.status, decided_by = %caller, "access request decided");
        Ok(request)
    }

    /// Look up a request by id.
    pub async fn access_request(&self, id: RequestId) -> Result<Option<AccessRequest>> {
        Ok(self.store.get_request(id).await?)
    }

    /// Every request concerning `subject`. Visible to the subject and to
    /// administrators.
    pub async fn access_requests_for(&self, caller: &Identity, subject: &Identity) -> Result<Vec<AccessRequest>> {
        self.require_self_or_admin(caller, subject).await?;
        Ok(self.store.list_requests(subject).await?)
    }
}
