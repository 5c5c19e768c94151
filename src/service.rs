//! Service layer API for certificate workflow operations
//!
//! Thin adapter over a sled database: load the entity, apply the pure
//! transition from the core modules, write back under compare-and-swap.
//! A lost swap surfaces as `EngineError::ConcurrentModification`; that
//! is the one error callers are expected to retry after reloading.
use std::sync::Arc;

use tracing::debug;

use crate::certificate::{Certificate, CertificateDraft};
use crate::error::EngineError;
use crate::ledger::ApprovalRecord;
use crate::request::CertificateRequest;
use crate::share::ShareToken;
use crate::timestamp::TimeStamp;
use crate::utils::{new_share_token, new_uuid_to_bech32};
use crate::verification::{Document, VerificationStep};

pub struct CertificateService {
    instance: Arc<sled::Db>,
}

impl CertificateService {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    /// Compare-and-swap write against the bytes read earlier. `None`
    /// for `old` inserts a fresh record and refuses to overwrite.
    fn swap(&self, key: &str, old: Option<&[u8]>, new: Vec<u8>) -> anyhow::Result<()> {
        self.instance
            .compare_and_swap(key.as_bytes(), old, Some(new))?
            .map_err(|_| EngineError::ConcurrentModification(key.to_string()))?;
        Ok(())
    }

    fn load_request(&self, id: &str) -> anyhow::Result<(Vec<u8>, CertificateRequest)> {
        let bytes = self
            .instance
            .get(id.as_bytes())?
            .ok_or_else(|| anyhow::anyhow!("certificate request not found: {id}"))?;
        let request = minicbor::decode(&bytes)?;
        Ok((bytes.to_vec(), request))
    }

    fn load_certificate(&self, id: &str) -> anyhow::Result<(Vec<u8>, Certificate)> {
        let bytes = self
            .instance
            .get(id.as_bytes())?
            .ok_or_else(|| anyhow::anyhow!("certificate not found: {id}"))?;
        let certificate = minicbor::decode(&bytes)?;
        Ok((bytes.to_vec(), certificate))
    }

    fn load_token(&self, token: &str) -> anyhow::Result<(Vec<u8>, ShareToken)> {
        let bytes = self
            .instance
            .get(token.as_bytes())?
            .ok_or_else(|| anyhow::anyhow!("share token not found"))?;
        let share_token = minicbor::decode(&bytes)?;
        Ok((bytes.to_vec(), share_token))
    }

    fn load_document(&self, id: &str) -> anyhow::Result<(Vec<u8>, Document)> {
        let bytes = self
            .instance
            .get(id.as_bytes())?
            .ok_or_else(|| anyhow::anyhow!("document not found: {id}"))?;
        let document = minicbor::decode(&bytes)?;
        Ok((bytes.to_vec(), document))
    }

    /// Persist a freshly drafted request built by the client.
    pub fn open_request(&self, request: CertificateRequest) -> anyhow::Result<CertificateRequest> {
        self.swap(&request.id, None, minicbor::to_vec(&request)?)?;
        debug!(request_id = %request.id, "opened certificate request");
        Ok(request)
    }

    /// Client-side edit of a draft. The edit gate and the priority
    /// clamp both apply here, on every write.
    pub fn update_request(
        &self,
        updated: CertificateRequest,
    ) -> anyhow::Result<CertificateRequest> {
        let (old, current) = self.load_request(&updated.id)?;
        if !current.status.can_edit() {
            return Err(EngineError::PreconditionFailed(format!(
                "request {} is not editable in status {}",
                current.id, current.status
            ))
            .into());
        }

        let priority = updated.priority;
        let updated = updated.set_priority(priority);
        self.swap(&updated.id, Some(&old), minicbor::to_vec(&updated)?)?;
        Ok(updated)
    }

    pub fn submit_request(&self, request_id: &str) -> anyhow::Result<CertificateRequest> {
        let (old, request) = self.load_request(request_id)?;
        let next = request.submit(TimeStamp::new())?;
        self.swap(request_id, Some(&old), minicbor::to_vec(&next)?)?;
        debug!(request_id, "certificate request submitted");
        Ok(next)
    }

    pub fn assign_reviewer(
        &self,
        request_id: &str,
        reviewer_id: &str,
        reviewer_name: &str,
    ) -> anyhow::Result<CertificateRequest> {
        let (old, request) = self.load_request(request_id)?;
        let next = request.assign(reviewer_id, reviewer_name, TimeStamp::new())?;
        self.swap(request_id, Some(&old), minicbor::to_vec(&next)?)?;
        debug!(request_id, reviewer_id, "reviewer assigned");
        Ok(next)
    }

    /// Apply a reviewer action. The ledger entry and the status change
    /// land in one record write, so a reader never sees one without
    /// the other. The caller drives any follow-up notification from
    /// the returned status.
    pub fn review_request(
        &self,
        request_id: &str,
        record: ApprovalRecord,
    ) -> anyhow::Result<CertificateRequest> {
        let (old, request) = self.load_request(request_id)?;
        let next = request.review(record)?;
        self.swap(request_id, Some(&old), minicbor::to_vec(&next)?)?;
        debug!(request_id, status = %next.status, "review recorded");
        Ok(next)
    }

    pub fn cancel_request(&self, request_id: &str) -> anyhow::Result<CertificateRequest> {
        let (old, request) = self.load_request(request_id)?;
        let next = request.cancel(TimeStamp::new())?;
        self.swap(request_id, Some(&old), minicbor::to_vec(&next)?)?;
        debug!(request_id, "certificate request cancelled");
        Ok(next)
    }

    /// Issue a certificate from an approved request: the draft is
    /// validated first, then the request is linked and the certificate
    /// record inserted.
    pub fn issue_certificate(
        &self,
        request_id: &str,
        draft: CertificateDraft,
    ) -> anyhow::Result<(CertificateRequest, Certificate)> {
        let (old, request) = self.load_request(request_id)?;

        let now = TimeStamp::new();
        let certificate_id = new_uuid_to_bech32("cert_")?;
        let certificate = draft.issue(certificate_id.clone(), now.clone())?;
        let next = request.link_certificate(&certificate_id, now)?;

        self.swap(request_id, Some(&old), minicbor::to_vec(&next)?)?;
        self.swap(&certificate_id, None, minicbor::to_vec(&certificate)?)?;
        debug!(request_id, certificate_id = %certificate.id, "certificate issued");
        Ok((next, certificate))
    }

    pub fn revoke_certificate(
        &self,
        certificate_id: &str,
        reason: &str,
    ) -> anyhow::Result<Certificate> {
        let (old, certificate) = self.load_certificate(certificate_id)?;
        let next = certificate.revoke(reason, TimeStamp::new())?;
        self.swap(certificate_id, Some(&old), minicbor::to_vec(&next)?)?;
        debug!(certificate_id, "certificate revoked");
        Ok(next)
    }

    pub fn record_access(&self, certificate_id: &str) -> anyhow::Result<Certificate> {
        let (old, certificate) = self.load_certificate(certificate_id)?;
        let next = certificate.record_access(TimeStamp::new());
        self.swap(certificate_id, Some(&old), minicbor::to_vec(&next)?)?;
        Ok(next)
    }

    pub fn record_download(&self, certificate_id: &str) -> anyhow::Result<Certificate> {
        let (old, certificate) = self.load_certificate(certificate_id)?;
        let next = certificate.record_download(TimeStamp::new());
        self.swap(certificate_id, Some(&old), minicbor::to_vec(&next)?)?;
        Ok(next)
    }

    /// Mint a share token for an active certificate.
    pub fn share_certificate(
        &self,
        certificate_id: &str,
        created_by: &str,
        ttl_seconds: i64,
        max_access: Option<u32>,
        password: Option<String>,
    ) -> anyhow::Result<ShareToken> {
        let (old, certificate) = self.load_certificate(certificate_id)?;
        let now = TimeStamp::new();
        if !certificate.is_active(&now) {
            return Err(EngineError::PreconditionFailed(format!(
                "certificate {certificate_id} is not active and cannot be shared"
            ))
            .into());
        }

        let token = ShareToken::issue(
            new_share_token(),
            certificate_id,
            created_by,
            now.clone(),
            ttl_seconds,
            max_access,
            password,
        )?;
        let next = certificate.record_share(&token.token, now);

        self.swap(certificate_id, Some(&old), minicbor::to_vec(&next)?)?;
        self.swap(&token.token, None, minicbor::to_vec(&token)?)?;
        debug!(certificate_id, "share token issued");
        Ok(token)
    }

    /// Token-gated third-party access. Validation and counter
    /// increment commit through a single swap on the token record, so
    /// two concurrent consumers of the last slot cannot both succeed.
    pub fn access_shared(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> anyhow::Result<Certificate> {
        let (old_token, share_token) = self.load_token(token)?;
        let now = TimeStamp::new();
        let (consumed, certificate_id) = share_token.validate_and_consume(&now, password)?;
        self.swap(token, Some(&old_token), minicbor::to_vec(&consumed)?)?;

        // The slot is spent at this point. The access counter must not
        // cost the caller another one, so a lost swap here retries
        // against a fresh read instead of surfacing.
        loop {
            let (old_cert, certificate) = self.load_certificate(&certificate_id)?;
            let accessed = certificate.record_access(now.clone());
            match self.swap(&certificate_id, Some(&old_cert), minicbor::to_vec(&accessed)?) {
                Ok(()) => return Ok(accessed),
                Err(err)
                    if matches!(
                        err.downcast_ref::<EngineError>(),
                        Some(EngineError::ConcurrentModification(_))
                    ) => {}
                Err(err) => return Err(err),
            }
        }
    }

    pub fn revoke_share(&self, token: &str) -> anyhow::Result<ShareToken> {
        let (old, share_token) = self.load_token(token)?;
        let next = share_token.revoke();
        self.swap(token, Some(&old), minicbor::to_vec(&next)?)?;
        debug!(certificate_id = %next.certificate_id, "share token revoked");
        Ok(next)
    }

    pub fn register_document(&self, document: Document) -> anyhow::Result<Document> {
        self.swap(&document.id, None, minicbor::to_vec(&document)?)?;
        debug!(document_id = %document.id, "document registered");
        Ok(document)
    }

    pub fn record_verification(
        &self,
        document_id: &str,
        step: VerificationStep,
    ) -> anyhow::Result<Document> {
        let (old, document) = self.load_document(document_id)?;
        let next = document.record_step(step);
        self.swap(document_id, Some(&old), minicbor::to_vec(&next)?)?;
        debug!(document_id, status = ?next.trail.current_status(), "verification step recorded");
        Ok(next)
    }

    pub fn get_request(&self, request_id: &str) -> anyhow::Result<CertificateRequest> {
        Ok(self.load_request(request_id)?.1)
    }

    pub fn get_certificate(&self, certificate_id: &str) -> anyhow::Result<Certificate> {
        Ok(self.load_certificate(certificate_id)?.1)
    }

    pub fn get_token(&self, token: &str) -> anyhow::Result<ShareToken> {
        Ok(self.load_token(token)?.1)
    }

    pub fn get_document(&self, document_id: &str) -> anyhow::Result<Document> {
        Ok(self.load_document(document_id)?.1)
    }
}
