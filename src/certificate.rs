//! Issued certificate lifecycle and derived validity reads
use chrono::Utc;

use crate::error::EngineError;
use crate::share::ShareToken;
use crate::status::CertificateStatus;
use crate::timestamp::TimeStamp;

/// Days before expiry at which a certificate counts as near-expiry.
pub const NEAR_EXPIRY_DAYS: i64 = 30;

/// An issued certificate. Workflow history lives in `status`; current
/// validity lives in the revocation flag and the derived expiry read.
/// The two axes are deliberately separate so audit queries can still
/// see "was issued" on a certificate that is no longer valid.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Certificate {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub template_id: Option<String>,
    #[n(2)]
    pub issuer_id: String,
    #[n(3)]
    pub issuer_name: String,
    #[n(4)]
    pub recipient_id: String,
    #[n(5)]
    pub recipient_name: String,
    #[n(6)]
    pub recipient_email: String,
    #[n(7)]
    pub organization_id: String,
    #[n(8)]
    pub organization_name: String,
    #[n(9)]
    pub verification_code: String,
    #[n(10)]
    pub verification_id: Option<String>,
    #[n(11)]
    pub content_hash: String,
    #[n(12)]
    pub signature: String,
    #[n(13)]
    pub title: String,
    #[n(14)]
    pub description: String,
    #[n(15)]
    pub certificate_type: String,
    #[n(16)]
    pub course: Option<String>,
    #[n(17)]
    pub grade: Option<String>,
    #[n(18)]
    pub credits: Option<u32>,
    #[n(19)]
    pub status: CertificateStatus,
    #[n(20)]
    pub verification_level: u8,
    #[n(21)]
    pub is_verified: bool,
    #[n(22)]
    pub is_revoked: bool,
    #[n(23)]
    pub revocation_reason: Option<String>,
    #[n(24)]
    pub share_tokens: Vec<String>,
    #[n(25)]
    pub allowed_viewers: Vec<String>,
    #[n(26)]
    pub is_public: bool,
    #[n(27)]
    pub access_count: u64,
    #[n(28)]
    pub download_count: u64,
    #[n(29)]
    pub share_count: u64,
    #[n(30)]
    pub issued_at: TimeStamp<Utc>,
    #[n(31)]
    pub completed_at: Option<TimeStamp<Utc>>,
    #[n(32)]
    pub expires_at: Option<TimeStamp<Utc>>,
    #[n(33)]
    pub last_accessed_at: Option<TimeStamp<Utc>>,
    #[n(34)]
    pub created_at: TimeStamp<Utc>,
    #[n(35)]
    pub updated_at: TimeStamp<Utc>,
}

/// Builder for a certificate about to be issued from an approved
/// request. The verification code, hash and signature come from an
/// external crypto collaborator.
#[derive(Debug, Default)]
pub struct CertificateDraft {
    template_id: Option<String>,
    issuer_id: Option<String>,
    issuer_name: Option<String>,
    recipient_id: Option<String>,
    recipient_name: Option<String>,
    recipient_email: Option<String>,
    organization_id: Option<String>,
    organization_name: Option<String>,
    verification_code: Option<String>,
    verification_id: Option<String>,
    content_hash: Option<String>,
    signature: Option<String>,
    title: Option<String>,
    description: Option<String>,
    certificate_type: Option<String>,
    course: Option<String>,
    grade: Option<String>,
    credits: Option<u32>,
    verification_level: u8,
    allowed_viewers: Vec<String>,
    is_public: bool,
    completed_at: Option<TimeStamp<Utc>>,
    expires_at: Option<TimeStamp<Utc>>,
}

impl CertificateDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn template(mut self, template_id: &str) -> Self {
        self.template_id = Some(template_id.into());
        self
    }
    pub fn issuer(mut self, id: &str, name: &str) -> Self {
        self.issuer_id = Some(id.into());
        self.issuer_name = Some(name.into());
        self
    }
    pub fn recipient(mut self, id: &str, name: &str, email: &str) -> Self {
        self.recipient_id = Some(id.into());
        self.recipient_name = Some(name.into());
        self.recipient_email = Some(email.into());
        self
    }
    pub fn organization(mut self, id: &str, name: &str) -> Self {
        self.organization_id = Some(id.into());
        self.organization_name = Some(name.into());
        self
    }
    pub fn verification_code(mut self, code: &str) -> Self {
        self.verification_code = Some(code.into());
        self
    }
    pub fn verification_id(mut self, id: &str) -> Self {
        self.verification_id = Some(id.into());
        self
    }
    pub fn content_hash(mut self, hash: &str) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
    /// Signature bytes from the external signer, stored hex encoded.
    pub fn signature(mut self, signature: &[u8]) -> Self {
        self.signature = Some(hex::encode(signature));
        self
    }
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn certificate_type(mut self, certificate_type: &str) -> Self {
        self.certificate_type = Some(certificate_type.into());
        self
    }
    pub fn course(mut self, course: &str) -> Self {
        self.course = Some(course.into());
        self
    }
    pub fn grade(mut self, grade: &str) -> Self {
        self.grade = Some(grade.into());
        self
    }
    pub fn credits(mut self, credits: u32) -> Self {
        self.credits = Some(credits);
        self
    }
    pub fn verification_level(mut self, level: u8) -> Self {
        self.verification_level = level;
        self
    }
    pub fn allow_viewer(mut self, viewer_id: &str) -> Self {
        self.allowed_viewers.push(viewer_id.into());
        self
    }
    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }
    pub fn completed_at(mut self, at: TimeStamp<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
    pub fn expires_at(mut self, at: TimeStamp<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Validate required fields and construct the certificate directly
    /// in Issued status. Reports every missing field at once.
    pub fn issue(self, id: String, now: TimeStamp<Utc>) -> Result<Certificate, EngineError> {
        let mut missing = Vec::new();
        let required = [
            ("issuer_id", self.issuer_id.is_none()),
            ("recipient_id", self.recipient_id.is_none()),
            ("recipient_name", self.recipient_name.is_none()),
            ("title", self.title.is_none()),
            ("certificate_type", self.certificate_type.is_none()),
            ("verification_code", self.verification_code.is_none()),
            ("content_hash", self.content_hash.is_none()),
            ("signature", self.signature.is_none()),
        ];
        for (name, absent) in required {
            if absent {
                missing.push(name.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::Validation(missing));
        }

        Ok(Certificate {
            id,
            template_id: self.template_id,
            issuer_id: self.issuer_id.unwrap_or_default(),
            issuer_name: self.issuer_name.unwrap_or_default(),
            recipient_id: self.recipient_id.unwrap_or_default(),
            recipient_name: self.recipient_name.unwrap_or_default(),
            recipient_email: self.recipient_email.unwrap_or_default(),
            organization_id: self.organization_id.unwrap_or_default(),
            organization_name: self.organization_name.unwrap_or_default(),
            verification_code: self.verification_code.unwrap_or_default(),
            verification_id: self.verification_id,
            content_hash: self.content_hash.unwrap_or_default(),
            signature: self.signature.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            certificate_type: self.certificate_type.unwrap_or_default(),
            course: self.course,
            grade: self.grade,
            credits: self.credits,
            status: CertificateStatus::Issued,
            verification_level: self.verification_level,
            is_verified: true,
            is_revoked: false,
            revocation_reason: None,
            share_tokens: Vec::new(),
            allowed_viewers: self.allowed_viewers,
            is_public: self.is_public,
            access_count: 0,
            download_count: 0,
            share_count: 0,
            issued_at: now.clone(),
            completed_at: self.completed_at,
            expires_at: self.expires_at,
            last_accessed_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

impl Certificate {
    /// Derived at read time from the wall clock, never stored.
    pub fn is_expired(&self, now: &TimeStamp<Utc>) -> bool {
        match &self.expires_at {
            Some(expires) => now.to_datetime_utc() > expires.to_datetime_utc(),
            None => false,
        }
    }

    pub fn is_active(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == CertificateStatus::Issued && !self.is_revoked && !self.is_expired(now)
    }

    pub fn is_near_expiry(&self, now: &TimeStamp<Utc>) -> bool {
        match &self.expires_at {
            Some(expires) => {
                let days = expires.days_until(now);
                days > 0 && days <= NEAR_EXPIRY_DAYS
            }
            None => false,
        }
    }

    pub fn can_be_shared(&self, now: &TimeStamp<Utc>, tokens: &[ShareToken]) -> bool {
        self.is_active(now)
            && (self.is_public
                || !self.allowed_viewers.is_empty()
                || tokens.iter().any(|t| t.is_valid(now)))
    }

    /// Revocation flips the validity flag; the workflow status stays
    /// Issued so audit queries keep seeing the issuance.
    pub fn revoke(&self, reason: &str, now: TimeStamp<Utc>) -> Result<Self, EngineError> {
        if self.status != CertificateStatus::Issued || self.is_revoked {
            return Err(EngineError::PreconditionFailed(format!(
                "certificate {} cannot be revoked (status {}, revoked: {})",
                self.id, self.status, self.is_revoked
            )));
        }
        if reason.is_empty() {
            return Err(EngineError::Validation(vec!["reason".into()]));
        }

        let mut next = self.clone();
        next.is_revoked = true;
        next.revocation_reason = Some(reason.into());
        next.updated_at = now;
        Ok(next)
    }

    /// Every call counts; there is no dedupe window.
    pub fn record_access(&self, now: TimeStamp<Utc>) -> Self {
        let mut next = self.clone();
        next.access_count += 1;
        next.last_accessed_at = Some(now.clone());
        next.updated_at = now;
        next
    }

    pub fn record_download(&self, now: TimeStamp<Utc>) -> Self {
        let mut next = self.clone();
        next.download_count += 1;
        next.last_accessed_at = Some(now.clone());
        next.updated_at = now;
        next
    }

    /// Track a newly minted share token against this certificate.
    pub fn record_share(&self, token: &str, now: TimeStamp<Utc>) -> Self {
        let mut next = self.clone();
        next.share_tokens.push(token.into());
        next.share_count += 1;
        next.updated_at = now;
        next
    }

    pub fn allow_viewer(&self, viewer_id: &str, now: TimeStamp<Utc>) -> Self {
        let mut next = self.clone();
        if !next.allowed_viewers.iter().any(|v| v == viewer_id) {
            next.allowed_viewers.push(viewer_id.into());
        }
        next.updated_at = now;
        next
    }
}
