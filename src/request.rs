//! Certificate request lifecycle and review workflow
use std::collections::BTreeMap;

use chrono::Utc;

use crate::error::EngineError;
use crate::ledger::{ApprovalAction, ApprovalLedger, ApprovalRecord};
use crate::status::RequestStatus;
use crate::timestamp::TimeStamp;

/// Days allotted for reviewing a submitted request before it counts as overdue.
pub const REVIEW_SLA_DAYS: i64 = 7;
/// Days after which an untouched draft counts as stale.
pub const DRAFT_STALE_DAYS: i64 = 30;

pub const PRIORITY_MIN: i32 = 1;
pub const PRIORITY_MAX: i32 = 5;
pub const PRIORITY_DEFAULT: i32 = 3;

/// A client's application for a certificate. Immutable value object:
/// every transition returns a fresh value, a failed transition leaves
/// the original untouched.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct CertificateRequest {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub client_id: String,
    #[n(2)]
    pub client_name: String,
    #[n(3)]
    pub client_email: String,
    #[n(4)]
    pub organization_id: String,
    #[n(5)]
    pub organization_name: String,
    #[n(6)]
    pub certificate_type: String,
    #[n(7)]
    pub title: String,
    #[n(8)]
    pub description: String,
    #[n(9)]
    pub purpose: String,
    #[n(10)]
    pub requested_data: BTreeMap<String, String>,
    #[n(11)]
    pub attachments: Vec<String>,
    #[n(12)]
    pub status: RequestStatus,
    #[n(13)]
    pub assigned_ca_id: Option<String>,
    #[n(14)]
    pub assigned_ca_name: Option<String>,
    #[n(15)]
    pub assigned_at: Option<TimeStamp<Utc>>,
    #[n(16)]
    pub history: ApprovalLedger,
    #[n(17)]
    pub current_reviewer_id: Option<String>,
    #[n(18)]
    pub rejection_reason: Option<String>,
    #[n(19)]
    pub change_request_comments: Vec<String>,
    #[n(20)]
    pub priority: i32,
    #[n(21)]
    pub certificate_id: Option<String>,
    #[n(22)]
    pub created_at: TimeStamp<Utc>,
    #[n(23)]
    pub updated_at: TimeStamp<Utc>,
    #[n(24)]
    pub submitted_at: Option<TimeStamp<Utc>>,
    #[n(25)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(26)]
    pub issued_at: Option<TimeStamp<Utc>>,
}

impl CertificateRequest {
    /// A fresh draft. Content fields are filled through the builder
    /// setters below before submission.
    pub fn new(id: String, now: TimeStamp<Utc>) -> Self {
        Self {
            id,
            client_id: String::new(),
            client_name: String::new(),
            client_email: String::new(),
            organization_id: String::new(),
            organization_name: String::new(),
            certificate_type: String::new(),
            title: String::new(),
            description: String::new(),
            purpose: String::new(),
            requested_data: BTreeMap::new(),
            attachments: Vec::new(),
            status: RequestStatus::Draft,
            assigned_ca_id: None,
            assigned_ca_name: None,
            assigned_at: None,
            history: ApprovalLedger::new(),
            current_reviewer_id: None,
            rejection_reason: None,
            change_request_comments: Vec::new(),
            priority: PRIORITY_DEFAULT,
            certificate_id: None,
            created_at: now.clone(),
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            issued_at: None,
        }
    }

    pub fn client(mut self, id: &str, name: &str, email: &str) -> Self {
        self.client_id = id.into();
        self.client_name = name.into();
        self.client_email = email.into();
        self
    }
    pub fn organization(mut self, id: &str, name: &str) -> Self {
        self.organization_id = id.into();
        self.organization_name = name.into();
        self
    }
    pub fn certificate_type(mut self, certificate_type: &str) -> Self {
        self.certificate_type = certificate_type.into();
        self
    }
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.into();
        self
    }
    pub fn purpose(mut self, purpose: &str) -> Self {
        self.purpose = purpose.into();
        self
    }
    pub fn requested_field(mut self, key: &str, value: &str) -> Self {
        self.requested_data.insert(key.into(), value.into());
        self
    }
    pub fn attach(mut self, reference: &str) -> Self {
        self.attachments.push(reference.into());
        self
    }
    /// Out-of-range input is silently clamped rather than rejected.
    pub fn set_priority(mut self, priority: i32) -> Self {
        self.priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        self
    }

    /// Required fields that are still empty, in declaration order.
    pub fn missing_fields(&self) -> Vec<String> {
        let required = [
            ("client_id", &self.client_id),
            ("client_name", &self.client_name),
            ("client_email", &self.client_email),
            ("organization_id", &self.organization_id),
            ("certificate_type", &self.certificate_type),
            ("title", &self.title),
            ("description", &self.description),
            ("purpose", &self.purpose),
        ];

        required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    fn guard_not_terminal(&self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::AlreadyFinalized(self.status.to_string()));
        }
        Ok(())
    }

    fn illegal(&self, to: RequestStatus) -> EngineError {
        EngineError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Submit the draft (or resubmit after requested changes). Reports
    /// every missing required field, not just the first.
    pub fn submit(&self, now: TimeStamp<Utc>) -> Result<Self, EngineError> {
        self.guard_not_terminal()?;
        if !self.status.can_transition(RequestStatus::Submitted) {
            return Err(self.illegal(RequestStatus::Submitted));
        }

        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(EngineError::Validation(missing));
        }

        let mut next = self.clone();
        next.status = RequestStatus::Submitted;
        if next.submitted_at.is_none() {
            next.submitted_at = Some(now.clone());
        }
        next.updated_at = now;
        Ok(next)
    }

    pub fn can_assign(&self) -> bool {
        self.status == RequestStatus::Submitted && self.assigned_ca_id.is_none()
    }

    /// Assign a certificate authority. Assignment is metadata only; the
    /// status does not move.
    pub fn assign(
        &self,
        reviewer_id: &str,
        reviewer_name: &str,
        now: TimeStamp<Utc>,
    ) -> Result<Self, EngineError> {
        if !self.can_assign() {
            return Err(EngineError::PreconditionFailed(format!(
                "request {} cannot be assigned in status {} (assignee: {:?})",
                self.id, self.status, self.assigned_ca_id
            )));
        }

        let mut next = self.clone();
        next.assigned_ca_id = Some(reviewer_id.into());
        next.assigned_ca_name = Some(reviewer_name.into());
        next.assigned_at = Some(now.clone());
        next.current_reviewer_id = Some(reviewer_id.into());
        next.updated_at = now;
        Ok(next)
    }

    /// Record a reviewer action. The ledger append and the resulting
    /// status change apply as one unit on the returned value.
    pub fn review(&self, record: ApprovalRecord) -> Result<Self, EngineError> {
        self.guard_not_terminal()?;

        let mut next = self.clone();
        match record.action {
            ApprovalAction::Approved
            | ApprovalAction::Rejected
            | ApprovalAction::ChangesRequested => {
                let target = record.action.derived_status().ok_or_else(|| {
                    EngineError::PreconditionFailed("action derives no status".into())
                })?;

                // A decision against a freshly submitted request passes
                // through UnderReview; both hops must be legal.
                if next.status == RequestStatus::Submitted {
                    if !next.status.can_transition(RequestStatus::UnderReview) {
                        return Err(self.illegal(RequestStatus::UnderReview));
                    }
                    next.status = RequestStatus::UnderReview;
                }
                if !next.status.can_transition(target) {
                    return Err(self.illegal(target));
                }

                match record.action {
                    ApprovalAction::Approved => {
                        next.approved_at = Some(record.recorded_at.clone());
                    }
                    ApprovalAction::Rejected => {
                        let reason = record.comment.clone().filter(|c| !c.is_empty());
                        match reason {
                            Some(reason) => next.rejection_reason = Some(reason),
                            None => return Err(EngineError::Validation(vec!["comment".into()])),
                        }
                    }
                    ApprovalAction::ChangesRequested => {
                        if let Some(comment) = record.comment.clone() {
                            next.change_request_comments.push(comment);
                        }
                    }
                    _ => unreachable!(),
                }
                next.status = target;
            }
            ApprovalAction::Assigned | ApprovalAction::Forwarded => {
                if !matches!(
                    self.status,
                    RequestStatus::Submitted | RequestStatus::UnderReview
                ) {
                    return Err(EngineError::PreconditionFailed(format!(
                        "reviewer routing requires a submitted request, status is {}",
                        self.status
                    )));
                }
                next.current_reviewer_id = Some(record.reviewer_id.clone());
            }
            ApprovalAction::InfoRequested => {}
        }

        next.history = self.history.append(self.status, record.clone())?;
        next.updated_at = record.recorded_at;
        Ok(next)
    }

    pub fn cancel(&self, now: TimeStamp<Utc>) -> Result<Self, EngineError> {
        self.guard_not_terminal()?;
        if !self.status.can_cancel() {
            return Err(self.illegal(RequestStatus::Cancelled));
        }

        let mut next = self.clone();
        next.status = RequestStatus::Cancelled;
        next.updated_at = now;
        Ok(next)
    }

    /// Link the issued certificate. Calling this on anything but an
    /// approved request is a programming error, not user input.
    pub fn link_certificate(
        &self,
        certificate_id: &str,
        now: TimeStamp<Utc>,
    ) -> Result<Self, EngineError> {
        if self.status != RequestStatus::Approved {
            return Err(EngineError::PreconditionFailed(format!(
                "cannot link a certificate to request {} in status {}",
                self.id, self.status
            )));
        }

        let mut next = self.clone();
        next.certificate_id = Some(certificate_id.into());
        next.status = RequestStatus::Issued;
        next.issued_at = Some(now.clone());
        next.updated_at = now;
        Ok(next)
    }

    /// Submitted, not yet settled, and older than the review SLA.
    pub fn is_overdue(&self, now: &TimeStamp<Utc>) -> bool {
        match &self.submitted_at {
            Some(submitted) if !self.status.is_terminal() => {
                submitted.days_since(now) > REVIEW_SLA_DAYS
            }
            _ => false,
        }
    }

    pub fn is_draft_stale(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == RequestStatus::Draft && self.created_at.days_since(now) > DRAFT_STALE_DAYS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(now: TimeStamp<Utc>) -> CertificateRequest {
        CertificateRequest::new("req_test".into(), now)
            .client("client_1", "Ada Lovelace", "ada@example.edu")
            .organization("org_1", "Example University")
            .certificate_type("diploma")
            .title("BSc Mathematics")
            .description("Completed course of study")
            .purpose("employment")
    }

    #[test]
    fn priority_is_clamped_on_write() {
        let now = TimeStamp::new();
        assert_eq!(draft(now.clone()).set_priority(99).priority, 5);
        assert_eq!(draft(now.clone()).set_priority(-5).priority, 1);
        assert_eq!(draft(now).set_priority(4).priority, 4);
    }

    #[test]
    fn submit_lists_every_missing_field() {
        let now = TimeStamp::new();
        let bare = CertificateRequest::new("req_bare".into(), now.clone());

        let err = bare.submit(now).unwrap_err();
        match err {
            EngineError::Validation(fields) => {
                assert_eq!(fields.len(), 8);
                assert!(fields.contains(&"client_email".to_string()));
                assert!(fields.contains(&"purpose".to_string()));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn failed_transition_leaves_value_untouched() {
        let now = TimeStamp::new();
        let request = draft(now.clone());
        let before = request.clone();

        // approving a draft is outside the graph
        let record = ApprovalRecord::new(
            "ca_1",
            "Authority",
            "authority",
            ApprovalAction::Approved,
            None,
            now,
        );
        assert!(request.review(record).is_err());
        assert_eq!(request, before);
    }

    #[test]
    fn overdue_and_stale_windows() {
        let created = TimeStamp::new_with(2026, 1, 1, 0, 0, 0);
        let request = draft(created.clone());

        let submitted = request.submit(created.clone()).unwrap();
        assert!(!submitted.is_overdue(&created.plus_days(REVIEW_SLA_DAYS)));
        assert!(submitted.is_overdue(&created.plus_days(REVIEW_SLA_DAYS + 1)));

        assert!(!request.is_draft_stale(&created.plus_days(DRAFT_STALE_DAYS)));
        assert!(request.is_draft_stale(&created.plus_days(DRAFT_STALE_DAYS + 1)));
    }
}
