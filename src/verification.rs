//! Verification trail for uploaded documents
use std::collections::BTreeMap;

use chrono::Utc;
use uuid7::uuid7;

use crate::timestamp::TimeStamp;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum VerificationAction {
    #[n(0)]
    Verify,
    #[n(1)]
    Reject,
    #[n(2)]
    RequestInfo,
}

/// Trust state of a document, derived from the latest trail step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

/// One authenticity check performed against a document. Append-only,
/// owned by its parent document.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct VerificationStep {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub verifier_id: String,
    #[n(2)]
    pub verifier_name: String,
    #[n(3)]
    pub action: VerificationAction,
    #[n(4)]
    pub comment: Option<String>,
    #[n(5)]
    pub recorded_at: TimeStamp<Utc>,
    #[n(6)]
    pub verification_level: u8,
    #[n(7)]
    pub evidence: BTreeMap<String, String>,
    #[n(8)]
    pub checked_items: Vec<String>,
}

impl VerificationStep {
    pub fn new(
        verifier_id: impl Into<String>,
        verifier_name: impl Into<String>,
        action: VerificationAction,
        comment: Option<String>,
        recorded_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id: uuid7().to_string(),
            verifier_id: verifier_id.into(),
            verifier_name: verifier_name.into(),
            action,
            comment,
            recorded_at,
            verification_level: 0,
            evidence: BTreeMap::new(),
            checked_items: Vec::new(),
        }
    }

    pub fn level(mut self, level: u8) -> Self {
        self.verification_level = level;
        self
    }

    pub fn evidence(mut self, key: &str, value: &str) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }

    pub fn checked(mut self, item: &str) -> Self {
        self.checked_items.push(item.into());
        self
    }
}

/// Ordered log of verification actions. History is never rewritten, so
/// appends are always legal regardless of the current status.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct VerificationTrail {
    #[n(0)]
    steps: Vec<VerificationStep>,
}

impl VerificationTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[VerificationStep] {
        &self.steps
    }

    pub fn append_step(&self, step: VerificationStep) -> Self {
        let mut next = self.clone();
        next.steps.push(step);
        next
    }

    /// Same latest-wins rule as the approval ledger: maximum timestamp,
    /// ties broken by insertion order with the last append winning.
    pub fn latest(&self) -> Option<&VerificationStep> {
        let mut best: Option<&VerificationStep> = None;
        for step in &self.steps {
            match best {
                Some(b)
                    if step
                        .recorded_at
                        .to_datetime_utc()
                        .lt(&b.recorded_at.to_datetime_utc()) => {}
                _ => best = Some(step),
            }
        }
        best
    }

    pub fn current_status(&self) -> VerificationStatus {
        match self.latest().map(|s| &s.action) {
            Some(VerificationAction::Verify) => VerificationStatus::Verified,
            Some(VerificationAction::Reject) => VerificationStatus::Rejected,
            Some(VerificationAction::RequestInfo) | None => VerificationStatus::Pending,
        }
    }

    /// Whether a certificate template may be created from the backing
    /// document.
    pub fn can_back_template(&self) -> bool {
        self.current_status() == VerificationStatus::Verified
    }
}

/// An uploaded supporting document and its trail. The persisted unit
/// for verification workflows.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Document {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub uploaded_by: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub trail: VerificationTrail,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
    #[n(5)]
    pub updated_at: TimeStamp<Utc>,
}

impl Document {
    pub fn new(id: String, uploaded_by: &str, title: &str, now: TimeStamp<Utc>) -> Self {
        Self {
            id,
            uploaded_by: uploaded_by.into(),
            title: title.into(),
            trail: VerificationTrail::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn record_step(&self, step: VerificationStep) -> Self {
        let mut next = self.clone();
        next.updated_at = step.recorded_at.clone();
        next.trail = self.trail.append_step(step);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_action_drives_status() {
        let at = TimeStamp::new_with(2026, 2, 1, 10, 0, 0);
        let trail = VerificationTrail::new();
        assert_eq!(trail.current_status(), VerificationStatus::Pending);

        let trail = trail.append_step(VerificationStep::new(
            "ver_1",
            "Verifier",
            VerificationAction::RequestInfo,
            Some("need the original scan".into()),
            at.clone(),
        ));
        assert_eq!(trail.current_status(), VerificationStatus::Pending);
        assert!(!trail.can_back_template());

        let trail = trail.append_step(VerificationStep::new(
            "ver_1",
            "Verifier",
            VerificationAction::Verify,
            None,
            at.plus_seconds(60),
        ));
        assert_eq!(trail.current_status(), VerificationStatus::Verified);
        assert!(trail.can_back_template());
    }

    #[test]
    fn equal_timestamps_resolve_to_last_append() {
        let at = TimeStamp::new_with(2026, 2, 1, 10, 0, 0);
        let trail = VerificationTrail::new()
            .append_step(VerificationStep::new(
                "ver_1",
                "Verifier",
                VerificationAction::Verify,
                None,
                at.clone(),
            ))
            .append_step(VerificationStep::new(
                "ver_2",
                "Second Verifier",
                VerificationAction::Reject,
                Some("signature mismatch".into()),
                at,
            ));

        assert_eq!(trail.current_status(), VerificationStatus::Rejected);
    }
}
