//! Append-only approval history for certificate requests
use std::collections::BTreeMap;

use chrono::Utc;
use uuid7::uuid7;

use crate::error::EngineError;
use crate::status::RequestStatus;
use crate::timestamp::TimeStamp;

/// A reviewer action recorded against a request.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ApprovalAction {
    #[n(0)]
    Approved,
    #[n(1)]
    Rejected,
    #[n(2)]
    ChangesRequested,
    #[n(3)]
    Assigned,
    #[n(4)]
    Forwarded,
    #[n(5)]
    InfoRequested,
}

impl ApprovalAction {
    /// Request status this action derives, if any. Forwarding and
    /// information requests leave the status alone.
    pub fn derived_status(&self) -> Option<RequestStatus> {
        match self {
            ApprovalAction::Approved => Some(RequestStatus::Approved),
            ApprovalAction::Rejected => Some(RequestStatus::Rejected),
            ApprovalAction::ChangesRequested => Some(RequestStatus::ChangesRequested),
            ApprovalAction::Assigned => Some(RequestStatus::Submitted),
            ApprovalAction::Forwarded | ApprovalAction::InfoRequested => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, ApprovalAction::Approved | ApprovalAction::Assigned)
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, ApprovalAction::Rejected)
    }
}

/// One entry in the ledger. Immutable once created; appended only,
/// never edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub reviewer_id: String,
    #[n(2)]
    pub reviewer_name: String,
    #[n(3)]
    pub reviewer_role: String,
    #[n(4)]
    pub action: ApprovalAction,
    #[n(5)]
    pub comment: Option<String>,
    #[n(6)]
    pub changes: BTreeMap<String, String>,
    #[n(7)]
    pub recorded_at: TimeStamp<Utc>,
}

impl ApprovalRecord {
    pub fn new(
        reviewer_id: impl Into<String>,
        reviewer_name: impl Into<String>,
        reviewer_role: impl Into<String>,
        action: ApprovalAction,
        comment: Option<String>,
        recorded_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id: uuid7().to_string(),
            reviewer_id: reviewer_id.into(),
            reviewer_name: reviewer_name.into(),
            reviewer_role: reviewer_role.into(),
            action,
            comment,
            changes: BTreeMap::new(),
            recorded_at,
        }
    }

    pub fn with_changes(mut self, changes: BTreeMap<String, String>) -> Self {
        self.changes = changes;
        self
    }
}

/// Positive/negative action counts. Reporting only, never used for
/// status derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub positive: usize,
    pub negative: usize,
}

/// Ordered, append-only log of reviewer actions. Ordering is insertion
/// order; the log itself is the only side effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalLedger {
    #[n(0)]
    records: Vec<ApprovalRecord>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ApprovalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record, returning the extended ledger. Rejected when the
    /// owning request has already reached a terminal status.
    pub fn append(
        &self,
        current: RequestStatus,
        record: ApprovalRecord,
    ) -> Result<Self, EngineError> {
        if current.is_terminal() {
            return Err(EngineError::AlreadyFinalized(current.to_string()));
        }

        let mut next = self.clone();
        next.records.push(record);
        Ok(next)
    }

    /// The record with the maximum timestamp. Two records can share a
    /// timestamp at nanosecond granularity; ties resolve by insertion
    /// order, last appended wins. This is a contract, not an accident.
    pub fn latest(&self) -> Option<&ApprovalRecord> {
        let mut best: Option<&ApprovalRecord> = None;
        for record in &self.records {
            match best {
                Some(b)
                    if record
                        .recorded_at
                        .to_datetime_utc()
                        .lt(&b.recorded_at.to_datetime_utc()) => {}
                _ => best = Some(record),
            }
        }
        best
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for record in &self.records {
            if record.action.is_positive() {
                tally.positive += 1;
            } else if record.action.is_negative() {
                tally.negative += 1;
            }
        }
        tally
    }
}
