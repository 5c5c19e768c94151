//! Closed status sets and transition legality for requests and certificates
use std::fmt;

/// Workflow status of a certificate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum RequestStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    UnderReview,
    #[n(3)]
    ChangesRequested,
    #[n(4)]
    Approved,
    #[n(5)]
    Issued,
    #[n(6)]
    Rejected,
    #[n(7)]
    Cancelled,
}

impl RequestStatus {
    /// Legality of a single hop in the request transition graph.
    pub fn can_transition(self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, to),
            (Draft, Submitted)
                | (Draft, Cancelled)
                | (Submitted, UnderReview)
                | (Submitted, Cancelled)
                | (UnderReview, ChangesRequested)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
                | (ChangesRequested, Submitted)
                | (ChangesRequested, Cancelled)
                | (Approved, Issued)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Issued | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }

    /// The client may still edit content fields.
    pub fn can_edit(self) -> bool {
        matches!(self, RequestStatus::Draft | RequestStatus::ChangesRequested)
    }

    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            RequestStatus::Draft | RequestStatus::Submitted | RequestStatus::ChangesRequested
        )
    }
}

/// Workflow status of an issued certificate. `Expired` is part of the
/// closed set for display and querying, but expiry itself is a derived
/// read; no transition targets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum CertificateStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Pending,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    Issued,
    #[n(5)]
    Revoked,
    #[n(6)]
    Expired,
}

impl CertificateStatus {
    pub fn can_transition(self, to: CertificateStatus) -> bool {
        use CertificateStatus::*;
        matches!(
            (self, to),
            (Draft, Pending)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Draft, Rejected)
                | (Approved, Issued)
                | (Issued, Revoked)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CertificateStatus::Rejected | CertificateStatus::Revoked
        )
    }
}

// Display labels are a pure lookup. UI naming stays out of the
// transition rules above.
impl RequestStatus {
    pub fn label(self) -> &'static str {
        match self {
            RequestStatus::Draft => "Draft",
            RequestStatus::Submitted => "Submitted",
            RequestStatus::UnderReview => "Under Review",
            RequestStatus::ChangesRequested => "Changes Requested",
            RequestStatus::Approved => "Approved",
            RequestStatus::Issued => "Issued",
            RequestStatus::Rejected => "Rejected",
            RequestStatus::Cancelled => "Cancelled",
        }
    }
}

impl CertificateStatus {
    pub fn label(self) -> &'static str {
        match self {
            CertificateStatus::Draft => "Draft",
            CertificateStatus::Pending => "Pending",
            CertificateStatus::Approved => "Approved",
            CertificateStatus::Rejected => "Rejected",
            CertificateStatus::Issued => "Issued",
            CertificateStatus::Revoked => "Revoked",
            CertificateStatus::Expired => "Expired",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
