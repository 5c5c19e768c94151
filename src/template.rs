//! Ordered approval chains for certificate templates
use chrono::Utc;
use uuid7::uuid7;

use crate::error::EngineError;
use crate::timestamp::TimeStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum StepStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

/// One approver in a template's chain. `order` defines the execution
/// sequence; steps are decided in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalStep {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub approver_id: String,
    #[n(3)]
    pub approver_name: String,
    #[n(4)]
    pub approver_email: String,
    #[n(5)]
    pub status: StepStatus,
    #[n(6)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub comments: Option<String>,
    #[n(8)]
    pub order: u32,
}

impl ApprovalStep {
    pub fn new(
        name: &str,
        approver_id: &str,
        approver_name: &str,
        approver_email: &str,
        order: u32,
    ) -> Self {
        Self {
            id: uuid7().to_string(),
            name: name.into(),
            approver_id: approver_id.into(),
            approver_name: approver_name.into(),
            approver_email: approver_email.into(),
            status: StepStatus::Pending,
            approved_at: None,
            comments: None,
            order,
        }
    }
}

/// The ordered steps attached to a template. The engine enforces the
/// sequence; it is not merely recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalChain {
    #[n(0)]
    steps: Vec<ApprovalStep>,
}

impl ApprovalChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[ApprovalStep] {
        &self.steps
    }

    /// Insert a step, keeping the chain sorted by `order`. A duplicate
    /// `order` within one chain is rejected; gaps are fine.
    pub fn add_step(&self, step: ApprovalStep) -> Result<Self, EngineError> {
        if self.steps.iter().any(|s| s.order == step.order) {
            return Err(EngineError::Validation(vec!["order".into()]));
        }

        let mut next = self.clone();
        next.steps.push(step);
        next.steps.sort_by_key(|s| s.order);
        Ok(next)
    }

    /// The earliest step still awaiting a decision.
    pub fn current_step(&self) -> Option<&ApprovalStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }

    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Approved)
    }

    pub fn is_rejected(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Rejected)
    }

    fn decide(
        &self,
        step_id: &str,
        status: StepStatus,
        comments: Option<String>,
        now: TimeStamp<Utc>,
    ) -> Result<Self, EngineError> {
        let index = self
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| {
                EngineError::PreconditionFailed(format!("unknown approval step {step_id}"))
            })?;

        let step = &self.steps[index];
        if step.status != StepStatus::Pending {
            return Err(EngineError::PreconditionFailed(format!(
                "step {} has already been decided",
                step.name
            )));
        }
        // a later step cannot be decided while an earlier one is pending
        if let Some(blocking) = self.steps[..index]
            .iter()
            .find(|s| s.status == StepStatus::Pending)
        {
            return Err(EngineError::PreconditionFailed(format!(
                "step {} is blocked by earlier pending step {}",
                step.name, blocking.name
            )));
        }

        let mut next = self.clone();
        let step = &mut next.steps[index];
        step.status = status;
        step.comments = comments;
        if status == StepStatus::Approved {
            step.approved_at = Some(now);
        }
        Ok(next)
    }

    pub fn approve_step(&self, step_id: &str, now: TimeStamp<Utc>) -> Result<Self, EngineError> {
        self.decide(step_id, StepStatus::Approved, None, now)
    }

    pub fn reject_step(
        &self,
        step_id: &str,
        comments: &str,
        now: TimeStamp<Utc>,
    ) -> Result<Self, EngineError> {
        self.decide(step_id, StepStatus::Rejected, Some(comments.into()), now)
    }
}
