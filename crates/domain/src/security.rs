use std::str::FromStr;

use bastion_core::AppError;
use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by the authorization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when the policy engine evaluates a submitted action.
    PolicyEvaluated,
    /// Emitted when an approval request is opened.
    ApprovalRequested,
    /// Emitted when an approver accepts a request.
    ApprovalApproved,
    /// Emitted when an approver rejects a request.
    ApprovalRejected,
    /// Emitted when an approved action runs.
    ApprovalExecuted,
    /// Emitted when a pending request passes its deadline.
    ApprovalExpired,
    /// Emitted when the cleanup sweep removes or expires requests.
    ApprovalCleanup,
    /// Emitted when an action runs without needing approval.
    ActionExecuted,
    /// Emitted when a step-up token is minted.
    StepUpIssued,
    /// Emitted when a step-up grant is withdrawn.
    StepUpRevoked,
    /// Emitted when a single session is terminated.
    SessionTerminated,
    /// Emitted when a user's other sessions are terminated.
    SessionsTerminated,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyEvaluated => "approval.policy.evaluated",
            Self::ApprovalRequested => "approval.request.created",
            Self::ApprovalApproved => "approval.request.approved",
            Self::ApprovalRejected => "approval.request.rejected",
            Self::ApprovalExecuted => "approval.request.executed",
            Self::ApprovalExpired => "approval.request.expired",
            Self::ApprovalCleanup => "approval.request.cleanup",
            Self::ActionExecuted => "admin.action.executed",
            Self::StepUpIssued => "security.step_up.issued",
            Self::StepUpRevoked => "security.step_up.revoked",
            Self::SessionTerminated => "security.session.terminated",
            Self::SessionsTerminated => "security.session.terminated_others",
        }
    }

    /// Returns all known audit actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AuditAction] = &[
            AuditAction::PolicyEvaluated,
            AuditAction::ApprovalRequested,
            AuditAction::ApprovalApproved,
            AuditAction::ApprovalRejected,
            AuditAction::ApprovalExecuted,
            AuditAction::ApprovalExpired,
            AuditAction::ApprovalCleanup,
            AuditAction::ActionExecuted,
            AuditAction::StepUpIssued,
            AuditAction::StepUpRevoked,
            AuditAction::SessionTerminated,
            AuditAction::SessionsTerminated,
        ];

        ALL
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown audit action '{value}'")))
    }
}
