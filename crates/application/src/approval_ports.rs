use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use bastion_core::AppResult;
use bastion_domain::{ApprovalActor, ApprovalRequest, ApprovalStatus};

/// Field updates applied by one status transition.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalTransition {
    /// New status.
    pub status: ApprovalStatus,
    /// Deciding user, stamped by approve and reject.
    pub decided_by: Option<ApprovalActor>,
    /// Decision timestamp, stamped by approve and reject.
    pub decided_at: Option<DateTime<Utc>>,
    /// Executor result, stamped by execution.
    pub execution_result: Option<Value>,
    /// Transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ApprovalTransition {
    /// Builds a bare status change.
    #[must_use]
    pub fn status(status: ApprovalStatus, updated_at: DateTime<Utc>) -> Self {
        Self {
            status,
            decided_by: None,
            decided_at: None,
            execution_result: None,
            updated_at,
        }
    }

    /// Applies the transition to an in-memory copy of a request.
    pub fn apply_to(&self, request: &mut ApprovalRequest) {
        request.status = self.status;
        request.updated_at = self.updated_at;
        if let Some(decided_by) = &self.decided_by {
            request.decided_by = Some(decided_by.clone());
        }
        if let Some(decided_at) = self.decided_at {
            request.decided_at = Some(decided_at);
        }
        if let Some(execution_result) = &self.execution_result {
            request.execution_result = Some(execution_result.clone());
        }
    }
}

/// Counts returned by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Terminal and lapsed approved records deleted past the retention window.
    pub deleted_count: u64,
    /// Overdue pending records moved to expired.
    pub expired_count: u64,
}

/// Result of checking an approval before running its action.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionCheck {
    /// The approval authorizes exactly this action.
    Allowed(ApprovalRequest),
    /// The approval does not authorize the action.
    Denied(String),
}

impl ExecutionCheck {
    /// Returns whether execution may proceed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Returns the denial reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed(_) => None,
            Self::Denied(reason) => Some(reason.as_str()),
        }
    }
}

/// Repository port for approval request documents.
///
/// Status changes go through [`ApprovalRequestRepository::transition`], an
/// atomic compare-and-set on the stored status.
#[async_trait]
pub trait ApprovalRequestRepository: Send + Sync {
    /// Persists a new request.
    async fn insert(&self, request: &ApprovalRequest) -> AppResult<()>;

    /// Loads a request by id without any repair.
    async fn find(&self, id: &str) -> AppResult<Option<ApprovalRequest>>;

    /// Applies `transition` only if the stored status equals `expected`.
    ///
    /// Returns the updated request, or `None` when the id is unknown or the
    /// stored status differs.
    async fn transition(
        &self,
        id: &str,
        expected: ApprovalStatus,
        transition: ApprovalTransition,
    ) -> AppResult<Option<ApprovalRequest>>;

    /// Moves every pending request whose deadline passed to expired.
    ///
    /// Returns the ids this call expired.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<String>>;

    /// Deletes terminal requests whose last transition precedes the cutoff.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Deletes approved requests that were never executed and whose deadline
    /// precedes the cutoff.
    ///
    /// Such requests can no longer authorize anything but stay `approved`.
    async fn delete_lapsed_approved_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
