//! Dual-control approval requests.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bastion_core::{AppError, AppResult, Role, UserIdentity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ActionType;

/// Lifecycle status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a second approver.
    Pending,
    /// Approved and ready for execution.
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// Approved action was executed.
    Executed,
    /// Expired before a decision was made.
    Expired,
}

impl ApprovalStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Expired => "expired",
        }
    }

    /// Returns whether the status can never change again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Executed | Self::Expired)
    }

    /// Returns whether `next` is a legal successor of this status.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Expired)
                | (Self::Approved, Self::Executed)
        )
    }

    /// Returns the error raised when a transition needs another status.
    #[must_use]
    pub fn invalid_status_error(&self) -> AppError {
        AppError::InvalidStatus(self.as_str().to_owned())
    }
}

impl Display for ApprovalStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "executed" => Ok(Self::Executed),
            "expired" => Ok(Self::Expired),
            _ => Err(AppError::Validation(format!(
                "unknown approval status '{value}'"
            ))),
        }
    }
}

/// Outcome chosen by an approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// Allows execution.
    Approve,
    /// Blocks execution permanently.
    Reject,
}

impl ApprovalOutcome {
    /// Returns the status this outcome moves a pending request to.
    #[must_use]
    pub fn target_status(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// Snapshot of the user who requested or decided an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalActor {
    /// Stable user identifier.
    pub user_id: String,
    /// Email captured at request time.
    pub email: String,
    /// Role captured at request time.
    pub role: Role,
}

impl From<&UserIdentity> for ApprovalActor {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            user_id: identity.user_id().to_owned(),
            email: identity.email().to_owned(),
            role: identity.role(),
        }
    }
}

/// Privileged action as presented by the caller.
///
/// Approval binds to every field; execution must present an identical action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitiveAction {
    /// Raw action type identifier.
    pub action_type: String,
    /// Endpoint the action was submitted to.
    pub endpoint: String,
    /// Transport method of the action.
    pub method: String,
    /// Targeted content identifiers.
    pub target_ids: Vec<String>,
    /// Opaque action payload.
    pub payload: Value,
}

/// Persisted approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Stable request identifier.
    pub id: String,
    /// Guarded action type.
    pub action_type: ActionType,
    /// Endpoint of the original request.
    pub endpoint: String,
    /// Method of the original request.
    pub method: String,
    /// Targeted content identifiers, never empty.
    pub target_ids: Vec<String>,
    /// Opaque payload of the original request.
    pub payload: Value,
    /// Requesting user.
    pub requested_by: ApprovalActor,
    /// Current lifecycle status.
    pub status: ApprovalStatus,
    /// Creation timestamp.
    pub requested_at: DateTime<Utc>,
    /// Deadline for a decision.
    pub expires_at: DateTime<Utc>,
    /// Deciding user, once decided.
    pub decided_by: Option<ApprovalActor>,
    /// Decision timestamp, once decided.
    pub decided_at: Option<DateTime<Utc>>,
    /// Result reported by the executor.
    pub execution_result: Option<Value>,
    /// Timestamp of the last status transition.
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Opens a pending approval request for an action.
    pub fn open(
        id: impl Into<String>,
        action: SensitiveAction,
        requested_by: ApprovalActor,
        requested_at: DateTime<Utc>,
        ttl: Duration,
    ) -> AppResult<Self> {
        let action_type = ActionType::from_str(action.action_type.as_str())?;

        if action.target_ids.is_empty() {
            return Err(AppError::Validation(
                "approval request target_ids must not be empty".to_owned(),
            ));
        }

        if action.target_ids.iter().any(|target| target.trim().is_empty()) {
            return Err(AppError::Validation(
                "approval request target_ids must not contain blank values".to_owned(),
            ));
        }

        if action.endpoint.trim().is_empty() || action.method.trim().is_empty() {
            return Err(AppError::Validation(
                "approval request endpoint and method are required".to_owned(),
            ));
        }

        if ttl <= Duration::zero() {
            return Err(AppError::Validation(
                "approval request ttl must be positive".to_owned(),
            ));
        }

        Ok(Self {
            id: id.into(),
            action_type,
            endpoint: action.endpoint,
            method: action.method,
            target_ids: action.target_ids,
            payload: action.payload,
            requested_by,
            status: ApprovalStatus::Pending,
            requested_at,
            expires_at: requested_at + ttl,
            decided_by: None,
            decided_at: None,
            execution_result: None,
            updated_at: requested_at,
        })
    }

    /// Returns whether the request is pending past its deadline.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && self.expires_at <= now
    }

    /// Returns the first field in which `action` differs from the request.
    #[must_use]
    pub fn action_mismatch(&self, action: &SensitiveAction) -> Option<&'static str> {
        if action.action_type != self.action_type.as_str() {
            return Some("action_type_mismatch");
        }
        if action.endpoint != self.endpoint {
            return Some("endpoint_mismatch");
        }
        if action.method != self.method {
            return Some("method_mismatch");
        }
        if action.target_ids != self.target_ids {
            return Some("target_ids_mismatch");
        }
        if action.payload != self.payload {
            return Some("payload_mismatch");
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use bastion_core::Role;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::{ApprovalActor, ApprovalRequest, ApprovalStatus, SensitiveAction};

    fn action() -> SensitiveAction {
        SensitiveAction {
            action_type: "delete".to_owned(),
            endpoint: "/admin/listings".to_owned(),
            method: "DELETE".to_owned(),
            target_ids: vec!["id1".to_owned()],
            payload: json!({"type": "listing"}),
        }
    }

    fn requester() -> ApprovalActor {
        ApprovalActor {
            user_id: "alice".to_owned(),
            email: "alice@example.com".to_owned(),
            role: Role::Editor,
        }
    }

    #[test]
    fn open_sets_pending_and_deadline() {
        let now = Utc::now();
        let request =
            ApprovalRequest::open("req-1", action(), requester(), now, Duration::hours(24));

        let Ok(request) = request else {
            panic!("expected approval request to open");
        };
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert!(request.expires_at > request.requested_at);
    }

    #[test]
    fn open_rejects_empty_targets() {
        let mut action = action();
        action.target_ids.clear();

        let request =
            ApprovalRequest::open("req-1", action, requester(), Utc::now(), Duration::hours(1));
        assert!(request.is_err());
    }

    #[test]
    fn open_rejects_unknown_action_type() {
        let mut action = action();
        action.action_type = "archive".to_owned();

        let request =
            ApprovalRequest::open("req-1", action, requester(), Utc::now(), Duration::hours(1));
        assert!(request.is_err());
    }

    #[test]
    fn transitions_follow_lifecycle() {
        assert!(ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Expired));
        assert!(ApprovalStatus::Approved.can_transition_to(ApprovalStatus::Executed));
        assert!(!ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Executed));
        assert!(!ApprovalStatus::Expired.can_transition_to(ApprovalStatus::Approved));
        assert!(!ApprovalStatus::Rejected.can_transition_to(ApprovalStatus::Approved));
    }

    #[test]
    fn action_mismatch_reports_first_differing_field() {
        let Ok(request) = ApprovalRequest::open(
            "req-1",
            action(),
            requester(),
            Utc::now(),
            Duration::hours(1),
        ) else {
            panic!("expected approval request to open");
        };

        assert_eq!(request.action_mismatch(&action()), None);

        let mut changed = action();
        changed.payload = json!({"type": "announcement"});
        assert_eq!(request.action_mismatch(&changed), Some("payload_mismatch"));

        let mut changed = action();
        changed.target_ids.push("id2".to_owned());
        assert_eq!(
            request.action_mismatch(&changed),
            Some("target_ids_mismatch")
        );
    }
}
