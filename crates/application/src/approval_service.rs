//! Approval request lifecycle.
//!
//! Requests expire lazily: any read of a pending request past its deadline
//! moves it to expired before returning it. The periodic cleanup only keeps
//! storage tidy; correctness never depends on it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::debug;

use bastion_core::{AppError, AppResult, UserIdentity};
use bastion_domain::{
    ApprovalActor, ApprovalRequest, ApprovalStatus, AuditAction, SensitiveAction,
};

use crate::approval_ports::{ApprovalRequestRepository, ApprovalTransition, ExecutionCheck};
use crate::audit_ports::NewAuditEntry;
use crate::audit_recorder::AuditRecorder;
use crate::policy_engine::PolicyEngine;

mod cleanup;
mod decision;


/// Application service for dual-control approval requests.
#[derive(Clone)]
pub struct ApprovalService {
    repository: Arc<dyn ApprovalRequestRepository>,
    policy_engine: PolicyEngine,
    audit: AuditRecorder,
    approval_ttl: Duration,
}

impl ApprovalService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ApprovalRequestRepository>,
        policy_engine: PolicyEngine,
        audit: AuditRecorder,
        approval_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            policy_engine,
            audit,
            approval_ttl,
        }
    }

    /// Opens a pending approval request instead of executing the action.
    pub async fn create(
        &self,
        requested_by: &UserIdentity,
        action: SensitiveAction,
    ) -> AppResult<ApprovalRequest> {
        let request = ApprovalRequest::open(
            uuid::Uuid::new_v4().to_string(),
            action,
            ApprovalActor::from(requested_by),
            Utc::now(),
            self.approval_ttl,
        )?;

        self.repository.insert(&request).await?;

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::ApprovalRequested)
                    .target(request.id.as_str())
                    .actor(requested_by.user_id())
                    .note(format!(
                        "requested approval for '{}' on {} target(s)",
                        request.action_type,
                        request.target_ids.len()
                    ))
                    .metadata(json!({
                        "action_type": request.action_type.as_str(),
                        "endpoint": request.endpoint,
                        "method": request.method,
                        "target_ids": request.target_ids,
                        "expires_at": request.expires_at.to_rfc3339(),
                    })),
            )
            .await;

        Ok(request)
    }

    /// Loads a request, expiring it first when its deadline has passed.
    pub async fn get(&self, id: &str) -> AppResult<Option<ApprovalRequest>> {
        let Some(request) = self.repository.find(id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if !request.is_overdue(now) {
            return Ok(Some(request));
        }

        match self
            .repository
            .transition(
                id,
                ApprovalStatus::Pending,
                ApprovalTransition::status(ApprovalStatus::Expired, now),
            )
            .await?
        {
            Some(expired) => {
                self.audit
                    .record(
                        NewAuditEntry::new(AuditAction::ApprovalExpired)
                            .target(id)
                            .note("expired on read"),
                    )
                    .await;
                Ok(Some(expired))
            }
            None => {
                debug!(approval_id = %id, "approval changed concurrently during read repair");
                self.repository.find(id).await
            }
        }
    }

    /// Checks that an approval authorizes exactly this action right now.
    pub async fn validate_for_execution(
        &self,
        id: &str,
        action: &SensitiveAction,
    ) -> AppResult<ExecutionCheck> {
        let Some(request) = self.get(id).await? else {
            return Ok(ExecutionCheck::Denied("not_found".to_owned()));
        };

        if request.status != ApprovalStatus::Approved {
            return Ok(ExecutionCheck::Denied(format!(
                "invalid_status:{}",
                request.status
            )));
        }

        if let Some(mismatch) = request.action_mismatch(action) {
            return Ok(ExecutionCheck::Denied(mismatch.to_owned()));
        }

        if request.expires_at <= Utc::now() {
            return Ok(ExecutionCheck::Denied("expired".to_owned()));
        }

        Ok(ExecutionCheck::Allowed(request))
    }

    async fn require(&self, id: &str) -> AppResult<ApprovalRequest> {
        self.get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("approval request '{id}' was not found")))
    }

    /// Reports the state that beat a lost compare-and-set.
    async fn lost_transition_error(&self, id: &str) -> AppError {
        match self.repository.find(id).await {
            Ok(Some(current)) => current.status.invalid_status_error(),
            Ok(None) => AppError::NotFound(format!("approval request '{id}' was not found")),
            Err(error) => error,
        }
    }
}
