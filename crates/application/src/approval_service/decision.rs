use serde_json::Value;

use bastion_domain::ApprovalOutcome;

use super::*;

impl ApprovalService {
    /// Approves or rejects a pending request as a second actor.
    pub async fn decide(
        &self,
        id: &str,
        decided_by: &UserIdentity,
        outcome: ApprovalOutcome,
    ) -> AppResult<ApprovalRequest> {
        if !decided_by.role().can_decide_approvals() {
            return Err(AppError::Forbidden(format!(
                "role '{}' may not decide approval requests",
                decided_by.role()
            )));
        }

        let request = self.require(id).await?;
        if request.status != ApprovalStatus::Pending {
            return Err(request.status.invalid_status_error());
        }

        if request.requested_by.user_id == decided_by.user_id()
            && !self
                .policy_engine
                .bypasses(request.action_type, decided_by.role())
        {
            return Err(AppError::Forbidden(
                "approval requests cannot be decided by their requester".to_owned(),
            ));
        }

        let now = Utc::now();
        let transition = ApprovalTransition {
            status: outcome.target_status(),
            decided_by: Some(ApprovalActor::from(decided_by)),
            decided_at: Some(now),
            execution_result: None,
            updated_at: now,
        };

        let Some(decided) = self
            .repository
            .transition(id, ApprovalStatus::Pending, transition)
            .await?
        else {
            return Err(self.lost_transition_error(id).await);
        };

        let action = match outcome {
            ApprovalOutcome::Approve => AuditAction::ApprovalApproved,
            ApprovalOutcome::Reject => AuditAction::ApprovalRejected,
        };
        self.audit
            .record(
                NewAuditEntry::new(action)
                    .target(id)
                    .actor(decided_by.user_id())
                    .note(format!(
                        "{} '{}' requested by '{}'",
                        decided.status, decided.action_type, decided.requested_by.user_id
                    ))
                    .metadata(json!({
                        "action_type": decided.action_type.as_str(),
                        "requested_by": decided.requested_by.user_id,
                        "decider_role": decided_by.role().as_str(),
                    })),
            )
            .await;

        Ok(decided)
    }

    /// Records the executor's result on an approved request.
    ///
    /// Failure results are stored as reported.
    pub async fn mark_executed(
        &self,
        id: &str,
        execution_result: Value,
    ) -> AppResult<ApprovalRequest> {
        let request = self.require(id).await?;
        if request.status != ApprovalStatus::Approved {
            return Err(request.status.invalid_status_error());
        }

        let now = Utc::now();
        let transition = ApprovalTransition {
            execution_result: Some(execution_result),
            ..ApprovalTransition::status(ApprovalStatus::Executed, now)
        };

        let Some(executed) = self
            .repository
            .transition(id, ApprovalStatus::Approved, transition)
            .await?
        else {
            return Err(self.lost_transition_error(id).await);
        };

        let success = executed
            .execution_result
            .as_ref()
            .and_then(|result| result.get("success"))
            .and_then(Value::as_bool);
        self.audit
            .record(
                NewAuditEntry::new(AuditAction::ApprovalExecuted)
                    .target(id)
                    .note(format!("executed approved '{}'", executed.action_type))
                    .metadata(json!({
                        "action_type": executed.action_type.as_str(),
                        "success": success,
                    })),
            )
            .await;

        Ok(executed)
    }
}
