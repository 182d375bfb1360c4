//! Gate in front of every sensitive admin action.
//!
//! The gate decides whether an action may run now, must wait for a second
//! approver, or needs a fresh step-up token first. Running the action is the
//! executor's job; the gate records whatever the executor reports.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use bastion_core::{AppError, AppResult, UserIdentity};
use bastion_domain::{ApprovalRequest, AuditAction, RiskLevel, SensitiveAction};

use crate::approval_ports::ExecutionCheck;
use crate::approval_service::ApprovalService;
use crate::audit_ports::NewAuditEntry;
use crate::audit_recorder::AuditRecorder;
use crate::policy_engine::PolicyEngine;
use crate::step_up_service::StepUpService;


/// Result reported by the executor of a privileged action.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Whether the action completed.
    pub success: bool,
    /// Executor-defined summary stored with the approval.
    pub summary: Value,
}

impl ExecutionOutcome {
    fn to_result_document(&self) -> Value {
        json!({
            "success": self.success,
            "summary": self.summary,
        })
    }
}

/// Port performing the privileged action once the gate allows it.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Runs the action on behalf of the actor.
    async fn execute(
        &self,
        actor: &UserIdentity,
        action: &SensitiveAction,
    ) -> AppResult<ExecutionOutcome>;
}

/// What happened to a submitted action.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// A second approver is required; the pending request was created.
    PendingApproval(ApprovalRequest),
    /// The action is risky enough to need a step-up token first.
    StepUpRequired {
        /// Risk that triggered the requirement.
        risk: RiskLevel,
    },
    /// The executor ran the action.
    Executed(ExecutionOutcome),
}

/// Orchestrates policy, approvals, step-up and execution.
#[derive(Clone)]
pub struct SensitiveActionGate {
    policy_engine: PolicyEngine,
    approvals: ApprovalService,
    step_up: StepUpService,
    executor: Arc<dyn ActionExecutor>,
    audit: AuditRecorder,
    step_up_min_risk: RiskLevel,
}

impl SensitiveActionGate {
    /// Creates a new gate from required dependencies.
    #[must_use]
    pub fn new(
        policy_engine: PolicyEngine,
        approvals: ApprovalService,
        step_up: StepUpService,
        executor: Arc<dyn ActionExecutor>,
        audit: AuditRecorder,
        step_up_min_risk: RiskLevel,
    ) -> Self {
        Self {
            policy_engine,
            approvals,
            step_up,
            executor,
            audit,
            step_up_min_risk,
        }
    }

    /// Evaluates a new action and either queues it for approval or runs it.
    pub async fn submit(
        &self,
        actor: &UserIdentity,
        action: SensitiveAction,
        step_up_token: Option<&str>,
    ) -> AppResult<GateOutcome> {
        let decision = self.policy_engine.evaluate(
            action.action_type.as_str(),
            actor.role(),
            &action.target_ids,
            &action.payload,
        );

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::PolicyEvaluated)
                    .actor(actor.user_id())
                    .note(format!(
                        "'{}' evaluated as {}",
                        action.action_type,
                        decision.reason.as_str()
                    ))
                    .metadata(json!({
                        "action_type": action.action_type,
                        "required": decision.required,
                        "risk": decision.risk.as_str(),
                        "reason": decision.reason.as_str(),
                        "target_count": action.target_ids.len(),
                    })),
            )
            .await;

        if decision.required {
            let request = self.approvals.create(actor, action).await?;
            info!(
                approval_id = %request.id,
                action_type = request.action_type.as_str(),
                "sensitive action queued for approval"
            );
            return Ok(GateOutcome::PendingApproval(request));
        }

        if decision.risk >= self.step_up_min_risk {
            let Some(token) = step_up_token else {
                return Ok(GateOutcome::StepUpRequired {
                    risk: decision.risk,
                });
            };
            self.step_up
                .validate(token, actor.user_id())
                .await?
                .into_result()?;
        }

        let outcome = self.executor.execute(actor, &action).await?;

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::ActionExecuted)
                    .actor(actor.user_id())
                    .note(format!("executed '{}' directly", action.action_type))
                    .metadata(json!({
                        "action_type": action.action_type,
                        "target_ids": action.target_ids,
                        "success": outcome.success,
                    })),
            )
            .await;

        Ok(GateOutcome::Executed(outcome))
    }

    /// Runs an action under an existing approval.
    ///
    /// Only the original requester or a role that may decide approvals can run
    /// the action; anyone else is refused before the step-up check.
    ///
    /// The approval is marked executed after the executor returns. Two callers
    /// racing on one approval can both pass validation; only one of them will
    /// record the result, the other fails with `invalid_status:executed` after
    /// its executor call. Executors that must run at most once need their own
    /// idempotency key, such as the approval id.
    pub async fn execute_approved(
        &self,
        actor: &UserIdentity,
        approval_id: &str,
        action: &SensitiveAction,
        step_up_token: Option<&str>,
    ) -> AppResult<GateOutcome> {
        let request = match self.approvals.validate_for_execution(approval_id, action).await? {
            ExecutionCheck::Allowed(request) => request,
            ExecutionCheck::Denied(reason) => return Err(denial_error(approval_id, reason)),
        };
        let is_requester = actor.user_id() == request.requested_by.user_id;
        if !is_requester && !actor.role().can_decide_approvals() {
            return Err(AppError::Forbidden(format!(
                "user '{}' may not execute approval '{approval_id}'",
                actor.user_id()
            )));
        }

        let risk = self
            .policy_engine
            .rule(request.action_type)
            .map_or(RiskLevel::Low, |rule| rule.risk());
        if risk >= self.step_up_min_risk {
            let Some(token) = step_up_token else {
                return Ok(GateOutcome::StepUpRequired { risk });
            };
            self.step_up
                .validate(token, actor.user_id())
                .await?
                .into_result()?;
        }

        match self.executor.execute(actor, action).await {
            Ok(outcome) => {
                self.approvals
                    .mark_executed(approval_id, outcome.to_result_document())
                    .await
                    .inspect_err(|error| {
                        warn!(
                            approval_id = %approval_id,
                            error = %error,
                            "approved action ran but its result was not recorded"
                        );
                    })?;
                Ok(GateOutcome::Executed(outcome))
            }
            Err(execution_error) => {
                let failure = json!({
                    "success": false,
                    "error": execution_error.code(),
                    "message": execution_error.to_string(),
                });
                if let Err(error) = self.approvals.mark_executed(approval_id, failure).await {
                    warn!(
                        approval_id = %approval_id,
                        error = %error,
                        "failed to record executor failure"
                    );
                }
                Err(execution_error)
            }
        }
    }
}

fn denial_error(approval_id: &str, reason: String) -> AppError {
    if reason == "not_found" {
        return AppError::NotFound(format!("approval request '{approval_id}' was not found"));
    }

    if let Some(status) = reason.strip_prefix("invalid_status:") {
        return AppError::InvalidStatus(status.to_owned());
    }

    AppError::Validation(format!(
        "approval '{approval_id}' does not authorize this action: {reason}"
    ))
}
