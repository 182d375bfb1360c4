use std::sync::Arc;

use crate::action_gate::{ActionExecutor, SensitiveActionGate};
use crate::approval_ports::ApprovalRequestRepository;
use crate::approval_service::ApprovalService;
use crate::audit_ports::AuditLogRepository;
use crate::audit_recorder::AuditRecorder;
use crate::config::PipelineConfig;
use crate::grant_store::GrantStore;
use crate::policy_engine::PolicyEngine;
use crate::session_ports::SessionRepository;
use crate::session_service::SessionService;
use crate::step_up_service::StepUpService;

/// Adapters the pipeline runs on.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Approval request storage.
    pub approvals: Arc<dyn ApprovalRequestRepository>,
    /// Append-only audit log.
    pub audit_log: Arc<dyn AuditLogRepository>,
    /// Expiring store for step-up grants.
    pub grants: Arc<dyn GrantStore>,
    /// Active session registry.
    pub sessions: Arc<dyn SessionRepository>,
    /// Performs privileged actions once allowed.
    pub executor: Arc<dyn ActionExecutor>,
}

/// Every service of the authorization pipeline, wired together.
#[derive(Clone)]
pub struct AuthorizationPipeline {
    /// Approval policy evaluation.
    pub policy_engine: PolicyEngine,
    /// Approval request lifecycle.
    pub approvals: ApprovalService,
    /// Step-up token issuance and validation.
    pub step_up: StepUpService,
    /// Session termination.
    pub sessions: SessionService,
    /// Audit recording and queries.
    pub audit: AuditRecorder,
    /// Entry point for sensitive actions.
    pub gate: SensitiveActionGate,
}

impl AuthorizationPipeline {
    /// Builds all services over the given adapters.
    #[must_use]
    pub fn build(config: &PipelineConfig, ports: PipelinePorts) -> Self {
        let audit =
            AuditRecorder::new(ports.audit_log).with_append_timeout(config.audit_append_timeout);
        let policy_engine = PolicyEngine::new(config.policy_rules.clone());
        let approvals = ApprovalService::new(
            ports.approvals,
            policy_engine.clone(),
            audit.clone(),
            config.approval_ttl,
        );
        let step_up = StepUpService::new(ports.grants, audit.clone(), config.step_up.clone());
        let sessions = SessionService::new(ports.sessions, step_up.clone(), audit.clone());
        let gate = SensitiveActionGate::new(
            policy_engine.clone(),
            approvals.clone(),
            step_up.clone(),
            ports.executor,
            audit.clone(),
            config.step_up_min_risk,
        );

        Self {
            policy_engine,
            approvals,
            step_up,
            sessions,
            audit,
            gate,
        }
    }
}
