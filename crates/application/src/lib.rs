//! Application services and ports for sensitive admin action authorization.

#![forbid(unsafe_code)]

mod action_gate;
mod approval_ports;
mod approval_service;
mod audit_ports;
mod audit_recorder;
mod config;
mod grant_store;
mod pipeline;
mod policy_engine;
mod session_ports;
mod session_service;
mod step_up_service;

#[cfg(test)]
mod test_support;

pub use action_gate::{ActionExecutor, ExecutionOutcome, GateOutcome, SensitiveActionGate};
pub use approval_ports::{
    ApprovalRequestRepository, ApprovalTransition, CleanupReport, ExecutionCheck,
};
pub use approval_service::ApprovalService;
pub use audit_ports::{AuditEntry, AuditLogRepository, AuditPage, AuditQuery, NewAuditEntry};
pub use audit_recorder::{AuditRecorder, DEFAULT_AUDIT_APPEND_TIMEOUT, MAX_AUDIT_PAGE_SIZE};
pub use config::{
    DEFAULT_APPROVAL_TTL_HOURS, DEFAULT_STEP_UP_GRANT_BUFFER_SECONDS,
    DEFAULT_STEP_UP_TTL_SECONDS, PipelineConfig,
};
pub use grant_store::GrantStore;
pub use pipeline::{AuthorizationPipeline, PipelinePorts};
pub use policy_engine::{
    PolicyDecision, PolicyEngine, PolicyReason, PolicyRuleOverride, PolicyRuleSet,
};
pub use session_ports::SessionRepository;
pub use session_service::{SessionService, TerminationScope};
pub use step_up_service::{
    IssuedStepUpToken, MIN_STEP_UP_SECRET_BYTES, STEP_UP_PURPOSE, StepUpClaims,
    StepUpRejection, StepUpService, StepUpSettings, StepUpValidation,
};
