//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod approval;
mod policy;
mod security;

pub use approval::{
    ApprovalActor, ApprovalOutcome, ApprovalRequest, ApprovalStatus, SensitiveAction,
};
pub use policy::{ActionType, ContentType, PolicyRule, RiskLevel};
pub use security::AuditAction;
