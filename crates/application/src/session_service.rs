//! Session termination.

use std::sync::Arc;

use serde_json::json;

use bastion_core::{AppError, AppResult};
use bastion_domain::AuditAction;

use crate::audit_ports::NewAuditEntry;
use crate::audit_recorder::AuditRecorder;
use crate::session_ports::SessionRepository;
use crate::step_up_service::StepUpService;

#[cfg(test)]
mod tests;

/// Which sessions survive a "terminate others" request.
///
/// Terminating every session, including the caller's own, is only possible
/// with a fresh step-up token; there is no implicit variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationScope {
    /// Keep the caller's current session.
    KeepCurrent(String),
    /// Terminate all sessions once the step-up token validates.
    AllAfterStepUp(String),
}

/// Application service for session termination.
#[derive(Clone)]
pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    step_up: StepUpService,
    audit: AuditRecorder,
}

impl SessionService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        step_up: StepUpService,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            repository,
            step_up,
            audit,
        }
    }

    /// Terminates one session.
    ///
    /// Unknown and already terminated sessions return `false`.
    pub async fn terminate_by_id(&self, session_id: &str) -> AppResult<bool> {
        if session_id.trim().is_empty() {
            return Ok(false);
        }

        let terminated = self.repository.revoke_session(session_id).await?;

        if terminated {
            self.audit
                .record(NewAuditEntry::new(AuditAction::SessionTerminated).target(session_id))
                .await;
        }

        Ok(terminated)
    }

    /// Terminates a user's other sessions and returns how many ended.
    pub async fn terminate_others(&self, user_id: &str, scope: TerminationScope) -> AppResult<u64> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id must not be empty".to_owned()));
        }

        let keep_session_id = match &scope {
            TerminationScope::KeepCurrent(session_id) => {
                if session_id.trim().is_empty() {
                    return Err(AppError::Validation(
                        "current session id must not be empty".to_owned(),
                    ));
                }
                Some(session_id.as_str())
            }
            TerminationScope::AllAfterStepUp(token) => {
                self.step_up.validate(token, user_id).await?.into_result()?;
                None
            }
        };

        let terminated_count = self
            .repository
            .revoke_user_sessions(user_id, keep_session_id)
            .await?;

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::SessionsTerminated)
                    .target(user_id)
                    .actor(user_id)
                    .note(format!("terminated {terminated_count} session(s)"))
                    .metadata(json!({
                        "terminated_count": terminated_count,
                        "kept_session_id": keep_session_id,
                    })),
            )
            .await;

        Ok(terminated_count)
    }
}
