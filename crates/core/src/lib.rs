//! Shared primitives for all Rust crates in Bastion.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use thiserror::Error;

pub use auth::{Role, UserIdentity};

/// Result type used across Bastion crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Record is not in the state required for the requested transition.
    ///
    /// Carries the stable storage value of the observed status.
    #[error("invalid_status:{0}")]
    InvalidStatus(String),

    /// Step-up token signature or grant has expired or was revoked.
    #[error("step_up_expired")]
    StepUpExpired,

    /// Step-up token was issued to a different user.
    #[error("step_up_user_mismatch")]
    StepUpUserMismatch,

    /// Step-up token is malformed, unsigned, or minted for another purpose.
    #[error("invalid_step_up_token")]
    InvalidStepUpToken,

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Backing store is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the stable error code exposed to callers.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Validation(_) => "validation_error".to_owned(),
            Self::NotFound(_) => "not_found".to_owned(),
            Self::InvalidStatus(status) => format!("invalid_status:{status}"),
            Self::StepUpExpired => "step_up_expired".to_owned(),
            Self::StepUpUserMismatch => "step_up_user_mismatch".to_owned(),
            Self::InvalidStepUpToken => "invalid_step_up_token".to_owned(),
            Self::Forbidden(_) => "forbidden".to_owned(),
            Self::Unavailable(_) => "store_unavailable".to_owned(),
            Self::Internal(_) => "internal_error".to_owned(),
        }
    }

    /// Returns whether the failure is transient and safe to retry with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
