use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bastion_core::Role;

/// Fixed purpose string carried by every step-up token.
pub const STEP_UP_PURPOSE: &str = "admin_sensitive_action";

/// Claims of a verified step-up token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpClaims {
    /// User the token was issued to.
    pub sub: String,
    /// Email at issuance.
    pub email: String,
    /// Role at issuance.
    pub role: Role,
    /// Always [`STEP_UP_PURPOSE`].
    pub purpose: String,
    /// Always `true`.
    pub step_up: bool,
    /// Grant identifier.
    pub jti: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Claims as decoded from an unverified shape.
///
/// Every field is optional so a structurally foreign token is reported as
/// invalid instead of failing deserialization with an opaque error.
#[derive(Debug, Default, Deserialize)]
pub(super) struct RawStepUpClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub step_up: Option<bool>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    pub exp: i64,
}

/// Revocable grant stored under `step_up:<jti>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct StepUpGrant {
    pub jti: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
}
