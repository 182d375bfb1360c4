use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use tracing::debug;

use bastion_core::{AppError, Role};

use super::claims::{RawStepUpClaims, StepUpGrant};
use super::*;

/// Why a step-up token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepUpRejection {
    /// Bad signature, malformed token or missing step-up markers.
    InvalidToken,
    /// Issued to a different user.
    UserMismatch,
    /// Signature expired, or the grant is gone.
    Expired,
}

impl StepUpRejection {
    /// Returns the stable error code for this rejection.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_step_up_token",
            Self::UserMismatch => "step_up_user_mismatch",
            Self::Expired => "step_up_expired",
        }
    }
}

impl From<StepUpRejection> for AppError {
    fn from(rejection: StepUpRejection) -> Self {
        match rejection {
            StepUpRejection::InvalidToken => Self::InvalidStepUpToken,
            StepUpRejection::UserMismatch => Self::StepUpUserMismatch,
            StepUpRejection::Expired => Self::StepUpExpired,
        }
    }
}

/// Outcome of validating a step-up token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepUpValidation {
    /// Token is live for the expected user.
    Valid(StepUpClaims),
    /// Token must not be honoured.
    Rejected(StepUpRejection),
}

impl StepUpValidation {
    /// Returns whether the token was accepted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Converts a rejection into its error, returning the claims otherwise.
    pub fn into_result(self) -> AppResult<StepUpClaims> {
        match self {
            Self::Valid(claims) => Ok(claims),
            Self::Rejected(rejection) => Err(rejection.into()),
        }
    }
}

impl StepUpService {
    /// Checks a presented token against the expected user and its grant.
    ///
    /// Malformed or foreign tokens are rejections, not errors. Only grant
    /// store failures surface as `Err`.
    pub async fn validate(
        &self,
        token: &str,
        expected_user_id: &str,
    ) -> AppResult<StepUpValidation> {
        let claims = match self.verify_signature(token) {
            Ok(claims) => claims,
            Err(rejection) => return Ok(StepUpValidation::Rejected(rejection)),
        };

        if claims.sub != expected_user_id {
            return Ok(StepUpValidation::Rejected(StepUpRejection::UserMismatch));
        }

        let Some(stored) = self
            .grant_store
            .get(grant_key(claims.jti.as_str()).as_str())
            .await?
        else {
            return Ok(StepUpValidation::Rejected(StepUpRejection::Expired));
        };

        let grant_matches = serde_json::from_str::<StepUpGrant>(stored.as_str())
            .map(|grant| grant.user_id == claims.sub && grant.jti == claims.jti)
            .unwrap_or(false);
        if !grant_matches {
            debug!(jti = %claims.jti, "step-up grant does not match token");
            return Ok(StepUpValidation::Rejected(StepUpRejection::Expired));
        }

        Ok(StepUpValidation::Valid(claims))
    }

    fn verify_signature(&self, token: &str) -> Result<StepUpClaims, StepUpRejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let raw = jsonwebtoken::decode::<RawStepUpClaims>(token, &self.decoding_key, &validation)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => StepUpRejection::Expired,
                _ => StepUpRejection::InvalidToken,
            })?
            .claims;

        if raw.step_up != Some(true) || raw.purpose.as_deref() != Some(STEP_UP_PURPOSE) {
            return Err(StepUpRejection::InvalidToken);
        }

        let (Some(jti), Some(sub)) = (raw.jti, raw.sub) else {
            return Err(StepUpRejection::InvalidToken);
        };
        if jti.is_empty() {
            return Err(StepUpRejection::InvalidToken);
        }

        let role = raw
            .role
            .as_deref()
            .and_then(|role| Role::from_str(role).ok())
            .ok_or(StepUpRejection::InvalidToken)?;

        Ok(StepUpClaims {
            sub,
            email: raw.email.unwrap_or_default(),
            role,
            purpose: STEP_UP_PURPOSE.to_owned(),
            step_up: true,
            jti,
            iat: raw.iat.unwrap_or_default(),
            exp: raw.exp,
        })
    }
}
