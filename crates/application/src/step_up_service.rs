//! Step-up tokens for high-risk actions.
//!
//! A token is only valid while two things hold: its signature verifies and a
//! grant keyed by its `jti` is still present in the grant store. Revoking the
//! grant invalidates the token before its signature expires.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header};
use serde_json::json;

use bastion_core::{AppError, AppResult, UserIdentity};
use bastion_domain::AuditAction;

use crate::audit_ports::NewAuditEntry;
use crate::audit_recorder::AuditRecorder;
use crate::grant_store::GrantStore;

mod claims;
mod validation;


pub use claims::{STEP_UP_PURPOSE, StepUpClaims};
pub use validation::{StepUpRejection, StepUpValidation};

use claims::StepUpGrant;

/// Minimum accepted signing secret length in bytes.
pub const MIN_STEP_UP_SECRET_BYTES: usize = 32;

/// Signing and lifetime settings for step-up tokens.
#[derive(Clone)]
pub struct StepUpSettings {
    secret: Arc<[u8]>,
    lifetime: Duration,
    grant_buffer: Duration,
}

impl StepUpSettings {
    /// Validates and builds step-up settings.
    pub fn new(secret: &str, lifetime: Duration, grant_buffer: Duration) -> AppResult<Self> {
        if secret.len() < MIN_STEP_UP_SECRET_BYTES {
            return Err(AppError::Validation(format!(
                "step-up secret must be at least {MIN_STEP_UP_SECRET_BYTES} bytes"
            )));
        }

        if lifetime <= Duration::zero() {
            return Err(AppError::Validation(
                "step-up lifetime must be positive".to_owned(),
            ));
        }

        if grant_buffer < Duration::zero() {
            return Err(AppError::Validation(
                "step-up grant buffer must not be negative".to_owned(),
            ));
        }

        Ok(Self {
            secret: Arc::from(secret.as_bytes()),
            lifetime,
            grant_buffer,
        })
    }

    /// Returns the token lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Returns the extra time a grant outlives its token.
    #[must_use]
    pub fn grant_buffer(&self) -> Duration {
        self.grant_buffer
    }
}

impl std::fmt::Debug for StepUpSettings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StepUpSettings")
            .field("secret", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .field("grant_buffer", &self.grant_buffer)
            .finish()
    }
}

/// Freshly issued step-up token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedStepUpToken {
    /// Signed token presented on sensitive requests.
    pub token: String,
    /// Unique grant identifier.
    pub jti: String,
    /// Signature expiry.
    pub expires_at: DateTime<Utc>,
}

/// Application service issuing, validating and revoking step-up tokens.
#[derive(Clone)]
pub struct StepUpService {
    grant_store: Arc<dyn GrantStore>,
    audit: AuditRecorder,
    settings: StepUpSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl StepUpService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        grant_store: Arc<dyn GrantStore>,
        audit: AuditRecorder,
        settings: StepUpSettings,
    ) -> Self {
        let encoding_key = EncodingKey::from_secret(&settings.secret);
        let decoding_key = DecodingKey::from_secret(&settings.secret);

        Self {
            grant_store,
            audit,
            settings,
            encoding_key,
            decoding_key,
        }
    }

    /// Signs a token for a freshly re-authenticated user and stores its grant.
    pub async fn issue(&self, identity: &UserIdentity) -> AppResult<IssuedStepUpToken> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.settings.lifetime;
        let jti = uuid::Uuid::new_v4().to_string();

        let claims = StepUpClaims {
            sub: identity.user_id().to_owned(),
            email: identity.email().to_owned(),
            role: identity.role(),
            purpose: STEP_UP_PURPOSE.to_owned(),
            step_up: true,
            jti: jti.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|error| AppError::Internal(format!("failed to sign step-up token: {error}")))?;

        let grant = StepUpGrant {
            jti: jti.clone(),
            user_id: identity.user_id().to_owned(),
            issued_at,
        };
        let grant_value = serde_json::to_string(&grant).map_err(|error| {
            AppError::Internal(format!("failed to serialize step-up grant: {error}"))
        })?;
        let grant_ttl = (self.settings.lifetime + self.settings.grant_buffer)
            .to_std()
            .map_err(|error| AppError::Internal(format!("invalid step-up grant ttl: {error}")))?;

        self.grant_store
            .put(grant_key(jti.as_str()).as_str(), grant_value.as_str(), grant_ttl)
            .await?;

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::StepUpIssued)
                    .target(jti.as_str())
                    .actor(identity.user_id())
                    .metadata(json!({
                        "role": identity.role().as_str(),
                        "expires_at": expires_at.to_rfc3339(),
                    })),
            )
            .await;

        Ok(IssuedStepUpToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Deletes the grant behind a token, returning whether one was live.
    pub async fn revoke(&self, jti: &str) -> AppResult<bool> {
        if jti.trim().is_empty() {
            return Err(AppError::Validation(
                "step-up jti must not be empty".to_owned(),
            ));
        }

        let revoked = self.grant_store.delete(grant_key(jti).as_str()).await?;

        if revoked {
            self.audit
                .record(NewAuditEntry::new(AuditAction::StepUpRevoked).target(jti))
                .await;
        }

        Ok(revoked)
    }
}

fn grant_key(jti: &str) -> String {
    format!("step_up:{jti}")
}
