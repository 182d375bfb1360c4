use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use bastion_application::SessionRepository;
use bastion_core::{AppError, AppResult};

use crate::store_errors::sqlx_error;


/// PostgreSQL-backed session registry.
///
/// Terminated sessions keep their row with `revoked_at` set so the
/// authentication layer can deny them until they expire.
#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes rows whose session lifetime has ended.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM auth_sessions
            WHERE expires_at <= now()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("purge expired sessions", error))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn register_session(
        &self,
        session_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> AppResult<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|error| AppError::Validation(format!("invalid session ttl: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO auth_sessions (session_id, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                expires_at = EXCLUDED.expires_at,
                revoked_at = NULL
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("register session", error))?;

        Ok(())
    }

    async fn revoke_session(&self, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET revoked_at = now()
            WHERE session_id = $1
                AND revoked_at IS NULL
                AND expires_at > now()
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("revoke session", error))?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        keep_session_id: Option<&str>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET revoked_at = now()
            WHERE user_id = $1
                AND revoked_at IS NULL
                AND expires_at > now()
                AND ($2::TEXT IS NULL OR session_id <> $2)
            "#,
        )
        .bind(user_id)
        .bind(keep_session_id)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("revoke user sessions", error))?;

        Ok(result.rows_affected())
    }
}
