use std::time::Duration;

use async_trait::async_trait;

use bastion_core::AppResult;

/// Registry of active login sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Records an active session for a user.
    async fn register_session(
        &self,
        session_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Terminates one session, returning whether it was active.
    async fn revoke_session(&self, session_id: &str) -> AppResult<bool>;

    /// Terminates every active session of a user except `keep_session_id`.
    ///
    /// Returns the number of sessions terminated.
    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        keep_session_id: Option<&str>,
    ) -> AppResult<u64>;
}
