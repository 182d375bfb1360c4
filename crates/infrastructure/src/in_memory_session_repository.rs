use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use bastion_application::SessionRepository;
use bastion_core::AppResult;

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: String,
    expires_at: Instant,
}

/// In-memory session registry.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl InMemorySessionRepository {
    /// Creates an empty in-memory session registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live session ids of a user, sorted.
    pub async fn active_sessions(&self, user_id: &str) -> Vec<String> {
        let now = Instant::now();
        let mut session_ids: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.user_id == user_id && entry.expires_at > now)
            .map(|(session_id, _)| session_id.clone())
            .collect();
        session_ids.sort();
        session_ids
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn register_session(
        &self,
        session_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> AppResult<()> {
        self.sessions.write().await.insert(
            session_id.to_owned(),
            SessionEntry {
                user_id: user_id.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn revoke_session(&self, session_id: &str) -> AppResult<bool> {
        let removed = self.sessions.write().await.remove(session_id);
        Ok(removed.is_some_and(|entry| entry.expires_at > Instant::now()))
    }

    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        keep_session_id: Option<&str>,
    ) -> AppResult<u64> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let mut revoked = 0_u64;

        sessions.retain(|session_id, entry| {
            if entry.user_id != user_id || Some(session_id.as_str()) == keep_session_id {
                return true;
            }
            if entry.expires_at > now {
                revoked = revoked.saturating_add(1);
            }
            false
        });

        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bastion_application::SessionRepository;

    use super::InMemorySessionRepository;

    async fn register(repository: &InMemorySessionRepository, session_id: &str, ttl: Duration) {
        assert!(
            repository
                .register_session(session_id, "alice", ttl)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn revoke_user_sessions_keeps_current_and_skips_expired() {
        let repository = InMemorySessionRepository::new();
        register(&repository, "current", Duration::from_secs(600)).await;
        register(&repository, "other", Duration::from_secs(600)).await;
        register(&repository, "lapsed", Duration::ZERO).await;

        let revoked = repository
            .revoke_user_sessions("alice", Some("current"))
            .await;
        let repeated = repository
            .revoke_user_sessions("alice", Some("current"))
            .await;

        assert!(matches!(revoked, Ok(1)));
        assert!(matches!(repeated, Ok(0)));
        assert_eq!(
            repository.active_sessions("alice").await,
            vec!["current".to_owned()]
        );
    }

    #[tokio::test]
    async fn reassigned_session_belongs_to_new_owner_only() {
        let repository = InMemorySessionRepository::new();
        let ttl = Duration::from_secs(600);
        register(&repository, "shared", ttl).await;
        assert!(repository.register_session("shared", "bob", ttl).await.is_ok());

        let revoked_for_alice = repository.revoke_user_sessions("alice", None).await;

        assert!(matches!(revoked_for_alice, Ok(0)));
        assert_eq!(
            repository.active_sessions("bob").await,
            vec!["shared".to_owned()]
        );
    }
}
