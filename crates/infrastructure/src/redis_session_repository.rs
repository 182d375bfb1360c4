//! Redis-backed session registry.
//!
//! Each session lives under `<prefix>:session:<id>` holding its user id, and
//! each user has an index set `<prefix>:user_sessions:<user>`. Index entries
//! whose session key has expired are pruned lazily by the scripts.
//! Re-registering a session id for another user moves it between index sets.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::MultiplexedConnection;

use bastion_application::SessionRepository;
use bastion_core::{AppError, AppResult};

use crate::store_errors::redis_error;


const REGISTER_SESSION_SCRIPT: &str = r#"
local previous_owner = redis.call('GET', KEYS[1])
if previous_owner and previous_owner ~= ARGV[1] then
  redis.call('SREM', ARGV[4] .. previous_owner, ARGV[3])
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SADD', KEYS[2], ARGV[3])
local index_ttl = redis.call('TTL', KEYS[2])
if index_ttl < tonumber(ARGV[2]) then
  redis.call('EXPIRE', KEYS[2], ARGV[2])
end
return 1
"#;

const REVOKE_SESSION_SCRIPT: &str = r#"
local user_id = redis.call('GET', KEYS[1])
if not user_id then
  return 0
end
redis.call('DEL', KEYS[1])
redis.call('SREM', ARGV[1] .. user_id, ARGV[2])
return 1
"#;

const REVOKE_USER_SESSIONS_SCRIPT: &str = r#"
local session_ids = redis.call('SMEMBERS', KEYS[1])
local revoked = 0
for _, session_id in ipairs(session_ids) do
  if session_id ~= ARGV[2] then
    revoked = revoked + redis.call('DEL', ARGV[1] .. session_id)
    redis.call('SREM', KEYS[1], session_id)
  elseif redis.call('EXISTS', ARGV[1] .. session_id) == 0 then
    redis.call('SREM', KEYS[1], session_id)
  end
end
return revoked
"#;

/// Redis implementation of the session registry port.
#[derive(Clone)]
pub struct RedisSessionRepository {
    client: redis::Client,
    key_prefix: String,
}

impl RedisSessionRepository {
    /// Creates a repository with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn session_key_prefix(&self) -> String {
        format!("{}:session:", self.key_prefix)
    }

    fn user_index_prefix(&self) -> String {
        format!("{}:user_sessions:", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl SessionRepository for RedisSessionRepository {
    async fn register_session(
        &self,
        session_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> AppResult<()> {
        if session_id.trim().is_empty() || user_id.trim().is_empty() {
            return Err(AppError::Validation(
                "session_id and user_id must not be empty".to_owned(),
            ));
        }

        let mut connection = self.connection().await?;
        Script::new(REGISTER_SESSION_SCRIPT)
            .key(format!("{}{session_id}", self.session_key_prefix()))
            .key(format!("{}{user_id}", self.user_index_prefix()))
            .arg(user_id)
            .arg(ttl.as_secs().max(1))
            .arg(session_id)
            .arg(self.user_index_prefix())
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| redis_error("register session", error))?;

        Ok(())
    }

    async fn revoke_session(&self, session_id: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;

        let revoked = Script::new(REVOKE_SESSION_SCRIPT)
            .key(format!("{}{session_id}", self.session_key_prefix()))
            .arg(self.user_index_prefix())
            .arg(session_id)
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| redis_error("revoke session", error))?;

        Ok(revoked > 0)
    }

    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        keep_session_id: Option<&str>,
    ) -> AppResult<u64> {
        let mut connection = self.connection().await?;

        let revoked = Script::new(REVOKE_USER_SESSIONS_SCRIPT)
            .key(format!("{}{user_id}", self.user_index_prefix()))
            .arg(self.session_key_prefix())
            .arg(keep_session_id.unwrap_or_default())
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| redis_error("revoke user sessions", error))?;

        Ok(u64::try_from(revoked).unwrap_or_default())
    }
}
