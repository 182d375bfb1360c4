//! Redis-backed grant store.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use bastion_application::GrantStore;
use bastion_core::{AppError, AppResult};

use crate::store_errors::redis_error;

/// Redis implementation of the expiring grant store.
#[derive(Clone)]
pub struct RedisGrantStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisGrantStore {
    /// Creates a store with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl GrantStore for RedisGrantStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let ttl_seconds = ttl.as_secs().max(1);
        let mut connection = self.connection().await?;

        connection
            .set_ex::<_, _, ()>(self.key_for(key), value, ttl_seconds)
            .await
            .map_err(|error| redis_error("store grant", error))
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;

        connection
            .get::<_, Option<String>>(self.key_for(key))
            .await
            .map_err(|error| redis_error("load grant", error))
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;

        let deleted: u64 = connection
            .del(self.key_for(key))
            .await
            .map_err(|error| redis_error("delete grant", error))?;

        Ok(deleted > 0)
    }
}
