use std::time::Duration;

use async_trait::async_trait;

use bastion_core::AppResult;

/// Expiring key-value store holding revocable security grants.
///
/// Entries disappear once their TTL elapses; `get` never returns an expired
/// value.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Stores a value under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Returns the live value for `key`.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Removes `key`, returning whether a live value was deleted.
    async fn delete(&self, key: &str) -> AppResult<bool>;
}
