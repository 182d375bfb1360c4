use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use bastion_application::GrantStore;
use bastion_core::AppResult;

#[derive(Debug, Clone)]
struct GrantEntry {
    value: String,
    expires_at: Instant,
}

impl GrantEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory grant store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    entries: RwLock<HashMap<String, GrantEntry>>,
}

impl InMemoryGrantStore {
    /// Creates an empty in-memory grant store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.write().await.insert(
            key.to_owned(),
            GrantEntry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(Instant::now()) => {
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| !entry.is_live(Instant::now()))
        {
            entries.remove(key);
        }

        Ok(None)
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(Instant::now())))
    }
}
