use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use bastion_application::{AuditEntry, AuditLogRepository, AuditPage, AuditQuery};
use bastion_core::AppResult;

/// In-memory append-only audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLogRepository {
    /// Creates an empty in-memory audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(entry: &AuditEntry, query: &AuditQuery) -> bool {
    if let Some(user_id) = query.user_id.as_deref()
        && entry.actor_user_id.as_deref() != Some(user_id)
    {
        return false;
    }

    if query.action.is_some_and(|action| entry.action != action) {
        return false;
    }

    if query.from.is_some_and(|from| entry.created_at < from) {
        return false;
    }

    !query.to.is_some_and(|to| entry.created_at > to)
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entry: &AuditEntry) -> AppResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        let entries = self.entries.read().await;

        let mut matching: Vec<&AuditEntry> =
            entries.iter().filter(|entry| matches(entry, query)).collect();
        matching.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let data = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(AuditPage { data, total })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.created_at >= cutoff);

        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }
}
