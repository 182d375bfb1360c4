use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use bastion_core::AppResult;
use bastion_domain::AuditAction;

/// Append-only audit log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// Stable entry identifier.
    pub id: String,
    /// Stable action identifier.
    pub action: AuditAction,
    /// Affected resource, when the action has one.
    pub target_id: Option<String>,
    /// Acting user, when known.
    pub actor_user_id: Option<String>,
    /// Short human-readable note.
    pub note: Option<String>,
    /// Opaque structured detail.
    pub metadata: Value,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

/// Audit entry as emitted by services, before the recorder stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    /// Stable action identifier.
    pub action: AuditAction,
    /// Affected resource, when the action has one.
    pub target_id: Option<String>,
    /// Acting user, when known.
    pub actor_user_id: Option<String>,
    /// Short human-readable note.
    pub note: Option<String>,
    /// Opaque structured detail.
    pub metadata: Value,
}

impl NewAuditEntry {
    /// Starts an entry for the given action with empty metadata.
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            target_id: None,
            actor_user_id: None,
            note: None,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the affected resource.
    #[must_use]
    pub fn target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub fn actor(mut self, actor_user_id: impl Into<String>) -> Self {
        self.actor_user_id = Some(actor_user_id.into());
        self
    }

    /// Sets the note.
    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Replaces the metadata payload.
    #[must_use]
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filters and pagination for audit queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    /// Optional acting user filter.
    pub user_id: Option<String>,
    /// Optional action filter.
    pub action: Option<AuditAction>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    /// Maximum rows returned.
    pub limit: usize,
    /// Number of rows skipped for offset pagination.
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            action: None,
            from: None,
            to: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditPage {
    /// Entries on this page.
    pub data: Vec<AuditEntry>,
    /// Number of entries matching the filters across all pages.
    pub total: u64,
}

/// Repository port for the append-only audit log.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Persists one audit entry.
    async fn append(&self, entry: &AuditEntry) -> AppResult<()>;

    /// Returns one page of matching entries plus the total match count.
    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage>;

    /// Deletes entries created before the cutoff.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
