//! Audit recording and retrieval.
//!
//! Recording never fails the caller. Appends are awaited inline but bounded
//! by a timeout; errors and timeouts are logged and dropped so the audit
//! store cannot block an administrative action.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::warn;

use bastion_core::{AppError, AppResult};

use crate::audit_ports::{AuditEntry, AuditLogRepository, AuditPage, AuditQuery, NewAuditEntry};


/// Largest page size served by [`AuditRecorder::query`].
pub const MAX_AUDIT_PAGE_SIZE: usize = 200;

/// Default upper bound on a single audit append.
pub const DEFAULT_AUDIT_APPEND_TIMEOUT: StdDuration = StdDuration::from_secs(2);

/// Application service for the append-only audit log.
#[derive(Clone)]
pub struct AuditRecorder {
    repository: Arc<dyn AuditLogRepository>,
    append_timeout: StdDuration,
}

impl AuditRecorder {
    /// Creates a recorder over an audit repository.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditLogRepository>) -> Self {
        Self {
            repository,
            append_timeout: DEFAULT_AUDIT_APPEND_TIMEOUT,
        }
    }

    /// Replaces the upper bound on a single append.
    #[must_use]
    pub fn with_append_timeout(mut self, append_timeout: StdDuration) -> Self {
        self.append_timeout = append_timeout;
        self
    }

    /// Appends an entry, logging instead of returning any failure.
    ///
    /// The caller waits for the append, at most for the configured timeout.
    /// An append that times out is abandoned and may or may not land.
    pub async fn record(&self, entry: NewAuditEntry) {
        let entry = AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            action: entry.action,
            target_id: entry.target_id,
            actor_user_id: entry.actor_user_id,
            note: entry.note,
            metadata: entry.metadata,
            created_at: Utc::now(),
        };

        match tokio::time::timeout(self.append_timeout, self.repository.append(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(
                audit_id = %entry.id,
                action = entry.action.as_str(),
                target_id = entry.target_id.as_deref().unwrap_or("-"),
                error = %error,
                "failed to append audit entry"
            ),
            Err(_) => warn!(
                audit_id = %entry.id,
                action = entry.action.as_str(),
                target_id = entry.target_id.as_deref().unwrap_or("-"),
                timeout_ms = u64::try_from(self.append_timeout.as_millis()).unwrap_or(u64::MAX),
                "audit append timed out"
            ),
        }
    }

    /// Returns one page of entries matching every provided filter.
    pub async fn query(&self, query: AuditQuery) -> AppResult<AuditPage> {
        if let (Some(from), Some(to)) = (query.from, query.to)
            && from > to
        {
            return Err(AppError::Validation(
                "audit query 'from' must not be after 'to'".to_owned(),
            ));
        }

        let query = AuditQuery {
            limit: query.limit.clamp(1, MAX_AUDIT_PAGE_SIZE),
            ..query
        };

        self.repository.query(&query).await
    }

    /// Deletes entries older than the retention window.
    pub async fn purge_older_than(&self, retention_days: u16) -> AppResult<u64> {
        if retention_days == 0 {
            return Err(AppError::Validation(
                "audit retention_days must be greater than zero".to_owned(),
            ));
        }

        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        self.repository.purge_before(cutoff).await
    }
}
