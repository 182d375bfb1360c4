use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use bastion_application::{AuditEntry, AuditLogRepository, AuditPage, AuditQuery};
use bastion_core::{AppError, AppResult};
use bastion_domain::AuditAction;

use crate::store_errors::sqlx_error;


/// PostgreSQL-backed append-only audit log.
#[derive(Clone)]
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    id: String,
    action: String,
    target_id: Option<String>,
    actor_user_id: Option<String>,
    note: Option<String>,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditEntry {
    type Error = AppError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            action: AuditAction::from_str(row.action.as_str())?,
            target_id: row.target_id,
            actor_user_id: row.actor_user_id,
            note: row.note,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn append(&self, entry: &AuditEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log_entries (
                id,
                action,
                target_id,
                actor_user_id,
                note,
                metadata,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_str())
        .bind(entry.action.as_str())
        .bind(entry.target_id.as_deref())
        .bind(entry.actor_user_id.as_deref())
        .bind(entry.note.as_deref())
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("append audit entry", error))?;

        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let action = query.action.map(|action| action.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM audit_log_entries
            WHERE ($1::TEXT IS NULL OR actor_user_id = $1)
                AND ($2::TEXT IS NULL OR action = $2)
                AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
                AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
            "#,
        )
        .bind(query.user_id.as_deref())
        .bind(action)
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| sqlx_error("count audit entries", error))?;

        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT id, action, target_id, actor_user_id, note, metadata, created_at
            FROM audit_log_entries
            WHERE ($1::TEXT IS NULL OR actor_user_id = $1)
                AND ($2::TEXT IS NULL OR action = $2)
                AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
                AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            OFFSET $6
            "#,
        )
        .bind(query.user_id.as_deref())
        .bind(action)
        .bind(query.from)
        .bind(query.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| sqlx_error("list audit entries", error))?;

        let data = rows
            .into_iter()
            .map(AuditEntry::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(AuditPage {
            data,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM audit_log_entries
            WHERE created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("purge audit entries", error))?;

        Ok(result.rows_affected())
    }
}
