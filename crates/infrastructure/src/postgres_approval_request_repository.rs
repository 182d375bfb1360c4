use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use bastion_application::{ApprovalRequestRepository, ApprovalTransition};
use bastion_core::{AppError, AppResult, Role};
use bastion_domain::{ActionType, ApprovalActor, ApprovalRequest, ApprovalStatus};

use crate::store_errors::sqlx_error;


const APPROVAL_COLUMNS: &str = r#"
    id,
    action_type,
    endpoint,
    method,
    target_ids,
    payload,
    requested_by_user_id,
    requested_by_email,
    requested_by_role,
    status,
    requested_at,
    expires_at,
    decided_by_user_id,
    decided_by_email,
    decided_by_role,
    decided_at,
    execution_result,
    updated_at
"#;

/// PostgreSQL-backed repository for approval requests.
#[derive(Clone)]
pub struct PostgresApprovalRequestRepository {
    pool: PgPool,
}

impl PostgresApprovalRequestRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ApprovalRequestRow {
    id: String,
    action_type: String,
    endpoint: String,
    method: String,
    target_ids: Vec<String>,
    payload: Value,
    requested_by_user_id: String,
    requested_by_email: String,
    requested_by_role: String,
    status: String,
    requested_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    decided_by_user_id: Option<String>,
    decided_by_email: Option<String>,
    decided_by_role: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    execution_result: Option<Value>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApprovalRequestRow> for ApprovalRequest {
    type Error = AppError;

    fn try_from(row: ApprovalRequestRow) -> Result<Self, Self::Error> {
        let decided_by = match (
            row.decided_by_user_id,
            row.decided_by_email,
            row.decided_by_role,
        ) {
            (Some(user_id), Some(email), Some(role)) => Some(ApprovalActor {
                user_id,
                email,
                role: Role::from_str(role.as_str())?,
            }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            action_type: ActionType::from_str(row.action_type.as_str())?,
            endpoint: row.endpoint,
            method: row.method,
            target_ids: row.target_ids,
            payload: row.payload,
            requested_by: ApprovalActor {
                user_id: row.requested_by_user_id,
                email: row.requested_by_email,
                role: Role::from_str(row.requested_by_role.as_str())?,
            },
            status: ApprovalStatus::from_str(row.status.as_str())?,
            requested_at: row.requested_at,
            expires_at: row.expires_at,
            decided_by,
            decided_at: row.decided_at,
            execution_result: row.execution_result,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ApprovalRequestRepository for PostgresApprovalRequestRepository {
    async fn insert(&self, request: &ApprovalRequest) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO approval_requests (
                id,
                action_type,
                endpoint,
                method,
                target_ids,
                payload,
                requested_by_user_id,
                requested_by_email,
                requested_by_role,
                status,
                requested_at,
                expires_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(request.id.as_str())
        .bind(request.action_type.as_str())
        .bind(request.endpoint.as_str())
        .bind(request.method.as_str())
        .bind(&request.target_ids)
        .bind(&request.payload)
        .bind(request.requested_by.user_id.as_str())
        .bind(request.requested_by.email.as_str())
        .bind(request.requested_by.role.as_str())
        .bind(request.status.as_str())
        .bind(request.requested_at)
        .bind(request.expires_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("insert approval request", error))?;

        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, ApprovalRequestRow>(
            format!("SELECT {APPROVAL_COLUMNS} FROM approval_requests WHERE id = $1").as_str(),
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| sqlx_error("load approval request", error))?;

        row.map(ApprovalRequest::try_from).transpose()
    }

    async fn transition(
        &self,
        id: &str,
        expected: ApprovalStatus,
        transition: ApprovalTransition,
    ) -> AppResult<Option<ApprovalRequest>> {
        if !expected.can_transition_to(transition.status) {
            return Err(AppError::Internal(format!(
                "illegal approval transition {expected} -> {}",
                transition.status
            )));
        }

        let decided_by = transition.decided_by.as_ref();
        let row = sqlx::query_as::<_, ApprovalRequestRow>(
            format!(
                r#"
                UPDATE approval_requests
                SET
                    status = $3,
                    decided_by_user_id = COALESCE($4, decided_by_user_id),
                    decided_by_email = COALESCE($5, decided_by_email),
                    decided_by_role = COALESCE($6, decided_by_role),
                    decided_at = COALESCE($7, decided_at),
                    execution_result = COALESCE($8, execution_result),
                    updated_at = $9
                WHERE id = $1 AND status = $2
                RETURNING {APPROVAL_COLUMNS}
                "#
            )
            .as_str(),
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(transition.status.as_str())
        .bind(decided_by.map(|actor| actor.user_id.as_str()))
        .bind(decided_by.map(|actor| actor.email.as_str()))
        .bind(decided_by.map(|actor| actor.role.as_str()))
        .bind(transition.decided_at)
        .bind(transition.execution_result.as_ref())
        .bind(transition.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| sqlx_error("transition approval request", error))?;

        row.map(ApprovalRequest::try_from).transpose()
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            UPDATE approval_requests
            SET status = 'expired', updated_at = $1
            WHERE status = 'pending' AND expires_at <= $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| sqlx_error("expire overdue approval requests", error))
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM approval_requests
            WHERE status IN ('rejected', 'executed', 'expired')
                AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("delete terminal approval requests", error))?;

        Ok(result.rows_affected())
    }

    async fn delete_lapsed_approved_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM approval_requests
            WHERE status = 'approved'
                AND expires_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("delete lapsed approved requests", error))?;

        Ok(result.rows_affected())
    }
}
