use tracing::info;

use crate::approval_ports::CleanupReport;

use super::*;

impl ApprovalService {
    /// Deletes old terminal requests and expires overdue pending ones.
    ///
    /// Deletion runs first and keys on the last transition time, so requests
    /// expired by this pass survive until their own retention window ends.
    /// Approved requests that were never executed are deleted once their
    /// deadline is older than the window.
    pub async fn cleanup(&self, retention_days: u16) -> AppResult<CleanupReport> {
        if retention_days == 0 {
            return Err(AppError::Validation(
                "approval retention_days must be greater than zero".to_owned(),
            ));
        }

        let now = Utc::now();
        let cutoff = now - Duration::days(i64::from(retention_days));

        let deleted_terminal = self.repository.delete_terminal_before(cutoff).await?;
        let deleted_lapsed = self.repository.delete_lapsed_approved_before(cutoff).await?;
        let deleted_count = deleted_terminal.saturating_add(deleted_lapsed);
        let expired_ids = self.repository.expire_overdue(now).await?;
        let expired_count = u64::try_from(expired_ids.len()).unwrap_or(u64::MAX);

        for id in &expired_ids {
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::ApprovalExpired)
                        .target(id.as_str())
                        .note("expired by cleanup"),
                )
                .await;
        }

        let report = CleanupReport {
            deleted_count,
            expired_count,
        };

        if deleted_count > 0 || expired_count > 0 {
            info!(
                deleted_count,
                expired_count, retention_days, "approval cleanup pass completed"
            );
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::ApprovalCleanup)
                        .note(format!(
                            "deleted {deleted_count}, expired {expired_count}"
                        ))
                        .metadata(json!({
                            "deleted_count": deleted_count,
                            "expired_count": expired_count,
                            "retention_days": retention_days,
                        })),
                )
                .await;
        }

        Ok(report)
    }
}
