use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use bastion_application::{ApprovalRequestRepository, ApprovalTransition};
use bastion_core::{AppError, AppResult};
use bastion_domain::{ApprovalRequest, ApprovalStatus};

/// In-memory approval request repository.
///
/// Every mutation holds the write lock for its whole read-check-write, which
/// gives the same compare-and-set guarantee as a conditional update.
#[derive(Debug, Default)]
pub struct InMemoryApprovalRequestRepository {
    requests: RwLock<HashMap<String, ApprovalRequest>>,
}

impl InMemoryApprovalRequestRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites a stored request in place, bypassing lifecycle checks.
    ///
    /// Intended for fixtures that need to age a request.
    pub async fn update_stored<F>(&self, id: &str, change: F) -> bool
    where
        F: FnOnce(&mut ApprovalRequest) + Send,
    {
        match self.requests.write().await.get_mut(id) {
            Some(request) => {
                change(request);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ApprovalRequestRepository for InMemoryApprovalRequestRepository {
    async fn insert(&self, request: &ApprovalRequest) -> AppResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(AppError::Internal(format!(
                "approval request '{}' already exists",
                request.id
            )));
        }

        requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<ApprovalRequest>> {
        Ok(self.requests.read().await.get(id).cloned())
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

        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(id) else {
            return Ok(None);
        };
        if request.status != expected {
            return Ok(None);
        }

        transition.apply_to(request);
        Ok(Some(request.clone()))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<String>> {
        let mut requests = self.requests.write().await;
        let expire = ApprovalTransition::status(ApprovalStatus::Expired, now);

        let mut expired_ids: Vec<String> = requests
            .values_mut()
            .filter(|request| request.is_overdue(now))
            .map(|request| {
                expire.apply_to(request);
                request.id.clone()
            })
            .collect();
        expired_ids.sort();

        Ok(expired_ids)
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests
            .retain(|_, request| !(request.status.is_terminal() && request.updated_at < cutoff));

        Ok(u64::try_from(before - requests.len()).unwrap_or(u64::MAX))
    }

    async fn delete_lapsed_approved_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, request| {
            !(request.status == ApprovalStatus::Approved && request.expires_at < cutoff)
        });

        Ok(u64::try_from(before - requests.len()).unwrap_or(u64::MAX))
    }
}
