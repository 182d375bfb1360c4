use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use bastion_core::{AppError, AppResult, Role, UserIdentity};
use bastion_domain::{ApprovalRequest, ApprovalStatus, AuditAction, SensitiveAction};

use crate::approval_ports::{ApprovalRequestRepository, ApprovalTransition};
use crate::audit_ports::{AuditEntry, AuditLogRepository, AuditPage, AuditQuery};
use crate::grant_store::GrantStore;
use crate::session_ports::SessionRepository;

pub(crate) const TEST_SECRET: &str = "test-secret-that-is-at-least-32-bytes";

pub(crate) fn identity(user_id: &str, role: Role) -> UserIdentity {
    UserIdentity::new(
        user_id,
        format!("{user_id}@example.com"),
        role,
        Some(format!("{user_id}-session")),
    )
}

pub(crate) fn delete_action(target_ids: &[&str]) -> SensitiveAction {
    SensitiveAction {
        action_type: "delete".to_owned(),
        endpoint: "/admin/listings/bulk".to_owned(),
        method: "DELETE".to_owned(),
        target_ids: target_ids.iter().map(|id| (*id).to_owned()).collect(),
        payload: serde_json::json!({"type": "listing"}),
    }
}

#[derive(Default)]
pub(crate) struct FakeApprovalRepository {
    requests: Mutex<HashMap<String, ApprovalRequest>>,
    stale_read: Mutex<Option<ApprovalRequest>>,
    offline: AtomicBool,
}

impl FakeApprovalRepository {
    pub(crate) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Serves `snapshot` to the next `find` of its id, then reads live again.
    pub(crate) async fn serve_stale_once(&self, snapshot: ApprovalRequest) {
        *self.stale_read.lock().await = Some(snapshot);
    }

    fn check_online(&self) -> AppResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("approval store offline".to_owned()));
        }
        Ok(())
    }

    pub(crate) async fn seed(&self, request: ApprovalRequest) {
        self.requests
            .lock()
            .await
            .insert(request.id.clone(), request);
    }

    pub(crate) async fn rewrite<F>(&self, id: &str, change: F)
    where
        F: FnOnce(&mut ApprovalRequest),
    {
        if let Some(request) = self.requests.lock().await.get_mut(id) {
            change(request);
        }
    }

    pub(crate) async fn stored(&self, id: &str) -> Option<ApprovalRequest> {
        self.requests.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl ApprovalRequestRepository for FakeApprovalRepository {
    async fn insert(&self, request: &ApprovalRequest) -> AppResult<()> {
        self.check_online()?;
        self.requests
            .lock()
            .await
            .insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<ApprovalRequest>> {
        self.check_online()?;
        {
            let mut stale_read = self.stale_read.lock().await;
            if stale_read.as_ref().is_some_and(|snapshot| snapshot.id == id) {
                return Ok(stale_read.take());
            }
        }
        Ok(self.requests.lock().await.get(id).cloned())
    }

    async fn transition(
        &self,
        id: &str,
        expected: ApprovalStatus,
        transition: ApprovalTransition,
    ) -> AppResult<Option<ApprovalRequest>> {
        self.check_online()?;
        let mut requests = self.requests.lock().await;
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
        self.check_online()?;
        let mut requests = self.requests.lock().await;
        let mut expired = Vec::new();
        for request in requests.values_mut() {
            if request.is_overdue(now) {
                ApprovalTransition::status(ApprovalStatus::Expired, now).apply_to(request);
                expired.push(request.id.clone());
            }
        }
        Ok(expired)
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.check_online()?;
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|_, request| !(request.status.is_terminal() && request.updated_at < cutoff));
        Ok(u64::try_from(before - requests.len()).unwrap_or(u64::MAX))
    }

    async fn delete_lapsed_approved_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.check_online()?;
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|_, request| {
            !(request.status == ApprovalStatus::Approved && request.expires_at < cutoff)
        });
        Ok(u64::try_from(before - requests.len()).unwrap_or(u64::MAX))
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl FakeAuditRepository {
    pub(crate) fn fail_appends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn hang_appends(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn actions(&self) -> Vec<AuditAction> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| entry.action)
            .collect()
    }

    pub(crate) async fn count(&self, action: AuditAction) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|entry| entry.action == action)
            .count()
    }

    pub(crate) async fn seed(&self, entry: AuditEntry) {
        self.entries.lock().await.push(entry);
    }
}

#[async_trait]
impl AuditLogRepository for FakeAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> AppResult<()> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("audit store offline".to_owned()));
        }
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        let entries = self.entries.lock().await;
        let mut matching: Vec<AuditEntry> = entries
            .iter()
            .filter(|entry| {
                query
                    .user_id
                    .as_deref()
                    .is_none_or(|user_id| entry.actor_user_id.as_deref() == Some(user_id))
                    && query.action.is_none_or(|action| entry.action == action)
                    && query.from.is_none_or(|from| entry.created_at >= from)
                    && query.to.is_none_or(|to| entry.created_at <= to)
            })
            .cloned()
            .collect();
        matching.sort_by(|left, right| right.created_at.cmp(&left.created_at));

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let data = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();

        Ok(AuditPage { data, total })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.created_at >= cutoff);
        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }
}

#[derive(Default)]
pub(crate) struct FakeGrantStore {
    values: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
}

impl FakeGrantStore {
    pub(crate) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn overwrite(&self, key: &str, value: &str) {
        self.values
            .lock()
            .await
            .insert(key.to_owned(), value.to_owned());
    }

    pub(crate) async fn keys(&self) -> Vec<String> {
        self.values.lock().await.keys().cloned().collect()
    }

    fn check_online(&self) -> AppResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("grant store offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantStore for FakeGrantStore {
    async fn put(&self, key: &str, value: &str, _ttl: Duration) -> AppResult<()> {
        self.check_online()?;
        self.values
            .lock()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check_online()?;
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        self.check_online()?;
        Ok(self.values.lock().await.remove(key).is_some())
    }
}

#[derive(Default)]
pub(crate) struct FakeSessionRepository {
    sessions: Mutex<HashMap<String, String>>,
}

impl FakeSessionRepository {
    pub(crate) async fn active_for(&self, user_id: &str) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|(_, owner)| owner.as_str() == user_id)
            .map(|(session_id, _)| session_id.clone())
            .collect();
        sessions.sort();
        sessions
    }
}

#[async_trait]
impl SessionRepository for FakeSessionRepository {
    async fn register_session(
        &self,
        session_id: &str,
        user_id: &str,
        _ttl: Duration,
    ) -> AppResult<()> {
        self.sessions
            .lock()
            .await
            .insert(session_id.to_owned(), user_id.to_owned());
        Ok(())
    }

    async fn revoke_session(&self, session_id: &str) -> AppResult<bool> {
        Ok(self.sessions.lock().await.remove(session_id).is_some())
    }

    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        keep_session_id: Option<&str>,
    ) -> AppResult<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|session_id, owner| {
            owner.as_str() != user_id || Some(session_id.as_str()) == keep_session_id
        });
        Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
    }
}
