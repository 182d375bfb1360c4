//! End-to-end authorization flows over the in-memory adapters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;

use bastion_application::{
    ActionExecutor, AuditQuery, AuthorizationPipeline, ExecutionOutcome, GateOutcome,
    PipelineConfig, PipelinePorts, PolicyReason, SessionRepository, StepUpRejection,
    StepUpValidation, TerminationScope,
};
use bastion_core::{AppError, AppResult, Role, UserIdentity};
use bastion_domain::{ApprovalOutcome, ApprovalStatus, AuditAction, RiskLevel, SensitiveAction};
use bastion_infrastructure::{
    InMemoryApprovalRequestRepository, InMemoryAuditLogRepository, InMemoryGrantStore,
    InMemorySessionRepository,
};

struct CountingExecutor;

#[async_trait]
impl ActionExecutor for CountingExecutor {
    async fn execute(
        &self,
        _actor: &UserIdentity,
        action: &SensitiveAction,
    ) -> AppResult<ExecutionOutcome> {
        Ok(ExecutionOutcome {
            success: true,
            summary: json!({"affected": action.target_ids.len()}),
        })
    }
}

struct Fixture {
    approvals: Arc<InMemoryApprovalRequestRepository>,
    sessions: Arc<InMemorySessionRepository>,
    pipeline: AuthorizationPipeline,
}

fn fixture(overrides: Option<&str>) -> Fixture {
    let mut vars = HashMap::from([(
        "STEP_UP_SECRET".to_owned(),
        "integration-secret-with-enough-entropy".to_owned(),
    )]);
    if let Some(overrides) = overrides {
        vars.insert("APPROVAL_POLICY_OVERRIDES".to_owned(), overrides.to_owned());
    }
    let config = match PipelineConfig::from_lookup(|name| vars.get(name).cloned()) {
        Ok(config) => config,
        Err(error) => panic!("invalid test config: {error}"),
    };

    let approvals = Arc::new(InMemoryApprovalRequestRepository::new());
    let sessions = Arc::new(InMemorySessionRepository::new());
    let pipeline = AuthorizationPipeline::build(
        &config,
        PipelinePorts {
            approvals: approvals.clone(),
            audit_log: Arc::new(InMemoryAuditLogRepository::new()),
            grants: Arc::new(InMemoryGrantStore::new()),
            sessions: sessions.clone(),
            executor: Arc::new(CountingExecutor),
        },
    );

    Fixture {
        approvals,
        sessions,
        pipeline,
    }
}

fn user(user_id: &str, role: Role) -> UserIdentity {
    UserIdentity::new(user_id, format!("{user_id}@example.com"), role, None)
}

fn delete_listings(target_ids: &[&str]) -> SensitiveAction {
    SensitiveAction {
        action_type: "delete".to_owned(),
        endpoint: "/admin/listings".to_owned(),
        method: "DELETE".to_owned(),
        target_ids: target_ids.iter().map(|id| (*id).to_owned()).collect(),
        payload: json!({}),
    }
}

async fn submit_for_approval(fixture: &Fixture, action: SensitiveAction) -> String {
    match fixture
        .pipeline
        .gate
        .submit(&user("editor-1", Role::Editor), action, None)
        .await
    {
        Ok(GateOutcome::PendingApproval(request)) => request.id,
        Ok(other) => panic!("expected pending approval, got {other:?}"),
        Err(error) => panic!("submit failed: {error}"),
    }
}

#[test]
fn disabled_delete_rule_never_requires_approval() {
    let fixture = fixture(Some(r#"{"delete": {"enabled": false}}"#));

    for role in [Role::Viewer, Role::Editor, Role::Admin, Role::SuperAdmin] {
        let decision = fixture.pipeline.policy_engine.evaluate(
            "delete",
            role,
            &["id1".to_owned(), "id2".to_owned()],
            &json!({"type": "announcement"}),
        );
        assert!(!decision.required);
        assert_eq!(decision.reason, PolicyReason::PolicyDisabled);
    }
}

#[test]
fn critical_delete_by_editor_requires_approval() {
    let fixture = fixture(None);

    let decision = fixture.pipeline.policy_engine.evaluate(
        "delete",
        Role::Editor,
        &["id1".to_owned()],
        &json!({}),
    );

    assert!(decision.required);
    assert_eq!(decision.risk, RiskLevel::Critical);
}

#[tokio::test]
async fn only_one_of_two_concurrent_decisions_wins() {
    let fixture = fixture(None);
    let id = submit_for_approval(&fixture, delete_listings(&["id1"])).await;
    let first_admin = user("admin-1", Role::Admin);
    let second_admin = user("admin-2", Role::SuperAdmin);

    let (approve, reject) = tokio::join!(
        fixture
            .pipeline
            .approvals
            .decide(id.as_str(), &first_admin, ApprovalOutcome::Approve),
        fixture
            .pipeline
            .approvals
            .decide(id.as_str(), &second_admin, ApprovalOutcome::Reject),
    );

    let (winner, loser) = match (approve, reject) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        _ => panic!("exactly one decision must win"),
    };
    assert_eq!(loser.code(), format!("invalid_status:{}", winner.status));
}

#[tokio::test]
async fn overdue_request_reads_as_expired_without_cleanup() {
    let fixture = fixture(None);
    let action = delete_listings(&["id1"]);
    let id = submit_for_approval(&fixture, action.clone()).await;
    assert!(
        fixture
            .approvals
            .update_stored(id.as_str(), |request| {
                request.expires_at = Utc::now() - Duration::minutes(1);
            })
            .await
    );

    let fetched = fixture.pipeline.approvals.get(id.as_str()).await;
    let check = fixture
        .pipeline
        .approvals
        .validate_for_execution(id.as_str(), &action)
        .await;

    assert_eq!(
        fetched.ok().flatten().map(|request| request.status),
        Some(ApprovalStatus::Expired)
    );
    let Ok(check) = check else {
        panic!("validation should not error");
    };
    assert_eq!(check.reason(), Some("invalid_status:expired"));
}

#[tokio::test]
async fn approval_only_covers_the_original_action() {
    let fixture = fixture(None);
    let action = delete_listings(&["id1", "id2"]);
    let id = submit_for_approval(&fixture, action.clone()).await;
    let decided = fixture
        .pipeline
        .approvals
        .decide(id.as_str(), &user("admin-1", Role::Admin), ApprovalOutcome::Approve)
        .await;
    assert!(decided.is_ok());

    let mut different_payload = action.clone();
    different_payload.payload = json!({"cascade": true});
    let mut different_method = action.clone();
    different_method.method = "POST".to_owned();

    for (candidate, reason) in [
        (different_payload, "payload_mismatch"),
        (different_method, "method_mismatch"),
    ] {
        let check = fixture
            .pipeline
            .approvals
            .validate_for_execution(id.as_str(), &candidate)
            .await;
        assert_eq!(check.ok().as_ref().and_then(|check| check.reason()), Some(reason));
    }

    let exact = fixture
        .pipeline
        .approvals
        .validate_for_execution(id.as_str(), &action)
        .await;
    assert!(exact.is_ok_and(|check| check.is_ok()));
}

#[tokio::test]
async fn step_up_lifecycle_matches_issue_validate_revoke() {
    let fixture = fixture(None);
    let admin = user("admin-1", Role::Admin);
    let Ok(issued) = fixture.pipeline.step_up.issue(&admin).await else {
        panic!("issue should succeed");
    };

    let valid = fixture
        .pipeline
        .step_up
        .validate(issued.token.as_str(), "admin-1")
        .await;
    let mismatch = fixture
        .pipeline
        .step_up
        .validate(issued.token.as_str(), "admin-2")
        .await;
    let revoked = fixture.pipeline.step_up.revoke(issued.jti.as_str()).await;
    let after_revoke = fixture
        .pipeline
        .step_up
        .validate(issued.token.as_str(), "admin-1")
        .await;

    assert!(valid.is_ok_and(|validation| validation.is_valid()));
    assert!(matches!(
        mismatch,
        Ok(StepUpValidation::Rejected(StepUpRejection::UserMismatch))
    ));
    assert!(matches!(revoked, Ok(true)));
    assert!(matches!(
        after_revoke,
        Ok(StepUpValidation::Rejected(StepUpRejection::Expired))
    ));
}

#[tokio::test]
async fn cleanup_is_idempotent_across_runs() {
    let fixture = fixture(None);
    let executed_action = delete_listings(&["old"]);
    let executed_id = submit_for_approval(&fixture, executed_action.clone()).await;
    let approver = user("admin-1", Role::Admin);
    assert!(
        fixture
            .pipeline
            .approvals
            .decide(executed_id.as_str(), &approver, ApprovalOutcome::Approve)
            .await
            .is_ok()
    );
    assert!(
        fixture
            .pipeline
            .approvals
            .mark_executed(executed_id.as_str(), json!({"success": true}))
            .await
            .is_ok()
    );
    let three_days_ago = Utc::now() - Duration::days(3);
    assert!(
        fixture
            .approvals
            .update_stored(executed_id.as_str(), |request| {
                request.requested_at = three_days_ago - Duration::hours(1);
                request.updated_at = three_days_ago;
            })
            .await
    );

    let pending_id = submit_for_approval(&fixture, delete_listings(&["stale"])).await;
    assert!(
        fixture
            .approvals
            .update_stored(pending_id.as_str(), |request| {
                request.expires_at = Utc::now() - Duration::minutes(5);
            })
            .await
    );

    let first = fixture.pipeline.approvals.cleanup(1).await;
    let second = fixture.pipeline.approvals.cleanup(1).await;

    let Ok(first) = first else {
        panic!("cleanup should succeed");
    };
    assert_eq!((first.deleted_count, first.expired_count), (1, 1));
    let Ok(second) = second else {
        panic!("second cleanup should succeed");
    };
    assert_eq!((second.deleted_count, second.expired_count), (0, 0));
    assert!(matches!(
        fixture.pipeline.approvals.get(executed_id.as_str()).await,
        Ok(None)
    ));
    assert_eq!(
        fixture
            .pipeline
            .approvals
            .get(pending_id.as_str())
            .await
            .ok()
            .flatten()
            .map(|request| request.status),
        Some(ApprovalStatus::Expired)
    );
}

#[tokio::test]
async fn requester_cannot_approve_their_own_request() {
    let fixture = fixture(None);
    let admin = user("admin-1", Role::Admin);
    let Ok(request) = fixture
        .pipeline
        .approvals
        .create(&admin, delete_listings(&["id1"]))
        .await
    else {
        panic!("create should succeed");
    };

    let result = fixture
        .pipeline
        .approvals
        .decide(request.id.as_str(), &admin, ApprovalOutcome::Approve)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn gate_runs_approved_delete_after_step_up_and_audits_trail() {
    let fixture = fixture(None);
    let editor = user("editor-1", Role::Editor);
    let action = delete_listings(&["id1"]);
    let id = submit_for_approval(&fixture, action.clone()).await;
    assert!(
        fixture
            .pipeline
            .approvals
            .decide(id.as_str(), &user("admin-1", Role::Admin), ApprovalOutcome::Approve)
            .await
            .is_ok()
    );
    let Ok(issued) = fixture.pipeline.step_up.issue(&editor).await else {
        panic!("issue should succeed");
    };

    let outcome = fixture
        .pipeline
        .gate
        .execute_approved(&editor, id.as_str(), &action, Some(issued.token.as_str()))
        .await;

    assert!(matches!(outcome, Ok(GateOutcome::Executed(_))));
    let trail = fixture
        .pipeline
        .audit
        .query(AuditQuery {
            action: Some(AuditAction::ApprovalExecuted),
            ..AuditQuery::default()
        })
        .await;
    let Ok(trail) = trail else {
        panic!("audit query should succeed");
    };
    assert_eq!(trail.total, 1);
    assert_eq!(trail.data[0].target_id.as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn other_sessions_are_terminated_but_current_is_kept() {
    let fixture = fixture(None);
    for session_id in ["s1", "s2", "s3"] {
        assert!(
            fixture
                .sessions
                .register_session(session_id, "admin-1", StdDuration::from_secs(600))
                .await
                .is_ok()
        );
    }

    let terminated = fixture
        .pipeline
        .sessions
        .terminate_others("admin-1", TerminationScope::KeepCurrent("s2".to_owned()))
        .await;
    let repeated = fixture.pipeline.sessions.terminate_by_id("s1").await;

    assert!(matches!(terminated, Ok(2)));
    assert!(matches!(repeated, Ok(false)));
    assert_eq!(
        fixture.sessions.active_sessions("admin-1").await,
        vec!["s2".to_owned()]
    );
}
