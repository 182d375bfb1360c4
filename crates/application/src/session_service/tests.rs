use std::sync::Arc;
use std::time::Duration;

use bastion_core::{AppError, Role};
use bastion_domain::AuditAction;

use crate::audit_recorder::AuditRecorder;
use crate::session_ports::SessionRepository;
use crate::step_up_service::{StepUpService, StepUpSettings};
use crate::test_support::{
    FakeAuditRepository, FakeGrantStore, FakeSessionRepository, TEST_SECRET, identity,
};

use super::{SessionService, TerminationScope};

struct Harness {
    sessions: Arc<FakeSessionRepository>,
    audit: Arc<FakeAuditRepository>,
    step_up: StepUpService,
    service: SessionService,
}

async fn harness() -> Harness {
    let sessions = Arc::new(FakeSessionRepository::default());
    let audit = Arc::new(FakeAuditRepository::default());
    let recorder = AuditRecorder::new(audit.clone());
    let Ok(settings) = StepUpSettings::new(
        TEST_SECRET,
        chrono::Duration::minutes(10),
        chrono::Duration::seconds(30),
    ) else {
        panic!("test settings must be valid");
    };
    let step_up = StepUpService::new(
        Arc::new(FakeGrantStore::default()),
        recorder.clone(),
        settings,
    );
    let service = SessionService::new(sessions.clone(), step_up.clone(), recorder);

    for (session_id, user_id) in [
        ("alice-laptop", "alice"),
        ("alice-phone", "alice"),
        ("alice-tablet", "alice"),
        ("bob-laptop", "bob"),
    ] {
        if let Err(error) = sessions
            .register_session(session_id, user_id, Duration::from_secs(3600))
            .await
        {
            panic!("failed to register session: {error}");
        }
    }

    Harness {
        sessions,
        audit,
        step_up,
        service,
    }
}

#[tokio::test]
async fn terminate_by_id_is_idempotent() {
    let harness = harness().await;

    let first = harness.service.terminate_by_id("alice-phone").await;
    let second = harness.service.terminate_by_id("alice-phone").await;
    let unknown = harness.service.terminate_by_id("nobody").await;

    assert!(matches!(first, Ok(true)));
    assert!(matches!(second, Ok(false)));
    assert!(matches!(unknown, Ok(false)));
    assert_eq!(harness.audit.count(AuditAction::SessionTerminated).await, 1);
}

#[tokio::test]
async fn terminate_others_keeps_current_session() {
    let harness = harness().await;

    let result = harness
        .service
        .terminate_others(
            "alice",
            TerminationScope::KeepCurrent("alice-laptop".to_owned()),
        )
        .await;

    assert!(matches!(result, Ok(2)));
    assert_eq!(
        harness.sessions.active_for("alice").await,
        vec!["alice-laptop".to_owned()]
    );
    assert_eq!(
        harness.sessions.active_for("bob").await,
        vec!["bob-laptop".to_owned()]
    );
    assert_eq!(harness.audit.count(AuditAction::SessionsTerminated).await, 1);
}

#[tokio::test]
async fn blank_current_session_is_rejected() {
    let harness = harness().await;

    let result = harness
        .service
        .terminate_others("alice", TerminationScope::KeepCurrent("  ".to_owned()))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(harness.sessions.active_for("alice").await.len(), 3);
}

#[tokio::test]
async fn terminate_all_requires_step_up_for_same_user() {
    let harness = harness().await;
    let Ok(bob_token) = harness.step_up.issue(&identity("bob", Role::Admin)).await else {
        panic!("failed to issue step-up token");
    };

    let foreign = harness
        .service
        .terminate_others(
            "alice",
            TerminationScope::AllAfterStepUp(bob_token.token.clone()),
        )
        .await;
    let invalid = harness
        .service
        .terminate_others(
            "alice",
            TerminationScope::AllAfterStepUp("garbage".to_owned()),
        )
        .await;

    assert!(matches!(foreign, Err(AppError::StepUpUserMismatch)));
    assert!(matches!(invalid, Err(AppError::InvalidStepUpToken)));
    assert_eq!(harness.sessions.active_for("alice").await.len(), 3);
}

#[tokio::test]
async fn terminate_all_after_step_up_ends_every_session() {
    let harness = harness().await;
    let Ok(token) = harness.step_up.issue(&identity("alice", Role::Admin)).await else {
        panic!("failed to issue step-up token");
    };

    let result = harness
        .service
        .terminate_others("alice", TerminationScope::AllAfterStepUp(token.token))
        .await;

    assert!(matches!(result, Ok(3)));
    assert!(harness.sessions.active_for("alice").await.is_empty());
    assert_eq!(harness.sessions.active_for("bob").await.len(), 1);
}
