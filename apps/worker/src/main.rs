//! Bastion retention worker.
//!
//! Runs the approval cleanup on a fixed interval and prunes audit entries
//! and session rows past their retention.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use bastion_application::{
    ApprovalService, AuditRecorder, DEFAULT_APPROVAL_TTL_HOURS, PolicyEngine, PolicyRuleSet,
};
use bastion_core::{AppError, AppResult};
use bastion_infrastructure::{
    PostgresApprovalRequestRepository, PostgresAuditLogRepository, PostgresSessionRepository,
};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    sweep_interval_seconds: u64,
    approval_retention_days: u16,
    audit_retention_days: u16,
    policy_overrides: Option<String>,
}

struct Sweeper {
    approvals: ApprovalService,
    audit: AuditRecorder,
    sessions: PostgresSessionRepository,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let sweeper = build_sweeper(pool, &config)?;

    info!(
        sweep_interval_seconds = config.sweep_interval_seconds,
        approval_retention_days = config.approval_retention_days,
        audit_retention_days = config.audit_retention_days,
        "bastion-worker started"
    );

    loop {
        sweeper.run_once(&config).await;
        tokio::time::sleep(Duration::from_secs(config.sweep_interval_seconds)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_sweeper(pool: PgPool, config: &WorkerConfig) -> AppResult<Sweeper> {
    let mut rules = PolicyRuleSet::defaults()?;
    if let Some(overrides) = config.policy_overrides.as_deref() {
        rules = rules.with_overrides_json(overrides)?;
    }

    let audit = AuditRecorder::new(Arc::new(PostgresAuditLogRepository::new(pool.clone())));
    let approvals = ApprovalService::new(
        Arc::new(PostgresApprovalRequestRepository::new(pool.clone())),
        PolicyEngine::new(rules),
        audit.clone(),
        chrono::Duration::hours(i64::from(DEFAULT_APPROVAL_TTL_HOURS)),
    );

    Ok(Sweeper {
        approvals,
        audit,
        sessions: PostgresSessionRepository::new(pool),
    })
}

impl Sweeper {
    async fn run_once(&self, config: &WorkerConfig) {
        match self.approvals.cleanup(config.approval_retention_days).await {
            Ok(report) => info!(
                deleted_count = report.deleted_count,
                expired_count = report.expired_count,
                "approval sweep finished"
            ),
            Err(error) => warn!(error = %error, "approval sweep failed"),
        }

        match self
            .audit
            .purge_older_than(config.audit_retention_days)
            .await
        {
            Ok(purged_count) => info!(purged_count, "audit retention sweep finished"),
            Err(error) => warn!(error = %error, "audit retention sweep failed"),
        }

        match self.sessions.purge_expired().await {
            Ok(purged_count) => info!(purged_count, "session sweep finished"),
            Err(error) => warn!(error = %error, "session sweep failed"),
        }
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let sweep_interval_seconds = parse_env("WORKER_SWEEP_INTERVAL_SECONDS", 300_u64)?;
        let approval_retention_days = parse_env("APPROVAL_RETENTION_DAYS", 30_u16)?;
        let audit_retention_days = parse_env("AUDIT_RETENTION_DAYS", 365_u16)?;
        let policy_overrides = env::var("APPROVAL_POLICY_OVERRIDES")
            .ok()
            .filter(|value| !value.trim().is_empty());

        if sweep_interval_seconds == 0 {
            return Err(AppError::Validation(
                "WORKER_SWEEP_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if approval_retention_days == 0 {
            return Err(AppError::Validation(
                "APPROVAL_RETENTION_DAYS must be greater than zero".to_owned(),
            ));
        }

        if audit_retention_days == 0 {
            return Err(AppError::Validation(
                "AUDIT_RETENTION_DAYS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            sweep_interval_seconds,
            approval_retention_days,
            audit_retention_days,
            policy_overrides,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env<T>(name: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
