//! Pipeline configuration loaded from the environment.

use std::str::FromStr;

use chrono::Duration;

use bastion_core::{AppError, AppResult};
use bastion_domain::RiskLevel;

use crate::audit_recorder::DEFAULT_AUDIT_APPEND_TIMEOUT;
use crate::policy_engine::PolicyRuleSet;
use crate::step_up_service::StepUpSettings;

/// Default approval deadline in hours.
pub const DEFAULT_APPROVAL_TTL_HOURS: u32 = 24;
/// Default step-up token lifetime in seconds.
pub const DEFAULT_STEP_UP_TTL_SECONDS: u32 = 600;
/// Default grace period a step-up grant outlives its token, in seconds.
pub const DEFAULT_STEP_UP_GRANT_BUFFER_SECONDS: u32 = 30;

/// Settings shared by every service in the authorization pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deadline for approving a pending request.
    pub approval_ttl: Duration,
    /// Step-up token signing and lifetime settings.
    pub step_up: StepUpSettings,
    /// Lowest policy risk that forces step-up on direct execution.
    pub step_up_min_risk: RiskLevel,
    /// Policy rules after merging deployment overrides.
    pub policy_rules: PolicyRuleSet,
    /// Upper bound on a single audit append.
    pub audit_append_timeout: std::time::Duration,
}

impl PipelineConfig {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let approval_ttl_hours = parse_positive(
            &lookup,
            "APPROVAL_TTL_HOURS",
            DEFAULT_APPROVAL_TTL_HOURS,
        )?;
        let step_up_ttl_seconds = parse_positive(
            &lookup,
            "STEP_UP_TTL_SECONDS",
            DEFAULT_STEP_UP_TTL_SECONDS,
        )?;
        let grant_buffer_seconds = parse_or(
            &lookup,
            "STEP_UP_GRANT_BUFFER_SECONDS",
            DEFAULT_STEP_UP_GRANT_BUFFER_SECONDS,
        )?;
        let step_up_min_risk = parse_or(&lookup, "STEP_UP_MIN_RISK", RiskLevel::Critical)?;
        let audit_append_timeout_ms = parse_or(
            &lookup,
            "AUDIT_APPEND_TIMEOUT_MS",
            u64::try_from(DEFAULT_AUDIT_APPEND_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        )?;
        if audit_append_timeout_ms == 0 {
            return Err(AppError::Validation(
                "AUDIT_APPEND_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }
        let secret = lookup("STEP_UP_SECRET")
            .ok_or_else(|| AppError::Validation("STEP_UP_SECRET is required".to_owned()))?;

        let step_up = StepUpSettings::new(
            secret.as_str(),
            Duration::seconds(i64::from(step_up_ttl_seconds)),
            Duration::seconds(i64::from(grant_buffer_seconds)),
        )?;

        let mut policy_rules = PolicyRuleSet::defaults()?;
        if let Some(overrides) = lookup("APPROVAL_POLICY_OVERRIDES")
            && !overrides.trim().is_empty()
        {
            policy_rules = policy_rules.with_overrides_json(overrides.as_str())?;
        }

        Ok(Self {
            approval_ttl: Duration::hours(i64::from(approval_ttl_hours)),
            step_up,
            step_up_min_risk,
            policy_rules,
            audit_append_timeout: std::time::Duration::from_millis(audit_append_timeout_ms),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_positive<F>(lookup: &F, name: &str, default: u32) -> AppResult<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, name, default)?;
    if value == 0 {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}
