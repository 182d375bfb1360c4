//! Approval policy evaluation.
//!
//! Rules are data: a map from action type to [`PolicyRule`], built once at
//! startup from defaults merged with deployment overrides and never mutated
//! afterwards.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use bastion_core::{AppError, AppResult, Role};
use bastion_domain::{ActionType, ContentType, PolicyRule, RiskLevel};


/// Why the engine reached its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyReason {
    /// No rule is registered for the action type.
    PolicyNotFound,
    /// The rule exists but is switched off.
    PolicyDisabled,
    /// The actor's role is exempt.
    RoleBypassed,
    /// Too few targets to trigger the rule.
    TargetThresholdNotMet,
    /// The payload's content types are outside the rule's scope.
    ContentTypeNotMatched,
    /// Every check passed; a second approver is needed.
    ApprovalRequired,
}

impl PolicyReason {
    /// Returns a stable storage value for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyNotFound => "policy_not_found",
            Self::PolicyDisabled => "policy_disabled",
            Self::RoleBypassed => "role_bypassed",
            Self::TargetThresholdNotMet => "target_threshold_not_met",
            Self::ContentTypeNotMatched => "content_type_not_matched",
            Self::ApprovalRequired => "approval_required",
        }
    }
}

/// Result of evaluating one request against the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Whether a second approver is required.
    pub required: bool,
    /// Risk of the matched rule, `Low` when no rule exists.
    pub risk: RiskLevel,
    /// Short-circuit reason.
    pub reason: PolicyReason,
}

impl PolicyDecision {
    fn not_required(risk: RiskLevel, reason: PolicyReason) -> Self {
        Self {
            required: false,
            risk,
            reason,
        }
    }
}

/// Partial rule used to override a default from deployment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRuleOverride {
    /// Replaces `enabled`.
    pub enabled: Option<bool>,
    /// Replaces `risk`.
    pub risk: Option<RiskLevel>,
    /// Replaces the bypass role set.
    pub bypass_roles: Option<BTreeSet<Role>>,
    /// Replaces `min_targets`.
    pub min_targets: Option<usize>,
    /// Replaces the content type scope; an empty list removes the scope.
    pub content_types: Option<BTreeSet<ContentType>>,
}

/// Immutable map from action type to its approval rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRuleSet {
    rules: HashMap<ActionType, PolicyRule>,
}

impl PolicyRuleSet {
    /// Returns a rule set with no registered rules.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the built-in rule matrix.
    pub fn defaults() -> AppResult<Self> {
        let super_admin_only = BTreeSet::from([Role::SuperAdmin]);

        Ok(Self::empty()
            .with_rule(PolicyRule::new(
                ActionType::Publish,
                true,
                RiskLevel::Medium,
                super_admin_only.clone(),
                1,
                Some(BTreeSet::from([ContentType::Announcement])),
            )?)
            .with_rule(PolicyRule::new(
                ActionType::BulkPublish,
                true,
                RiskLevel::High,
                super_admin_only,
                2,
                None,
            )?)
            .with_rule(PolicyRule::new(
                ActionType::Delete,
                true,
                RiskLevel::Critical,
                BTreeSet::new(),
                1,
                None,
            )?))
    }

    /// Registers or replaces the rule for its action type.
    #[must_use]
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.insert(rule.action_type(), rule);
        self
    }

    /// Merges partial overrides keyed by action type storage value.
    pub fn with_overrides(
        mut self,
        overrides: HashMap<String, PolicyRuleOverride>,
    ) -> AppResult<Self> {
        for (action_key, rule_override) in overrides {
            let action_type = ActionType::from_str(action_key.as_str())?;
            let base = self.rules.get(&action_type).ok_or_else(|| {
                AppError::Validation(format!(
                    "policy override for '{action_key}' has no base rule"
                ))
            })?;

            let content_types = match rule_override.content_types {
                Some(content_types) if content_types.is_empty() => None,
                Some(content_types) => Some(content_types),
                None => base.content_types().cloned(),
            };

            let merged = PolicyRule::new(
                action_type,
                rule_override.enabled.unwrap_or(base.enabled()),
                rule_override.risk.unwrap_or(base.risk()),
                rule_override
                    .bypass_roles
                    .unwrap_or_else(|| base.bypass_roles().clone()),
                rule_override.min_targets.unwrap_or(base.min_targets()),
                content_types,
            )?;

            self.rules.insert(action_type, merged);
        }

        Ok(self)
    }

    /// Parses a JSON object of overrides and merges it.
    pub fn with_overrides_json(self, raw: &str) -> AppResult<Self> {
        let overrides: HashMap<String, PolicyRuleOverride> = serde_json::from_str(raw)
            .map_err(|error| AppError::Validation(format!("invalid policy overrides: {error}")))?;

        self.with_overrides(overrides)
    }

    /// Returns the rule registered for the action type.
    #[must_use]
    pub fn get(&self, action_type: ActionType) -> Option<&PolicyRule> {
        self.rules.get(&action_type)
    }
}

/// Pure decision function over an immutable rule set.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    rules: Arc<PolicyRuleSet>,
}

impl PolicyEngine {
    /// Creates an engine over a loaded rule set.
    #[must_use]
    pub fn new(rules: PolicyRuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Returns the rule registered for the action type.
    #[must_use]
    pub fn rule(&self, action_type: ActionType) -> Option<&PolicyRule> {
        self.rules.get(action_type)
    }

    /// Returns whether the role is exempt from the action's rule.
    #[must_use]
    pub fn bypasses(&self, action_type: ActionType, role: Role) -> bool {
        self.rule(action_type)
            .is_some_and(|rule| rule.bypasses(role))
    }

    /// Decides whether a request needs a second approver.
    ///
    /// Checks run in order and the first match wins. Unknown action types
    /// fail open.
    #[must_use]
    pub fn evaluate(
        &self,
        action_type: &str,
        actor_role: Role,
        target_ids: &[String],
        payload: &Value,
    ) -> PolicyDecision {
        let Some(rule) = ActionType::from_str(action_type)
            .ok()
            .and_then(|action_type| self.rule(action_type))
        else {
            return PolicyDecision::not_required(RiskLevel::Low, PolicyReason::PolicyNotFound);
        };

        if !rule.enabled() {
            return PolicyDecision::not_required(rule.risk(), PolicyReason::PolicyDisabled);
        }

        if rule.bypasses(actor_role) {
            return PolicyDecision::not_required(rule.risk(), PolicyReason::RoleBypassed);
        }

        if target_ids.len() < rule.min_targets() {
            return PolicyDecision::not_required(rule.risk(), PolicyReason::TargetThresholdNotMet);
        }

        if let Some(scoped_types) = rule.content_types() {
            let payload_types = ContentType::from_payload(payload);
            if payload_types.is_disjoint(scoped_types) {
                return PolicyDecision::not_required(
                    rule.risk(),
                    PolicyReason::ContentTypeNotMatched,
                );
            }
        }

        PolicyDecision {
            required: true,
            risk: rule.risk(),
            reason: PolicyReason::ApprovalRequired,
        }
    }
}
