//! Approval policy vocabulary.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bastion_core::{AppError, AppResult, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Privileged content operations guarded by approval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Publishes one content item.
    Publish,
    /// Publishes several content items in one request.
    BulkPublish,
    /// Deletes content items.
    Delete,
}

impl ActionType {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::BulkPublish => "bulk_publish",
            Self::Delete => "delete",
        }
    }

    /// Returns all known action types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ActionType] = &[
            ActionType::Publish,
            ActionType::BulkPublish,
            ActionType::Delete,
        ];

        ALL
    }
}

impl Display for ActionType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "publish" => Ok(Self::Publish),
            "bulk_publish" => Ok(Self::BulkPublish),
            "delete" => Ok(Self::Delete),
            _ => Err(AppError::Validation(format!(
                "unknown action type '{value}'"
            ))),
        }
    }
}

/// Content kinds a policy rule can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Marketplace listing.
    Listing,
    /// Broadcast announcement.
    Announcement,
}

impl ContentType {
    /// Returns a stable storage value for this content type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Announcement => "announcement",
        }
    }

    /// Collects content types declared by a request payload.
    ///
    /// Reads a direct `type` string and a `types` string list. Unknown values
    /// are ignored.
    #[must_use]
    pub fn from_payload(payload: &Value) -> BTreeSet<Self> {
        let mut content_types = BTreeSet::new();

        if let Some(value) = payload.get("type").and_then(Value::as_str)
            && let Ok(content_type) = Self::from_str(value)
        {
            content_types.insert(content_type);
        }

        if let Some(values) = payload.get("types").and_then(Value::as_array) {
            content_types.extend(
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|value| Self::from_str(value).ok()),
            );
        }

        content_types
    }
}

impl FromStr for ContentType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "listing" => Ok(Self::Listing),
            "announcement" => Ok(Self::Announcement),
            _ => Err(AppError::Validation(format!(
                "unknown content type '{value}'"
            ))),
        }
    }
}

/// Risk classification attached to a policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Routine change.
    Low,
    /// Visible change with limited blast radius.
    Medium,
    /// Change affecting many users or items.
    High,
    /// Destructive or irreversible change.
    Critical,
}

impl RiskLevel {
    /// Returns a stable storage value for this risk level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(AppError::Validation(format!("unknown risk level '{value}'"))),
        }
    }
}

/// Approval rule for one action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    action_type: ActionType,
    enabled: bool,
    risk: RiskLevel,
    bypass_roles: BTreeSet<Role>,
    min_targets: usize,
    content_types: Option<BTreeSet<ContentType>>,
}

impl PolicyRule {
    /// Creates a validated policy rule.
    pub fn new(
        action_type: ActionType,
        enabled: bool,
        risk: RiskLevel,
        bypass_roles: BTreeSet<Role>,
        min_targets: usize,
        content_types: Option<BTreeSet<ContentType>>,
    ) -> AppResult<Self> {
        if min_targets == 0 {
            return Err(AppError::Validation(format!(
                "policy rule '{}' min_targets must be at least 1",
                action_type.as_str()
            )));
        }

        if content_types
            .as_ref()
            .is_some_and(|content_types| content_types.is_empty())
        {
            return Err(AppError::Validation(format!(
                "policy rule '{}' content_types must not be empty when present",
                action_type.as_str()
            )));
        }

        Ok(Self {
            action_type,
            enabled,
            risk,
            bypass_roles,
            min_targets,
            content_types,
        })
    }

    /// Returns the guarded action type.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// Returns whether the rule is active.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the configured risk level.
    #[must_use]
    pub fn risk(&self) -> RiskLevel {
        self.risk
    }

    /// Returns roles exempt from approval and from dual control.
    #[must_use]
    pub fn bypass_roles(&self) -> &BTreeSet<Role> {
        &self.bypass_roles
    }

    /// Returns the minimum target count that triggers the rule.
    #[must_use]
    pub fn min_targets(&self) -> usize {
        self.min_targets
    }

    /// Returns the content types the rule is scoped to, if any.
    #[must_use]
    pub fn content_types(&self) -> Option<&BTreeSet<ContentType>> {
        self.content_types.as_ref()
    }

    /// Returns whether the role is exempt from this rule.
    #[must_use]
    pub fn bypasses(&self, role: Role) -> bool {
        self.bypass_roles.contains(&role)
    }
}
