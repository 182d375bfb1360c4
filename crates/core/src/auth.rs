use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Administrative role asserted by the upstream authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unrestricted platform operator.
    SuperAdmin,
    /// Content administrator.
    Admin,
    /// Content author.
    Editor,
    /// Read-only user.
    Viewer,
}

impl Role {
    /// Returns a stable storage value for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    /// Returns whether the role may approve or reject pending requests.
    #[must_use]
    pub fn can_decide_approvals(&self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            _ => Err(AppError::Validation(format!("unknown role '{value}'"))),
        }
    }
}

/// Identity assertion produced by the authentication layer for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    user_id: String,
    email: String,
    role: Role,
    session_id: Option<String>,
}

impl UserIdentity {
    /// Creates an identity assertion from authenticated user data.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        session_id: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            role,
            session_id,
        }
    }

    /// Returns the stable user identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        self.user_id.as_str()
    }

    /// Returns the user's email address.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the asserted role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the authenticated session, when the transport carried one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}
