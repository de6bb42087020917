use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::McpError;

/// Fine-grained privileges checked by tools, routes and the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    EditContent,
    PublishContent,
    DeleteContent,
    ManageUsers,
    /// Highest administrative privilege level.
    ManageSettings,
}

/// Roles assigned to directory users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Author,
    Subscriber,
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &[
                Read,
                EditContent,
                PublishContent,
                DeleteContent,
                ManageUsers,
                ManageSettings,
            ],
            Role::Editor => &[Read, EditContent, PublishContent, DeleteContent],
            Role::Author => &[Read, EditContent, PublishContent],
            Role::Subscriber => &[Read],
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" | "administrator" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "author" => Ok(Role::Author),
            "subscriber" | "viewer" => Ok(Role::Subscriber),
            other => anyhow::bail!("unknown role '{}'", other),
        }
    }
}

/// The authenticated identity behind a request, with its resolved privileges.
///
/// Resolved once by the authentication gate and passed explicitly to every
/// component that needs to make an access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: u64,
    pub login: String,
    pub display_name: String,
    pub role: Role,
    capabilities: HashSet<Capability>,
}

impl Principal {
    pub fn new(id: u64, login: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            login: login.into(),
            display_name: display_name.into(),
            role,
            capabilities: role.capabilities().iter().copied().collect(),
        }
    }

    pub fn can(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn is_admin(&self) -> bool {
        self.can(Capability::ManageSettings)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }
}

/// Reject with `rest_forbidden` unless the principal holds `cap`.
pub fn require(principal: &Principal, cap: Capability) -> Result<(), McpError> {
    if principal.can(cap) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = principal.id,
            required = ?cap,
            "capability check failed"
        );
        Err(McpError::Forbidden(
            "Sorry, you are not allowed to do that.".to_string(),
        ))
    }
}
