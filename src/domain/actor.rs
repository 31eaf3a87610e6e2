//! Actors and workflow roles

use std::fmt;

use serde::{Deserialize, Serialize};

pub const ROLE_SYSTEM: &str = "SYSTEM";
pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_OP_MANAGER: &str = "OP_MANAGER";
pub const ROLE_RISK_MANAGER: &str = "RISK_MANAGER";
pub const ROLE_FINANCE: &str = "FINANCE";
pub const ROLE_INVESTOR: &str = "INVESTOR";
pub const ROLE_LEGAL: &str = "LEGAL";
pub const ROLE_ACCOUNTING: &str = "ACCOUNTING";

/// Workflow role code, normalized to upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn system() -> Self {
        Self(ROLE_SYSTEM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_system(&self) -> bool {
        self.0 == ROLE_SYSTEM
    }

    /// Roles allowed to override task assignment
    pub fn is_elevated(&self) -> bool {
        self.0 == ROLE_ADMIN || self.0 == ROLE_OP_MANAGER
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.0
    }
}

/// The caller on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<String>,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(user_id: Option<String>, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user(user_id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self::new(Some(user_id.into()), roles)
    }

    /// Actor used for inbound integrations and automatic transitions
    pub fn system() -> Self {
        Self::new(None, vec![Role::system()])
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_system(&self) -> bool {
        self.roles.iter().any(Role::is_system)
    }

    pub fn is_elevated(&self) -> bool {
        self.roles.iter().any(Role::is_elevated)
    }

    /// First elevated role the actor holds, if any
    pub fn elevated_role(&self) -> Option<&Role> {
        self.roles.iter().find(|r| r.is_elevated())
    }

    pub fn role_codes(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }
}
