use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use deskhive_core::{CustomRoleId, DomainError, OrgId};

use crate::Capabilities;

/// Names of the built-in roles, in display order.
pub const BUILTIN_ROLE_NAMES: [&str; 4] = ["MANAGER", "DEVELOPER", "TESTER", "VIEWER"];

/// Built-in membership role.
///
/// `Manager` is the single owner tier; the other three share one fixed,
/// non-configurable fallback capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuiltinRole {
    Manager,
    Developer,
    Tester,
    #[default]
    Viewer,
}

impl BuiltinRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinRole::Manager => "MANAGER",
            BuiltinRole::Developer => "DEVELOPER",
            BuiltinRole::Tester => "TESTER",
            BuiltinRole::Viewer => "VIEWER",
        }
    }

    /// The fixed capability table for built-in roles.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            BuiltinRole::Manager => Capabilities::all(),
            BuiltinRole::Developer | BuiltinRole::Tester | BuiltinRole::Viewer => {
                Capabilities::view_only()
            }
        }
    }
}

impl core::fmt::Display for BuiltinRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MANAGER" => Ok(BuiltinRole::Manager),
            "DEVELOPER" => Ok(BuiltinRole::Developer),
            "TESTER" => Ok(BuiltinRole::Tester),
            "VIEWER" => Ok(BuiltinRole::Viewer),
            other => Err(DomainError::validation(format!(
                "unknown role '{other}' (expected one of {})",
                BUILTIN_ROLE_NAMES.join(", ")
            ))),
        }
    }
}

/// An organization-scoped role definition with explicit capability flags.
///
/// Names are unique within `org_id` (enforced by the store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRole {
    pub id: CustomRoleId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomRole {
    pub fn new(org_id: OrgId, name: &str, capabilities: Capabilities, now: DateTime<Utc>) -> Result<Self, DomainError> {
        Ok(Self {
            id: CustomRoleId::new(),
            org_id,
            name: normalize_role_name(name)?,
            capabilities,
            created_at: now,
            updated_at: now,
        })
    }
}

pub fn normalize_role_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("role name is required"));
    }
    Ok(name.to_string())
}
