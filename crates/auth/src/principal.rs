use serde::{Deserialize, Serialize};

use deskhive_core::{CustomRoleId, OrgId, UserId};

use crate::{BuiltinRole, CustomRole};

/// A user's membership in one organization (unique per user × org).
///
/// The built-in `role` column is always populated. When `custom_role_id` is set
/// the custom role is authoritative and `role` is kept for storage
/// compatibility only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMembership {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub role: BuiltinRole,
    pub custom_role_id: Option<CustomRoleId>,
}

/// Which role source governs a membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleType {
    Builtin,
    Custom,
}

impl OrgMembership {
    pub fn builtin(user_id: UserId, org_id: OrgId, role: BuiltinRole) -> Self {
        Self {
            user_id,
            org_id,
            role,
            custom_role_id: None,
        }
    }

    /// Membership governed by `custom_role`; the stored built-in column is `VIEWER`.
    pub fn custom(user_id: UserId, org_id: OrgId, custom_role: &CustomRole) -> Self {
        Self {
            user_id,
            org_id,
            role: BuiltinRole::Viewer,
            custom_role_id: Some(custom_role.id),
        }
    }

    pub fn role_type(&self) -> RoleType {
        if self.custom_role_id.is_some() {
            RoleType::Custom
        } else {
            RoleType::Builtin
        }
    }

    /// Display label: the custom role's name when it resolves, else the built-in name.
    pub fn role_label(&self, custom_role: Option<&CustomRole>) -> String {
        match (self.custom_role_id, custom_role) {
            (Some(id), Some(role)) if role.id == id => role.name.clone(),
            _ => self.role.as_str().to_string(),
        }
    }
}
