use std::str::FromStr;

use serde::Deserialize;

use deskhive_auth::Capabilities;
use deskhive_core::{CustomRoleId, OrgId, OrgProfile, OrgType, UserId};
use deskhive_infra::access::{
    AssignMember, CreateMember, CreateSubOrg, LoginRequest, RemoveMember, SignupRequest, UpsertRole,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------
//
// Required text fields default to empty so that a missing field reaches the
// engine's validation (400) instead of failing JSON extraction.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub org_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupBody {
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Profile fields keep their snake_case names on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubOrgBody {
    #[serde(default, alias = "parent_id")]
    pub parent_id: String,
    #[serde(default)]
    pub name: String,
    pub org_type: Option<String>,
    #[serde(flatten)]
    pub profile: OrgProfile,
}

/// Capability flags keep their `can_*` names on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRoleBody {
    pub id: Option<String>,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub capabilities: Capabilities,
}

/// Body of both `/users/assign` and `/users/update-role`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipBody {
    #[serde(default)]
    pub user_id: String,
    #[serde(default, alias = "toOrgId")]
    pub org_id: String,
    pub role: Option<String>,
    pub custom_role_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberBody {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub org_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub org_id: String,
    pub role: Option<String>,
    pub custom_role_id: Option<String>,
}

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgQuery {
    pub org_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub org_id: Option<String>,
    pub include_children: Option<String>,
}

impl ListUsersQuery {
    pub fn include_children(&self) -> bool {
        matches!(self.include_children.as_deref().map(str::trim), Some("1" | "true"))
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T: FromStr>(raw: &str, field: &str) -> Result<T, axum::response::Response> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(errors::bad_request(format!("{field} is required")));
    }
    raw.parse()
        .map_err(|_| errors::bad_request(format!("{field} is not a valid id")))
}

pub fn parse_opt_id<T: FromStr>(raw: Option<&str>, field: &str) -> Result<Option<T>, axum::response::Response> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_id(raw, field).map(Some),
    }
}

impl LoginBody {
    pub fn into_request(self) -> Result<LoginRequest, axum::response::Response> {
        Ok(LoginRequest {
            org_id: parse_opt_id::<OrgId>(self.org_id.as_deref(), "orgId")?,
            email: self.email,
            password: self.password,
        })
    }
}

impl From<SignupBody> for SignupRequest {
    fn from(body: SignupBody) -> Self {
        SignupRequest {
            organization_name: body.organization_name,
            name: body.name,
            email: body.email,
            password: body.password,
        }
    }
}

impl CreateSubOrgBody {
    pub fn into_request(self) -> Result<CreateSubOrg, axum::response::Response> {
        let org_type = match self.org_type.as_deref() {
            None => OrgType::default(),
            Some(raw) => OrgType::parse(raw).map_err(|e| errors::bad_request(e.to_string()))?,
        };
        Ok(CreateSubOrg {
            parent_id: parse_id(&self.parent_id, "parentId")?,
            name: self.name,
            org_type,
            profile: self.profile,
        })
    }
}

impl UpsertRoleBody {
    pub fn into_request(self) -> Result<UpsertRole, axum::response::Response> {
        Ok(UpsertRole {
            id: parse_opt_id::<CustomRoleId>(self.id.as_deref(), "id")?,
            org_id: parse_id(&self.org_id, "orgId")?,
            name: self.name,
            capabilities: self.capabilities,
        })
    }
}

impl MembershipBody {
    pub fn into_request(self) -> Result<AssignMember, axum::response::Response> {
        Ok(AssignMember {
            user_id: parse_id::<UserId>(&self.user_id, "userId")?,
            org_id: parse_id(&self.org_id, "orgId")?,
            role: self.role,
            custom_role_id: parse_opt_id(self.custom_role_id.as_deref(), "customRoleId")?,
        })
    }
}

impl RemoveMemberBody {
    pub fn into_request(self) -> Result<RemoveMember, axum::response::Response> {
        Ok(RemoveMember {
            user_id: parse_id(&self.user_id, "userId")?,
            org_id: parse_id(&self.org_id, "orgId")?,
        })
    }
}

impl CreateUserBody {
    pub fn into_request(self) -> Result<CreateMember, axum::response::Response> {
        Ok(CreateMember {
            org_id: parse_id(&self.org_id, "orgId")?,
            custom_role_id: parse_opt_id(self.custom_role_id.as_deref(), "customRoleId")?,
            name: self.name,
            email: self.email,
            role: self.role,
        })
    }
}
