//! Role registry: built-in names plus per-organization custom roles.

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use deskhive_auth::{BUILTIN_ROLE_NAMES, Capabilities, Capability, CustomRole, Principal, ensure_grantable, normalize_role_name};
use deskhive_core::{CustomRoleId, OrgId};

use super::AccessEngine;
use crate::error::{AccessError, AccessResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCatalog {
    pub org_id: OrgId,
    pub builtin: Vec<&'static str>,
    /// Ordered by name.
    pub custom: Vec<CustomRole>,
}

/// Create (no `id`) or update (with `id`) a custom role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRole {
    pub id: Option<CustomRoleId>,
    pub org_id: OrgId,
    pub name: String,
    pub capabilities: Capabilities,
}

impl AccessEngine {
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn list_roles(&self, principal: &Principal, org_id: OrgId) -> AccessResult<RoleCatalog> {
        self.ensure_allowed(principal, org_id).await?;
        Ok(RoleCatalog {
            org_id,
            builtin: BUILTIN_ROLE_NAMES.to_vec(),
            custom: self.store.custom_roles_for_org(org_id).await?,
        })
    }

    /// Requires `can_create_roles`; the flags handed out, and on update the
    /// flags being replaced, must all be held by the caller. Name collisions
    /// within the organization are `Conflict`.
    #[instrument(skip(self, principal, req), fields(user_id = %principal.user_id, org_id = %req.org_id))]
    pub async fn upsert_role(&self, principal: &Principal, req: UpsertRole) -> AccessResult<CustomRole> {
        self.authorize_in(principal, req.org_id, Capability::CreateRoles).await?;
        ensure_grantable(principal, &req.capabilities)?;

        let now = Utc::now();
        let role = match req.id {
            None => {
                let role = CustomRole::new(req.org_id, &req.name, req.capabilities, now)?;
                self.store.insert_custom_role(&role).await?;
                tracing::info!(role_id = %role.id, "custom role created");
                role
            }
            Some(id) => {
                let existing = self
                    .store
                    .get_custom_role(id)
                    .await?
                    .filter(|r| r.org_id == req.org_id)
                    .ok_or_else(|| AccessError::not_found(format!("custom role {id}")))?;
                // Rewriting a role changes every holder; the caller must hold what it had.
                ensure_grantable(principal, &existing.capabilities)?;
                let role = CustomRole {
                    name: normalize_role_name(&req.name)?,
                    capabilities: req.capabilities,
                    updated_at: now,
                    ..existing
                };
                self.store.update_custom_role(&role).await?;
                tracing::info!(role_id = %role.id, "custom role updated");
                role
            }
        };
        Ok(role)
    }
}
