//! Organization and membership operations behind the scope and capability checks.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use deskhive_auth::{
    BuiltinRole, Capabilities, Capability, CustomRole, OrgMembership, Principal, RoleType, derive_capabilities,
    ensure_grantable, generate_password,
};
use deskhive_core::{CustomRoleId, OrgId, OrgProfile, OrgType, Organization, User, UserId, normalize_email};

use super::AccessEngine;
use crate::error::{AccessError, AccessResult};
use crate::notify::Notice;
use crate::store::Member;

const GENERATED_PASSWORD_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrgChildren {
    pub parent: Organization,
    pub children: Vec<Organization>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubOrg {
    pub parent_id: OrgId,
    pub name: String,
    pub org_type: OrgType,
    pub profile: OrgProfile,
}

/// Add (or replace) a user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignMember {
    pub user_id: UserId,
    pub org_id: OrgId,
    /// Built-in role name; `None` means VIEWER. Ignored when `custom_role_id` is set.
    pub role: Option<String>,
    pub custom_role_id: Option<CustomRoleId>,
}

/// Change the role of an existing membership.
pub type UpdateMemberRole = AssignMember;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveMember {
    pub user_id: UserId,
    pub org_id: OrgId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMember {
    pub name: String,
    pub email: String,
    pub org_id: OrgId,
    pub role: Option<String>,
    pub custom_role_id: Option<CustomRoleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub org_id: OrgId,
    pub org_name: String,
    pub role: BuiltinRole,
    pub role_type: RoleType,
    pub custom_role_id: Option<CustomRoleId>,
    pub role_label: String,
    pub capabilities: Capabilities,
}

impl MemberView {
    fn new(user: &User, org: &Organization, membership: &OrgMembership, custom_role: Option<&CustomRole>) -> Self {
        Self {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            org_id: org.id,
            org_name: org.name.clone(),
            role: membership.role,
            role_type: membership.role_type(),
            custom_role_id: membership.custom_role_id,
            role_label: membership.role_label(custom_role),
            capabilities: derive_capabilities(membership, custom_role),
        }
    }
}

/// The role a granter asked for, resolved against the target organization.
struct RoleGrant {
    builtin: BuiltinRole,
    custom: Option<CustomRole>,
}

impl RoleGrant {
    fn capabilities(&self) -> Capabilities {
        match &self.custom {
            Some(role) => role.capabilities,
            None => self.builtin.capabilities(),
        }
    }

    fn membership(&self, user_id: UserId, org_id: OrgId) -> OrgMembership {
        match &self.custom {
            Some(role) => OrgMembership::custom(user_id, org_id, role),
            None => OrgMembership::builtin(user_id, org_id, self.builtin),
        }
    }
}

impl AccessEngine {
    async fn org(&self, id: OrgId) -> AccessResult<Organization> {
        self.store
            .get_org(id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("organization {id}")))
    }

    /// Resolve the requested role and apply the least-privilege rule.
    async fn role_grant(
        &self,
        principal: &Principal,
        org_id: OrgId,
        role: Option<&str>,
        custom_role_id: Option<CustomRoleId>,
    ) -> AccessResult<RoleGrant> {
        let grant = match custom_role_id {
            Some(id) => {
                let custom = self
                    .store
                    .get_custom_role(id)
                    .await?
                    .filter(|r| r.org_id == org_id)
                    .ok_or_else(|| AccessError::validation("custom role does not belong to this organization"))?;
                RoleGrant {
                    builtin: BuiltinRole::Viewer,
                    custom: Some(custom),
                }
            }
            None => {
                let builtin = match role.map(str::trim).filter(|r| !r.is_empty()) {
                    Some(name) => name.parse::<BuiltinRole>()?,
                    None => BuiltinRole::default(),
                };
                RoleGrant { builtin, custom: None }
            }
        };
        ensure_grantable(principal, &grant.capabilities())?;
        Ok(grant)
    }

    /// The membership being overwritten or removed must not carry capabilities
    /// the caller lacks.
    async fn ensure_replaceable(
        &self,
        principal: &Principal,
        user_id: UserId,
        org_id: OrgId,
    ) -> AccessResult<Option<OrgMembership>> {
        let Some(current) = self.store.get_membership(user_id, org_id).await? else {
            return Ok(None);
        };
        let custom = self.custom_role_for(&current).await?;
        ensure_grantable(principal, &derive_capabilities(&current, custom.as_ref()))?;
        Ok(Some(current))
    }

    /// Load names and custom roles for raw membership rows.
    async fn member_views(&self, members: Vec<Member>) -> AccessResult<Vec<MemberView>> {
        let org_ids: Vec<OrgId> = members
            .iter()
            .map(|m| m.membership.org_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let orgs: HashMap<OrgId, Organization> = self
            .store
            .orgs_by_ids(&org_ids)
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

        let role_ids: BTreeSet<CustomRoleId> = members.iter().filter_map(|m| m.membership.custom_role_id).collect();
        let mut roles: HashMap<CustomRoleId, CustomRole> = HashMap::new();
        for id in role_ids {
            if let Some(role) = self.store.get_custom_role(id).await? {
                roles.insert(id, role);
            }
        }

        Ok(members
            .iter()
            .filter_map(|m| {
                let org = orgs.get(&m.membership.org_id)?;
                let custom = m.membership.custom_role_id.and_then(|id| roles.get(&id));
                Some(MemberView::new(&m.user, org, &m.membership, custom))
            })
            .collect())
    }

    /// The parent and its direct children, by name.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn children(&self, principal: &Principal, parent_id: OrgId) -> AccessResult<OrgChildren> {
        self.ensure_allowed(principal, parent_id).await?;
        let parent = self.org(parent_id).await?;
        let children = self.store.child_orgs(parent_id).await?;
        Ok(OrgChildren { parent, children })
    }

    /// Every organization the principal may act on, by name.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn list_orgs(&self, principal: &Principal) -> AccessResult<Vec<Organization>> {
        let allowed: Vec<OrgId> = self.allowed_org_ids(principal).await?.into_iter().collect();
        Ok(self.store.orgs_by_ids(&allowed).await?)
    }

    /// Requires `can_create_orgs` on the parent; CLIENT parents are rejected.
    #[instrument(skip(self, principal, req), fields(user_id = %principal.user_id, parent_id = %req.parent_id))]
    pub async fn create_sub_org(&self, principal: &Principal, req: CreateSubOrg) -> AccessResult<Organization> {
        self.authorize_in(principal, req.parent_id, Capability::CreateOrgs).await?;
        let parent = self.org(req.parent_id).await?;
        let org = parent
            .new_child(&req.name, req.org_type, Utc::now())?
            .with_profile(req.profile)?;
        self.store.insert_org(&org).await?;
        tracing::info!(org_id = %org.id, org_type = %org.org_type, "sub-organization created");
        Ok(org)
    }

    /// Members of `org_id` (default: the active org). With `include_children`
    /// the listing spans the org's subtree, but only for principals that reach
    /// into sub-organizations and never below a CLIENT org.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn list_users(
        &self,
        principal: &Principal,
        org_id: Option<OrgId>,
        include_children: bool,
    ) -> AccessResult<Vec<MemberView>> {
        let org_id = org_id.unwrap_or(principal.active_org_id);
        self.ensure_allowed(principal, org_id).await?;
        let org = self.org(org_id).await?;

        let org_ids: Vec<OrgId> = if include_children && principal.reaches_subtree() && org.org_type != OrgType::Client {
            self.resolve_descendants(org_id).await?.into_iter().collect()
        } else {
            vec![org_id]
        };

        let members = self.store.list_members(&org_ids).await?;
        self.member_views(members).await
    }

    /// Requires `can_create_users`; the role granted may not exceed the caller's own.
    #[instrument(skip(self, principal, req), fields(user_id = %principal.user_id, org_id = %req.org_id))]
    pub async fn assign_member(&self, principal: &Principal, req: AssignMember) -> AccessResult<MemberView> {
        self.authorize_in(principal, req.org_id, Capability::CreateUsers).await?;
        let org = self.org(req.org_id).await?;
        let grant = self
            .role_grant(principal, req.org_id, req.role.as_deref(), req.custom_role_id)
            .await?;
        let user = self
            .store
            .get_user(req.user_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("user {}", req.user_id)))?;
        self.ensure_replaceable(principal, user.id, org.id).await?;

        let membership = grant.membership(user.id, org.id);
        self.store.upsert_membership(&membership).await?;

        let view = MemberView::new(&user, &org, &membership, grant.custom.as_ref());
        self.notify(Notice::RoleChanged {
            to: user.email.clone(),
            org_name: org.name.clone(),
            role_label: view.role_label.clone(),
        });
        Ok(view)
    }

    /// Same rules as [`AccessEngine::assign_member`], but the membership must exist.
    /// Neither may overwrite a membership stronger than the caller's own.
    #[instrument(skip(self, principal, req), fields(user_id = %principal.user_id, org_id = %req.org_id))]
    pub async fn update_member_role(&self, principal: &Principal, req: UpdateMemberRole) -> AccessResult<MemberView> {
        self.authorize_in(principal, req.org_id, Capability::CreateUsers).await?;
        let org = self.org(req.org_id).await?;
        let grant = self
            .role_grant(principal, req.org_id, req.role.as_deref(), req.custom_role_id)
            .await?;
        self.ensure_replaceable(principal, req.user_id, org.id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("membership of user {}", req.user_id)))?;

        let membership = grant.membership(req.user_id, org.id);
        self.store.update_membership(&membership).await?;
        let user = self
            .store
            .get_user(req.user_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("user {}", req.user_id)))?;

        let view = MemberView::new(&user, &org, &membership, grant.custom.as_ref());
        self.notify(Notice::RoleChanged {
            to: user.email.clone(),
            org_name: org.name.clone(),
            role_label: view.role_label.clone(),
        });
        Ok(view)
    }

    /// Add a member by email, creating the account (with a generated password)
    /// when none exists. The new account and its membership are written together.
    #[instrument(skip(self, principal, req), fields(user_id = %principal.user_id, org_id = %req.org_id))]
    pub async fn create_member(&self, principal: &Principal, req: CreateMember) -> AccessResult<MemberView> {
        self.authorize_in(principal, req.org_id, Capability::CreateUsers).await?;
        let org = self.org(req.org_id).await?;
        let email = normalize_email(&req.email)?;
        if req.name.trim().is_empty() {
            return Err(AccessError::validation("name is required"));
        }
        let grant = self
            .role_grant(principal, req.org_id, req.role.as_deref(), req.custom_role_id)
            .await?;

        let (user, membership, notice) = match self.store.find_user_by_email(&email).await? {
            Some(existing) => {
                self.ensure_replaceable(principal, existing.id, org.id).await?;
                let membership = grant.membership(existing.id, org.id);
                self.store.upsert_membership(&membership).await?;
                let notice = Notice::RoleChanged {
                    to: existing.email.clone(),
                    org_name: org.name.clone(),
                    role_label: membership.role_label(grant.custom.as_ref()),
                };
                (existing, membership, notice)
            }
            None => {
                let password = generate_password(GENERATED_PASSWORD_LEN);
                let digest = self.hash_password(password.clone()).await?;
                let user = User::new(&req.name, &email, digest, Utc::now())?;
                let membership = grant.membership(user.id, org.id);
                self.store.insert_user_with_membership(&user, &membership).await?;
                tracing::info!(new_user_id = %user.id, "account created");
                let notice = Notice::Credentials {
                    to: user.email.clone(),
                    org_name: org.name.clone(),
                    password,
                };
                (user, membership, notice)
            }
        };

        self.notify(notice);
        Ok(MemberView::new(&user, &org, &membership, grant.custom.as_ref()))
    }

    /// Drop a membership. Requires `can_create_users` in the organization and
    /// may not remove anyone holding capabilities the caller lacks. The user
    /// account itself is kept.
    #[instrument(skip(self, principal, req), fields(user_id = %principal.user_id, org_id = %req.org_id))]
    pub async fn remove_member(&self, principal: &Principal, req: RemoveMember) -> AccessResult<()> {
        self.authorize_in(principal, req.org_id, Capability::CreateUsers).await?;
        self.ensure_replaceable(principal, req.user_id, req.org_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("membership of user {}", req.user_id)))?;
        self.store.delete_membership(req.user_id, req.org_id).await?;
        tracing::info!(member_id = %req.user_id, "membership removed");
        Ok(())
    }
}
