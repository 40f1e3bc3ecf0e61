//! Session issuance: login with organization disambiguation, and signup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use deskhive_auth::{
    BuiltinRole, Capabilities, CustomRole, OrgMembership, Principal, RoleType, SessionClaims,
};
use deskhive_core::{CustomRoleId, OrgId, OrgType, Organization, User, UserId, normalize_email};

use super::AccessEngine;
use crate::error::{AccessError, AccessResult};

#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub org_id: Option<OrgId>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("org_id", &self.org_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SignupRequest {
    pub organization_name: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// One selectable organization context for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipSummary {
    pub org_id: OrgId,
    pub org_name: String,
    pub org_type: OrgType,
    pub role: BuiltinRole,
    pub role_type: RoleType,
    pub custom_role_id: Option<CustomRoleId>,
    pub role_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// A signed session scoped to one organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
    pub org: Organization,
    pub role: String,
    pub role_type: RoleType,
    pub capabilities: Capabilities,
    pub memberships: Vec<MembershipSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Granted(SessionGrant),
    /// More than one membership and no organization chosen.
    OrgSelectionRequired(Vec<MembershipSummary>),
}

impl AccessEngine {
    /// Unknown email and wrong password are indistinguishable (`Unauthenticated`).
    #[instrument(skip(self, req), fields(org_id = ?req.org_id))]
    pub async fn login(&self, req: LoginRequest) -> AccessResult<LoginOutcome> {
        if req.email.trim().is_empty() || req.password.is_empty() {
            return Err(AccessError::validation("email and password are required"));
        }
        let email = normalize_email(&req.email).map_err(|_| AccessError::Unauthenticated)?;

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            tracing::debug!("login for unknown email");
            self.verify_against_decoy(req.password).await?;
            return Err(AccessError::Unauthenticated);
        };
        if !self.verify_password(req.password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "login with wrong password");
            return Err(AccessError::Unauthenticated);
        }

        let memberships = self.store.memberships_for_user(user.id).await?;
        let summaries = self.summarize(&memberships).await?;

        let chosen = match (req.org_id, memberships.len()) {
            (_, 0) => return Err(AccessError::forbidden("no organization memberships")),
            (Some(org_id), _) => memberships
                .into_iter()
                .find(|m| m.org_id == org_id)
                .ok_or_else(|| AccessError::forbidden("not a member of the requested organization"))?,
            (None, 1) => memberships
                .into_iter()
                .next()
                .ok_or_else(|| AccessError::Internal("membership vanished".to_string()))?,
            (None, _) => {
                tracing::debug!(user_id = %user.id, candidates = summaries.len(), "organization selection required");
                return Ok(LoginOutcome::OrgSelectionRequired(summaries));
            }
        };

        let grant = self.issue_session(&user, chosen, summaries).await?;
        tracing::info!(user_id = %user.id, org_id = %grant.org.id, "session issued");
        Ok(LoginOutcome::Granted(grant))
    }

    /// Register a new root organization with its first user as MANAGER.
    #[instrument(skip(self, req))]
    pub async fn signup(&self, req: SignupRequest) -> AccessResult<SessionGrant> {
        let now = Utc::now();
        let org = Organization::new_root(&req.organization_name, now)?;
        let email = normalize_email(&req.email)?;
        if req.password.trim().is_empty() {
            return Err(AccessError::validation("password is required"));
        }
        let digest = self.hash_password(req.password).await?;
        let user = User::new(&req.name, &email, digest, now)?;
        let membership = OrgMembership::builtin(user.id, org.id, BuiltinRole::Manager);

        self.store.register_tenant(&org, &user, &membership).await?;
        tracing::info!(user_id = %user.id, org_id = %org.id, "tenant registered");

        let summaries = self.summarize(std::slice::from_ref(&membership)).await?;
        self.issue_session(&user, membership, summaries).await
    }

    async fn issue_session(
        &self,
        user: &User,
        membership: OrgMembership,
        memberships: Vec<MembershipSummary>,
    ) -> AccessResult<SessionGrant> {
        let org = self
            .store
            .get_org(membership.org_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("organization {}", membership.org_id)))?;
        let custom_role = self.custom_role_for(&membership).await?;

        let now = Utc::now();
        let claims = SessionClaims::new(user.email.clone(), &membership, now, self.token_ttl);
        let token = self.codec.issue(&claims)?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| AccessError::Internal("token expiry out of range".to_string()))?;

        let role_type = membership.role_type();
        let principal = Principal::resolve(user.email.clone(), org.id, membership, custom_role.as_ref());

        Ok(SessionGrant {
            token,
            expires_at,
            user: SessionUser {
                id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
            },
            org,
            role: principal.role_label,
            role_type,
            capabilities: principal.capabilities,
            memberships,
        })
    }

    /// Label every membership with its organization and effective role, by org name.
    async fn summarize(&self, memberships: &[OrgMembership]) -> AccessResult<Vec<MembershipSummary>> {
        let org_ids: Vec<OrgId> = memberships.iter().map(|m| m.org_id).collect();
        let orgs: HashMap<OrgId, Organization> = self
            .store
            .orgs_by_ids(&org_ids)
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

        let mut roles: HashMap<CustomRoleId, CustomRole> = HashMap::new();
        for id in memberships.iter().filter_map(|m| m.custom_role_id) {
            if let Some(role) = self.store.get_custom_role(id).await? {
                roles.insert(id, role);
            }
        }

        let mut summaries: Vec<MembershipSummary> = memberships
            .iter()
            .filter_map(|m| {
                let org = orgs.get(&m.org_id)?;
                let custom = m.custom_role_id.and_then(|id| roles.get(&id));
                Some(MembershipSummary {
                    org_id: org.id,
                    org_name: org.name.clone(),
                    org_type: org.org_type,
                    role: m.role,
                    role_type: m.role_type(),
                    custom_role_id: m.custom_role_id,
                    role_label: m.role_label(custom),
                })
            })
            .collect();
        summaries.sort_by(|a, b| a.org_name.cmp(&b.org_name));
        Ok(summaries)
    }
}
