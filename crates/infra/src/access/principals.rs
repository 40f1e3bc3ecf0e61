//! Turning a bearer credential into a resolved principal.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::instrument;

use deskhive_auth::{Capability, CustomRole, OrgMembership, Principal, SessionClaims, authorize};
use deskhive_core::OrgId;

use super::{AccessEngine, hierarchy, scope};
use crate::error::{AccessError, AccessResult};

impl AccessEngine {
    /// Verify a bearer token and resolve the principal behind it.
    pub async fn authenticate(&self, token: &str) -> AccessResult<Principal> {
        let claims = self.codec.verify(token, Utc::now())?;
        self.resolve_principal(&claims).await
    }

    /// Re-read the membership named by verified claims and derive its capabilities.
    ///
    /// The role recorded in the token is not trusted: a membership that was
    /// removed since issue is `Forbidden`, a changed one applies immediately.
    #[instrument(skip(self, claims), fields(user_id = %claims.sub, org_id = %claims.org_id))]
    pub async fn resolve_principal(&self, claims: &SessionClaims) -> AccessResult<Principal> {
        let user = self
            .store
            .get_user(claims.sub)
            .await?
            .ok_or(AccessError::Unauthenticated)?;

        let membership = self
            .store
            .get_membership(claims.sub, claims.org_id)
            .await?
            .ok_or_else(|| AccessError::forbidden("no membership in this organization"))?;

        let custom_role = self.custom_role_for(&membership).await?;
        Ok(Principal::resolve(user.email, claims.org_id, membership, custom_role.as_ref()))
    }

    pub(crate) async fn custom_role_for(&self, membership: &OrgMembership) -> AccessResult<Option<CustomRole>> {
        match membership.custom_role_id {
            Some(id) => Ok(self.store.get_custom_role(id).await?),
            None => Ok(None),
        }
    }

    pub async fn resolve_descendants(&self, org_id: OrgId) -> AccessResult<BTreeSet<OrgId>> {
        hierarchy::resolve_descendants(self.store(), org_id).await
    }

    pub async fn allowed_org_ids(&self, principal: &Principal) -> AccessResult<BTreeSet<OrgId>> {
        scope::allowed_org_ids(self.store(), principal).await
    }

    pub async fn is_allowed(&self, principal: &Principal, target: OrgId) -> AccessResult<bool> {
        scope::is_allowed(self.store(), principal, target).await
    }

    pub async fn ensure_allowed(&self, principal: &Principal, target: OrgId) -> AccessResult<()> {
        scope::ensure_allowed(self.store(), principal, target).await
    }

    /// Scope check on `target`, then the capability check.
    pub async fn authorize_in(&self, principal: &Principal, target: OrgId, capability: Capability) -> AccessResult<()> {
        self.ensure_allowed(principal, target).await?;
        authorize(principal, capability)?;
        Ok(())
    }
}
