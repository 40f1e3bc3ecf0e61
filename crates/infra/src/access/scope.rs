//! Which organizations a principal may act on.
//!
//! Scope is a hard boundary, never a filter: handlers call [`ensure_allowed`]
//! for every organization id they take from a request and stop on failure.

use std::collections::BTreeSet;

use tracing::instrument;

use deskhive_auth::Principal;
use deskhive_core::OrgId;

use super::hierarchy::resolve_descendants;
use crate::error::{AccessError, AccessResult};
use crate::store::DirectoryStore;

/// The active organization's subtree when the principal reaches into
/// sub-organizations, otherwise just the active organization.
#[instrument(skip(store, principal), fields(user_id = %principal.user_id, org_id = %principal.active_org_id))]
pub async fn allowed_org_ids(store: &dyn DirectoryStore, principal: &Principal) -> AccessResult<BTreeSet<OrgId>> {
    if principal.reaches_subtree() {
        resolve_descendants(store, principal.active_org_id).await
    } else {
        Ok(BTreeSet::from([principal.active_org_id]))
    }
}

pub async fn is_allowed(store: &dyn DirectoryStore, principal: &Principal, target: OrgId) -> AccessResult<bool> {
    if target == principal.active_org_id {
        return Ok(true);
    }
    if !principal.reaches_subtree() {
        return Ok(false);
    }
    Ok(allowed_org_ids(store, principal).await?.contains(&target))
}

/// `Forbidden` for targets outside the allowed set, including ids that do not
/// exist at all.
pub async fn ensure_allowed(store: &dyn DirectoryStore, principal: &Principal, target: OrgId) -> AccessResult<()> {
    if is_allowed(store, principal, target).await? {
        Ok(())
    } else {
        tracing::debug!(user_id = %principal.user_id, target = %target, "organization outside scope");
        Err(AccessError::forbidden("organization is outside your scope"))
    }
}
