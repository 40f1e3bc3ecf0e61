use serde::Serialize;
use thiserror::Error;

use deskhive_core::{OrgId, UserId};

use crate::{Capabilities, Capability, CustomRole, OrgMembership, derive_capabilities};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the access layer loads the membership row (and its custom role)
/// fresh for every request and hands them to [`Principal::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub active_org_id: OrgId,
    pub membership: OrgMembership,
    pub role_label: String,
    pub capabilities: Capabilities,
}

impl Principal {
    pub fn resolve(
        email: impl Into<String>,
        active_org_id: OrgId,
        membership: OrgMembership,
        custom_role: Option<&CustomRole>,
    ) -> Self {
        let capabilities = derive_capabilities(&membership, custom_role);
        Self {
            user_id: membership.user_id,
            email: email.into(),
            active_org_id,
            role_label: membership.role_label(custom_role),
            capabilities,
            membership,
        }
    }

    /// Whether this principal may act on descendants of its active org.
    pub fn reaches_subtree(&self) -> bool {
        self.capabilities.reaches_subtree()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("organization mismatch")]
    OrgMismatch,

    #[error("forbidden: missing capability '{0}'")]
    Forbidden(Capability),

    #[error("forbidden: cannot grant capability '{0}' that is not held")]
    Escalation(Capability),
}

/// Authorize a principal for one capability within its active organization.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: Capability) -> Result<(), AuthzError> {
    if principal.active_org_id != principal.membership.org_id {
        return Err(AuthzError::OrgMismatch);
    }

    if principal.capabilities.has(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required))
    }
}

/// Least-privilege rule: a granter cannot hand out a capability it does not hold.
pub fn ensure_grantable(principal: &Principal, granted: &Capabilities) -> Result<(), AuthzError> {
    match principal.capabilities.missing(granted).first() {
        Some(capability) => Err(AuthzError::Escalation(*capability)),
        None => Ok(()),
    }
}
