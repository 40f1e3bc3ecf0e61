use deskhive_auth::Principal;
use deskhive_core::OrgId;

/// The authenticated principal for a request.
///
/// Inserted by the auth middleware after the membership behind the bearer
/// token has been re-read; handlers never see a principal built from claims alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn active_org_id(&self) -> OrgId {
        self.principal.active_org_id
    }
}
