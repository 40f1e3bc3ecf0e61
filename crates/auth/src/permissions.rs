//! Capability model and the permission deriver.
//!
//! Every handler asks the same question ("may this membership do X?") through
//! [`derive_capabilities`]; there is no other place that maps roles to rights.

use serde::{Deserialize, Serialize};

use crate::{CustomRole, OrgMembership};

/// A single grantable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewTickets,
    SendTickets,
    CreateUsers,
    CreateOrgs,
    CreateRoles,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ViewTickets,
        Capability::SendTickets,
        Capability::CreateUsers,
        Capability::CreateOrgs,
        Capability::CreateRoles,
    ];

    /// Flag name as stored on custom roles.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewTickets => "can_view_tickets",
            Capability::SendTickets => "can_send_tickets",
            Capability::CreateUsers => "can_create_users",
            Capability::CreateOrgs => "can_create_orgs",
            Capability::CreateRoles => "can_create_roles",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete capability set. Unset flags deserialize as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub can_view_tickets: bool,
    #[serde(default)]
    pub can_send_tickets: bool,
    #[serde(default)]
    pub can_create_users: bool,
    #[serde(default)]
    pub can_create_orgs: bool,
    #[serde(default)]
    pub can_create_roles: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self {
            can_view_tickets: true,
            can_send_tickets: true,
            can_create_users: true,
            can_create_orgs: true,
            can_create_roles: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            can_view_tickets: false,
            can_send_tickets: false,
            can_create_users: false,
            can_create_orgs: false,
            can_create_roles: false,
        }
    }

    /// The non-owner fallback: tickets are visible, nothing else.
    pub const fn view_only() -> Self {
        Self {
            can_view_tickets: true,
            ..Self::none()
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::ViewTickets => self.can_view_tickets,
            Capability::SendTickets => self.can_send_tickets,
            Capability::CreateUsers => self.can_create_users,
            Capability::CreateOrgs => self.can_create_orgs,
            Capability::CreateRoles => self.can_create_roles,
        }
    }

    /// Granted capabilities, in canonical order.
    pub fn granted(&self) -> Vec<Capability> {
        Capability::ALL.into_iter().filter(|c| self.has(*c)).collect()
    }

    /// Capabilities in `other` that `self` does not hold.
    pub fn missing(&self, other: &Capabilities) -> Vec<Capability> {
        other.granted().into_iter().filter(|c| !self.has(*c)).collect()
    }

    /// `true` when every capability in `other` is also held by `self`.
    pub fn covers(&self, other: &Capabilities) -> bool {
        self.missing(other).is_empty()
    }

    /// Whether this set reaches into sub-organizations of the membership's org.
    ///
    /// Hierarchy-wide reach follows the org-creation right: whoever may shape the
    /// subtree may act on it.
    pub fn reaches_subtree(&self) -> bool {
        self.can_create_orgs
    }
}

/// Derive the effective capability set of a membership (first match wins).
///
/// 1. A custom-role reference that resolves to a row of the same organization
///    governs, flags verbatim.
/// 2. A custom-role reference that does *not* resolve fails closed to
///    [`Capabilities::view_only`], whatever the stored built-in role says.
/// 3. Otherwise the built-in role's fixed table applies.
pub fn derive_capabilities(membership: &OrgMembership, custom_role: Option<&CustomRole>) -> Capabilities {
    let Some(custom_role_id) = membership.custom_role_id else {
        return membership.role.capabilities();
    };

    match custom_role {
        Some(role) if role.id == custom_role_id && role.org_id == membership.org_id => role.capabilities,
        _ => {
            tracing::warn!(
                user_id = %membership.user_id,
                org_id = %membership.org_id,
                custom_role_id = %custom_role_id,
                "dangling custom role reference; falling back to view-only"
            );
            Capabilities::view_only()
        }
    }
}
