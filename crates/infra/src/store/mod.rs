//! Directory persistence: organizations, users, memberships, custom roles.
//!
//! The store is the single source of truth and the only shared mutable
//! resource. Uniqueness rules live here (not in callers) so that concurrent
//! writers get a `Conflict` instead of silently overwriting each other:
//!
//! - organization name among siblings (roots may share a name)
//! - user email (global, normalized)
//! - membership pair (user × org)
//! - custom role name within its organization

use async_trait::async_trait;
use thiserror::Error;

use deskhive_auth::{CustomRole, OrgMembership};
use deskhive_core::{CustomRoleId, OrgId, Organization, User, UserId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDirectoryStore;
pub use postgres::PostgresDirectoryStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Backend(String),
}

/// A membership row joined with its user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub membership: OrgMembership,
    pub user: User,
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    // ── organizations ───────────────────────────────────────────────────────

    async fn get_org(&self, id: OrgId) -> Result<Option<Organization>, StoreError>;

    /// Organizations among `ids`, ordered by name. Unknown ids are skipped.
    async fn orgs_by_ids(&self, ids: &[OrgId]) -> Result<Vec<Organization>, StoreError>;

    /// Direct children of `parent`, ordered by name.
    async fn child_orgs(&self, parent: OrgId) -> Result<Vec<Organization>, StoreError>;

    /// Ids of the direct children of any of `parents` (one tree level).
    async fn child_org_ids(&self, parents: &[OrgId]) -> Result<Vec<OrgId>, StoreError>;

    /// `Conflict` when a sibling already has the name, `NotFound` when the
    /// parent is absent.
    async fn insert_org(&self, org: &Organization) -> Result<(), StoreError>;

    // ── users ───────────────────────────────────────────────────────────────

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Lookup by normalized email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Create a user and its first membership; both rows or neither.
    async fn insert_user_with_membership(&self, user: &User, membership: &OrgMembership) -> Result<(), StoreError>;

    /// Create a root organization, its first user and that user's membership;
    /// all three rows or none.
    async fn register_tenant(
        &self,
        org: &Organization,
        user: &User,
        membership: &OrgMembership,
    ) -> Result<(), StoreError>;

    // ── memberships ─────────────────────────────────────────────────────────

    async fn get_membership(&self, user_id: UserId, org_id: OrgId) -> Result<Option<OrgMembership>, StoreError>;

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<OrgMembership>, StoreError>;

    /// Insert or replace the (user, org) membership. `NotFound` when the user or
    /// organization does not exist.
    async fn upsert_membership(&self, membership: &OrgMembership) -> Result<(), StoreError>;

    /// Replace an existing membership. `NotFound` when there is none.
    async fn update_membership(&self, membership: &OrgMembership) -> Result<(), StoreError>;

    /// Remove the (user, org) membership, leaving the user row. `NotFound`
    /// when there is none.
    async fn delete_membership(&self, user_id: UserId, org_id: OrgId) -> Result<(), StoreError>;

    /// Members of any of `org_ids`, ordered by (org id, user id).
    async fn list_members(&self, org_ids: &[OrgId]) -> Result<Vec<Member>, StoreError>;

    // ── custom roles ────────────────────────────────────────────────────────

    async fn get_custom_role(&self, id: CustomRoleId) -> Result<Option<CustomRole>, StoreError>;

    /// Custom roles of one organization, ordered by name.
    async fn custom_roles_for_org(&self, org_id: OrgId) -> Result<Vec<CustomRole>, StoreError>;

    /// `Conflict` when the name is taken within the organization.
    async fn insert_custom_role(&self, role: &CustomRole) -> Result<(), StoreError>;

    /// Update the row matching `(role.id, role.org_id)`. `NotFound` when there
    /// is none, `Conflict` when the new name is taken.
    async fn update_custom_role(&self, role: &CustomRole) -> Result<(), StoreError>;
}
