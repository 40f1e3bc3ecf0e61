use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use deskhive_auth::{CustomRole, OrgMembership};
use deskhive_core::{CustomRoleId, OrgId, Organization, User, UserId};

use super::{DirectoryStore, Member, StoreError};

#[derive(Debug, Default)]
struct Tables {
    orgs: HashMap<OrgId, Organization>,
    users: HashMap<UserId, User>,
    memberships: BTreeMap<(UserId, OrgId), OrgMembership>,
    roles: HashMap<CustomRoleId, CustomRole>,
}

impl Tables {
    fn check_new_org(&self, org: &Organization) -> Result<(), StoreError> {
        if self.orgs.contains_key(&org.id) {
            return Err(StoreError::Conflict(format!("organization {} already exists", org.id)));
        }
        // Roots are separate tenants and may share a name.
        let taken = org.parent_id.is_some()
            && self
                .orgs
                .values()
                .any(|o| o.parent_id == org.parent_id && o.name == org.name);
        if taken {
            return Err(StoreError::Conflict(format!(
                "organization '{}' already exists under this parent",
                org.name
            )));
        }
        if let Some(parent) = org.parent_id {
            if !self.orgs.contains_key(&parent) {
                return Err(StoreError::NotFound(format!("parent organization {parent}")));
            }
        }
        Ok(())
    }

    fn check_new_user(&self, user: &User) -> Result<(), StoreError> {
        if self.users.contains_key(&user.id) || self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email '{}' already registered", user.email)));
        }
        Ok(())
    }

    fn check_membership_refs(&self, membership: &OrgMembership) -> Result<(), StoreError> {
        if !self.orgs.contains_key(&membership.org_id) {
            return Err(StoreError::NotFound(format!("organization {}", membership.org_id)));
        }
        if let Some(role_id) = membership.custom_role_id {
            if !self.roles.contains_key(&role_id) {
                return Err(StoreError::NotFound(format!("custom role {role_id}")));
            }
        }
        Ok(())
    }

    fn role_name_taken(&self, role: &CustomRole) -> bool {
        self.roles
            .values()
            .any(|r| r.org_id == role.org_id && r.id != role.id && r.name == role.name)
    }
}

/// In-memory directory store.
///
/// Intended for tests/dev. Every write takes the single table lock, so
/// multi-row writes are all-or-nothing and uniqueness checks cannot race.
#[derive(Debug, Default)]
pub struct InMemoryDirectoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Drop a custom role row without touching the memberships that reference
    /// it, the way an out-of-band delete would.
    pub fn purge_custom_role(&self, id: CustomRoleId) -> Result<Option<CustomRole>, StoreError> {
        Ok(self.write()?.roles.remove(&id))
    }
}

fn sorted_by_name(mut orgs: Vec<Organization>) -> Vec<Organization> {
    orgs.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    orgs
}

#[async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn get_org(&self, id: OrgId) -> Result<Option<Organization>, StoreError> {
        Ok(self.read()?.orgs.get(&id).cloned())
    }

    async fn orgs_by_ids(&self, ids: &[OrgId]) -> Result<Vec<Organization>, StoreError> {
        let tables = self.read()?;
        let unique: HashSet<&OrgId> = ids.iter().collect();
        let orgs = unique.into_iter().filter_map(|id| tables.orgs.get(id).cloned()).collect();
        Ok(sorted_by_name(orgs))
    }

    async fn child_orgs(&self, parent: OrgId) -> Result<Vec<Organization>, StoreError> {
        let tables = self.read()?;
        let orgs = tables
            .orgs
            .values()
            .filter(|o| o.parent_id == Some(parent))
            .cloned()
            .collect();
        Ok(sorted_by_name(orgs))
    }

    async fn child_org_ids(&self, parents: &[OrgId]) -> Result<Vec<OrgId>, StoreError> {
        let tables = self.read()?;
        let parents: HashSet<&OrgId> = parents.iter().collect();
        Ok(tables
            .orgs
            .values()
            .filter(|o| o.parent_id.as_ref().is_some_and(|p| parents.contains(p)))
            .map(|o| o.id)
            .collect())
    }

    async fn insert_org(&self, org: &Organization) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.check_new_org(org)?;
        tables.orgs.insert(org.id, org.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user_with_membership(&self, user: &User, membership: &OrgMembership) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.check_new_user(user)?;
        tables.check_membership_refs(membership)?;
        tables.users.insert(user.id, user.clone());
        tables
            .memberships
            .insert((membership.user_id, membership.org_id), membership.clone());
        Ok(())
    }

    async fn register_tenant(
        &self,
        org: &Organization,
        user: &User,
        membership: &OrgMembership,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.check_new_org(org)?;
        tables.check_new_user(user)?;
        tables.orgs.insert(org.id, org.clone());
        tables.users.insert(user.id, user.clone());
        tables
            .memberships
            .insert((membership.user_id, membership.org_id), membership.clone());
        Ok(())
    }

    async fn get_membership(&self, user_id: UserId, org_id: OrgId) -> Result<Option<OrgMembership>, StoreError> {
        Ok(self.read()?.memberships.get(&(user_id, org_id)).cloned())
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<OrgMembership>, StoreError> {
        Ok(self
            .read()?
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_membership(&self, membership: &OrgMembership) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&membership.user_id) {
            return Err(StoreError::NotFound(format!("user {}", membership.user_id)));
        }
        tables.check_membership_refs(membership)?;
        tables
            .memberships
            .insert((membership.user_id, membership.org_id), membership.clone());
        Ok(())
    }

    async fn update_membership(&self, membership: &OrgMembership) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.check_membership_refs(membership)?;
        match tables.memberships.get_mut(&(membership.user_id, membership.org_id)) {
            Some(existing) => {
                *existing = membership.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "membership of user {} in organization {}",
                membership.user_id, membership.org_id
            ))),
        }
    }

    async fn delete_membership(&self, user_id: UserId, org_id: OrgId) -> Result<(), StoreError> {
        match self.write()?.memberships.remove(&(user_id, org_id)) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!(
                "membership of user {user_id} in organization {org_id}"
            ))),
        }
    }

    async fn list_members(&self, org_ids: &[OrgId]) -> Result<Vec<Member>, StoreError> {
        let tables = self.read()?;
        let wanted: HashSet<&OrgId> = org_ids.iter().collect();
        let mut members: Vec<Member> = tables
            .memberships
            .values()
            .filter(|m| wanted.contains(&m.org_id))
            .filter_map(|m| {
                tables.users.get(&m.user_id).map(|user| Member {
                    membership: m.clone(),
                    user: user.clone(),
                })
            })
            .collect();
        members.sort_by_key(|m| (m.membership.org_id, m.membership.user_id));
        Ok(members)
    }

    async fn get_custom_role(&self, id: CustomRoleId) -> Result<Option<CustomRole>, StoreError> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn custom_roles_for_org(&self, org_id: OrgId) -> Result<Vec<CustomRole>, StoreError> {
        let mut roles: Vec<CustomRole> = self
            .read()?
            .roles
            .values()
            .filter(|r| r.org_id == org_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn insert_custom_role(&self, role: &CustomRole) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.orgs.contains_key(&role.org_id) {
            return Err(StoreError::NotFound(format!("organization {}", role.org_id)));
        }
        if tables.roles.contains_key(&role.id) || tables.role_name_taken(role) {
            return Err(StoreError::Conflict(format!(
                "role '{}' already exists in this organization",
                role.name
            )));
        }
        tables.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update_custom_role(&self, role: &CustomRole) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let belongs = tables
            .roles
            .get(&role.id)
            .is_some_and(|existing| existing.org_id == role.org_id);
        if !belongs {
            return Err(StoreError::NotFound(format!("custom role {}", role.id)));
        }
        if tables.role_name_taken(role) {
            return Err(StoreError::Conflict(format!(
                "role '{}' already exists in this organization",
                role.name
            )));
        }
        tables.roles.insert(role.id, role.clone());
        Ok(())
    }
}
