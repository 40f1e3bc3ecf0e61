//! Postgres-backed directory store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | duplicate sibling org name, email, membership pair or role name |
//! | Database (foreign key violation) | `23503` | `NotFound` | parent org, user, org or custom role row absent |
//! | Database (other) | Any other | `Backend` | |
//! | PoolClosed / other | N/A | `Backend` | connection failures, decode errors |
//!
//! Multi-row writes (`register_tenant`, `insert_user_with_membership`) run in
//! one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use deskhive_auth::{BuiltinRole, Capabilities, CustomRole, OrgMembership};
use deskhive_core::{CustomRoleId, OrgId, OrgProfile, OrgType, Organization, User, UserId};

use super::{DirectoryStore, Member, StoreError};

#[derive(Debug, Clone)]
pub struct PostgresDirectoryStore {
    pool: PgPool,
}

impl PostgresDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and apply the bundled migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migrations failed: {e}")))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(|e| map_sqlx_error(operation, e))
    }
}

const ORG_COLUMNS: &str = "id, name, parent_id, org_type, created_at, email, whatsapp, slack_id, discord_id, \
                           linkedin_url, address_line1, address_line2, city, state, postal_code, country, \
                           latitude, longitude";
const ROLE_COLUMNS: &str = "id, org_id, name, can_view_tickets, can_send_tickets, can_create_users, \
                            can_create_orgs, can_create_roles, created_at, updated_at";

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

fn org_from_row(row: &PgRow) -> Result<Organization, StoreError> {
    let decode = |e| map_sqlx_error("decode_organization", e);
    let org_type: String = row.try_get("org_type").map_err(decode)?;
    Ok(Organization {
        id: OrgId::from_uuid(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .map_err(decode)?
            .map(OrgId::from_uuid),
        org_type: OrgType::parse(&org_type).map_err(|e| StoreError::Backend(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(decode)?,
        profile: OrgProfile {
            email: row.try_get("email").map_err(decode)?,
            whatsapp: row.try_get("whatsapp").map_err(decode)?,
            slack_id: row.try_get("slack_id").map_err(decode)?,
            discord_id: row.try_get("discord_id").map_err(decode)?,
            linkedin_url: row.try_get("linkedin_url").map_err(decode)?,
            address_line1: row.try_get("address_line1").map_err(decode)?,
            address_line2: row.try_get("address_line2").map_err(decode)?,
            city: row.try_get("city").map_err(decode)?,
            state: row.try_get("state").map_err(decode)?,
            postal_code: row.try_get("postal_code").map_err(decode)?,
            country: row.try_get("country").map_err(decode)?,
            latitude: row.try_get("latitude").map_err(decode)?,
            longitude: row.try_get("longitude").map_err(decode)?,
        },
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let decode = |e| map_sqlx_error("decode_user", e);
    Ok(User {
        id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<OrgMembership, StoreError> {
    let decode = |e| map_sqlx_error("decode_membership", e);
    let role: String = row.try_get("role").map_err(decode)?;
    Ok(OrgMembership {
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(decode)?),
        role: role
            .parse::<BuiltinRole>()
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        custom_role_id: row
            .try_get::<Option<Uuid>, _>("custom_role_id")
            .map_err(decode)?
            .map(CustomRoleId::from_uuid),
    })
}

fn role_from_row(row: &PgRow) -> Result<CustomRole, StoreError> {
    let decode = |e| map_sqlx_error("decode_custom_role", e);
    Ok(CustomRole {
        id: CustomRoleId::from_uuid(row.try_get("id").map_err(decode)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        capabilities: Capabilities {
            can_view_tickets: row.try_get("can_view_tickets").map_err(decode)?,
            can_send_tickets: row.try_get("can_send_tickets").map_err(decode)?,
            can_create_users: row.try_get("can_create_users").map_err(decode)?,
            can_create_orgs: row.try_get("can_create_orgs").map_err(decode)?,
            can_create_roles: row.try_get("can_create_roles").map_err(decode)?,
        },
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode)?,
    })
}

async fn insert_org_row(tx: &mut Transaction<'static, Postgres>, org: &Organization) -> Result<(), StoreError> {
    let profile = &org.profile;
    sqlx::query(&format!(
        "INSERT INTO organizations ({ORG_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
    ))
    .bind(org.id.as_uuid())
    .bind(&org.name)
    .bind(org.parent_id.map(Uuid::from))
    .bind(org.org_type.as_str())
    .bind(org.created_at)
    .bind(&profile.email)
    .bind(&profile.whatsapp)
    .bind(&profile.slack_id)
    .bind(&profile.discord_id)
    .bind(&profile.linkedin_url)
    .bind(&profile.address_line1)
    .bind(&profile.address_line2)
    .bind(&profile.city)
    .bind(&profile.state)
    .bind(&profile.postal_code)
    .bind(&profile.country)
    .bind(profile.latitude)
    .bind(profile.longitude)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_organization", e))?;
    Ok(())
}

async fn insert_user_row(tx: &mut Transaction<'static, Postgres>, user: &User) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user.id.as_uuid())
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_user", e))?;
    Ok(())
}

async fn insert_membership_row(
    tx: &mut Transaction<'static, Postgres>,
    membership: &OrgMembership,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO org_users (user_id, org_id, role, custom_role_id)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(membership.user_id.as_uuid())
    .bind(membership.org_id.as_uuid())
    .bind(membership.role.as_str())
    .bind(membership.custom_role_id.map(Uuid::from))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_membership", e))?;
    Ok(())
}

async fn commit(tx: Transaction<'static, Postgres>, operation: &str) -> Result<(), StoreError> {
    tx.commit().await.map_err(|e| map_sqlx_error(operation, e))
}

#[async_trait]
impl DirectoryStore for PostgresDirectoryStore {
    #[instrument(skip(self), fields(org_id = %id))]
    async fn get_org(&self, id: OrgId) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_org", e))?;
        row.as_ref().map(org_from_row).transpose()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn orgs_by_ids(&self, ids: &[OrgId]) -> Result<Vec<Organization>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE id = ANY($1) ORDER BY name, id"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("orgs_by_ids", e))?;
        rows.iter().map(org_from_row).collect()
    }

    #[instrument(skip(self), fields(parent_id = %parent))]
    async fn child_orgs(&self, parent: OrgId) -> Result<Vec<Organization>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE parent_id = $1 ORDER BY name, id"
        ))
        .bind(parent.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("child_orgs", e))?;
        rows.iter().map(org_from_row).collect()
    }

    #[instrument(skip(self, parents), fields(level_width = parents.len()))]
    async fn child_org_ids(&self, parents: &[OrgId]) -> Result<Vec<OrgId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM organizations WHERE parent_id = ANY($1)")
            .bind(uuids(parents))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("child_org_ids", e))?;
        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("id")
                    .map(OrgId::from_uuid)
                    .map_err(|e| map_sqlx_error("decode_org_id", e))
            })
            .collect()
    }

    #[instrument(skip(self, org), fields(org_id = %org.id))]
    async fn insert_org(&self, org: &Organization) -> Result<(), StoreError> {
        let mut tx = self.begin("insert_org").await?;
        insert_org_row(&mut tx, org).await?;
        commit(tx, "insert_org").await
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id AS user_id, name, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, email))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id AS user_id, name, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, user, membership), fields(user_id = %user.id, org_id = %membership.org_id))]
    async fn insert_user_with_membership(&self, user: &User, membership: &OrgMembership) -> Result<(), StoreError> {
        let mut tx = self.begin("insert_user_with_membership").await?;
        insert_user_row(&mut tx, user).await?;
        insert_membership_row(&mut tx, membership).await?;
        commit(tx, "insert_user_with_membership").await
    }

    #[instrument(skip(self, org, user, membership), fields(org_id = %org.id, user_id = %user.id))]
    async fn register_tenant(
        &self,
        org: &Organization,
        user: &User,
        membership: &OrgMembership,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin("register_tenant").await?;
        insert_org_row(&mut tx, org).await?;
        insert_user_row(&mut tx, user).await?;
        insert_membership_row(&mut tx, membership).await?;
        commit(tx, "register_tenant").await
    }

    #[instrument(skip(self), fields(user_id = %user_id, org_id = %org_id))]
    async fn get_membership(&self, user_id: UserId, org_id: OrgId) -> Result<Option<OrgMembership>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, org_id, role, custom_role_id FROM org_users WHERE user_id = $1 AND org_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_membership", e))?;
        row.as_ref().map(membership_from_row).transpose()
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<OrgMembership>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, org_id, role, custom_role_id FROM org_users WHERE user_id = $1 ORDER BY org_id",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("memberships_for_user", e))?;
        rows.iter().map(membership_from_row).collect()
    }

    #[instrument(skip(self, membership), fields(user_id = %membership.user_id, org_id = %membership.org_id))]
    async fn upsert_membership(&self, membership: &OrgMembership) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO org_users (user_id, org_id, role, custom_role_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, org_id)
            DO UPDATE SET
                role = EXCLUDED.role,
                custom_role_id = EXCLUDED.custom_role_id
            "#,
        )
        .bind(membership.user_id.as_uuid())
        .bind(membership.org_id.as_uuid())
        .bind(membership.role.as_str())
        .bind(membership.custom_role_id.map(Uuid::from))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_membership", e))?;
        Ok(())
    }

    #[instrument(skip(self, membership), fields(user_id = %membership.user_id, org_id = %membership.org_id))]
    async fn update_membership(&self, membership: &OrgMembership) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE org_users SET role = $3, custom_role_id = $4 WHERE user_id = $1 AND org_id = $2",
        )
        .bind(membership.user_id.as_uuid())
        .bind(membership.org_id.as_uuid())
        .bind(membership.role.as_str())
        .bind(membership.custom_role_id.map(Uuid::from))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_membership", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "membership of user {} in organization {}",
                membership.user_id, membership.org_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id, org_id = %org_id))]
    async fn delete_membership(&self, user_id: UserId, org_id: OrgId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM org_users WHERE user_id = $1 AND org_id = $2")
            .bind(user_id.as_uuid())
            .bind(org_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_membership", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "membership of user {user_id} in organization {org_id}"
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, org_ids), fields(count = org_ids.len()))]
    async fn list_members(&self, org_ids: &[OrgId]) -> Result<Vec<Member>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                m.user_id,
                m.org_id,
                m.role,
                m.custom_role_id,
                u.name,
                u.email,
                u.password_hash,
                u.created_at
            FROM org_users m
            JOIN users u ON u.id = m.user_id
            WHERE m.org_id = ANY($1)
            ORDER BY m.org_id, m.user_id
            "#,
        )
        .bind(uuids(org_ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_members", e))?;

        rows.iter()
            .map(|row| {
                Ok(Member {
                    membership: membership_from_row(row)?,
                    user: user_from_row(row)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(role_id = %id))]
    async fn get_custom_role(&self, id: CustomRoleId) -> Result<Option<CustomRole>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM org_custom_roles WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_custom_role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn custom_roles_for_org(&self, org_id: OrgId) -> Result<Vec<CustomRole>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM org_custom_roles WHERE org_id = $1 ORDER BY name"
        ))
        .bind(org_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("custom_roles_for_org", e))?;
        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self, role), fields(role_id = %role.id, org_id = %role.org_id))]
    async fn insert_custom_role(&self, role: &CustomRole) -> Result<(), StoreError> {
        let caps = &role.capabilities;
        sqlx::query(
            r#"
            INSERT INTO org_custom_roles (
                id, org_id, name,
                can_view_tickets, can_send_tickets, can_create_users, can_create_orgs, can_create_roles,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.org_id.as_uuid())
        .bind(&role.name)
        .bind(caps.can_view_tickets)
        .bind(caps.can_send_tickets)
        .bind(caps.can_create_users)
        .bind(caps.can_create_orgs)
        .bind(caps.can_create_roles)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_custom_role", e))?;
        Ok(())
    }

    #[instrument(skip(self, role), fields(role_id = %role.id, org_id = %role.org_id))]
    async fn update_custom_role(&self, role: &CustomRole) -> Result<(), StoreError> {
        let caps = &role.capabilities;
        let result = sqlx::query(
            r#"
            UPDATE org_custom_roles SET
                name = $3,
                can_view_tickets = $4,
                can_send_tickets = $5,
                can_create_users = $6,
                can_create_orgs = $7,
                can_create_roles = $8,
                updated_at = $9
            WHERE id = $1 AND org_id = $2
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.org_id.as_uuid())
        .bind(&role.name)
        .bind(caps.can_view_tickets)
        .bind(caps.can_send_tickets)
        .bind(caps.can_create_users)
        .bind(caps.can_create_orgs)
        .bind(caps.can_create_roles)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_custom_role", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("custom role {}", role.id)));
        }
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
