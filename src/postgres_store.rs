//! Postgres-backed grant store.
//!
//! Soft-deleted rows keep their `deleted_at` timestamp and are filtered out by
//! every read. Name and code uniqueness is enforced by partial unique indexes
//! over live rows, so a deleted role's name can be reused.
//!
//! Ids above `i64::MAX` cannot be stored in a `BIGINT` column. Reads treat
//! them as absent; writes reject them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use crate::error::{Error, StoreError};
use crate::model::{NewPermission, NewRole, Permission, Role, Status};
use crate::permission::PermissionCode;
use crate::store::{GrantStore, PermissionStore, RoleStore};
use crate::types::{PermissionId, RoleId, RoleName, UserId};

const ROLE_COLUMNS: &str =
    "id, name, display_name, description, status, created_at, updated_at";
const PERMISSION_COLUMNS: &str =
    "id, code, name, resource, action, description, status, created_at, updated_at";

/// Grant store backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct DbRole {
    id: i64,
    name: String,
    display_name: String,
    description: String,
    status: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DbRole {
    fn into_role(self) -> Result<Role, StoreError> {
        Ok(Role {
            id: RoleId::new(from_db(self.id)?),
            name: RoleName::new(&self.name)?,
            display_name: self.display_name,
            description: self.description,
            status: Status::from_i16(self.status),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DbPermission {
    id: i64,
    code: String,
    name: String,
    resource: String,
    action: String,
    description: String,
    status: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DbPermission {
    fn into_permission(self) -> Result<Permission, StoreError> {
        Ok(Permission {
            id: PermissionId::new(from_db(self.id)?),
            code: PermissionCode::new(&self.code)?,
            name: self.name,
            resource: self.resource,
            action: self.action,
            description: self.description,
            status: Status::from_i16(self.status),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn to_db(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| format!("id {id} exceeds the BIGINT range").into())
}

fn from_db(id: i64) -> Result<u64, StoreError> {
    u64::try_from(id).map_err(|_| format!("negative id {id} in store").into())
}

fn to_db_ids<T: Copy>(ids: &[T], get: impl Fn(T) -> u64) -> Result<Vec<i64>, StoreError> {
    ids.iter().map(|id| to_db(get(*id))).collect()
}

/// Read-side conversion: an id that cannot be stored matches no row.
fn stored(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

fn stored_ids<T: Copy>(ids: &[T], get: impl Fn(T) -> u64) -> Vec<i64> {
    ids.iter().filter_map(|id| stored(get(*id))).collect()
}

fn roles(rows: Vec<DbRole>) -> Result<Vec<Role>, StoreError> {
    rows.into_iter().map(DbRole::into_role).collect()
}

fn permissions(rows: Vec<DbPermission>) -> Result<Vec<Permission>, StoreError> {
    rows.into_iter()
        .map(DbPermission::into_permission)
        .collect()
}

fn codes(rows: Vec<String>) -> Result<Vec<PermissionCode>, StoreError> {
    rows.into_iter()
        .map(|code| PermissionCode::new(&code).map_err(StoreError::from))
        .collect()
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl PostgresStore {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> crate::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|error| Error::StoreUnavailable(Box::new(error)))?;
        Ok(Self::new(pool))
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> crate::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| Error::StoreUnavailable(Box::new(error)))
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RoleStore for PostgresStore {
    async fn role_by_id(&self, role: RoleId) -> Result<Option<Role>, StoreError> {
        let Some(role) = stored(role.get()) else {
            return Ok(None);
        };
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND deleted_at IS NULL");
        let row: Option<DbRole> = sqlx::query_as(&sql)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?;
        row.map(DbRole::into_role).transpose()
    }

    async fn role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        let sql =
            format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1 AND deleted_at IS NULL");
        let row: Option<DbRole> = sqlx::query_as(&sql)
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(DbRole::into_role).transpose()
    }

    async fn roles_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles \
             WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        );
        let rows: Vec<DbRole> = sqlx::query_as(&sql)
            .bind(stored_ids(ids, RoleId::get))
            .fetch_all(&self.pool)
            .await?;
        roles(rows)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE deleted_at IS NULL ORDER BY id");
        let rows: Vec<DbRole> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        roles(rows)
    }

    async fn insert_role(&self, role: NewRole) -> Result<Option<Role>, StoreError> {
        let sql = format!(
            "INSERT INTO roles (name, display_name, description, status) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (name) WHERE deleted_at IS NULL DO NOTHING \
             RETURNING {ROLE_COLUMNS}"
        );
        let row: Option<DbRole> = sqlx::query_as(&sql)
            .bind(role.name.as_str())
            .bind(&role.display_name)
            .bind(&role.description)
            .bind(role.status.as_i16())
            .fetch_optional(&self.pool)
            .await?;
        row.map(DbRole::into_role).transpose()
    }

    async fn update_role(&self, role: Role) -> Result<Option<Role>, StoreError> {
        let Some(id) = stored(role.id.get()) else {
            return Ok(None);
        };
        let sql = format!(
            "UPDATE roles SET name = $2, display_name = $3, description = $4, status = $5, \
             updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {ROLE_COLUMNS}"
        );
        let result: Result<Option<DbRole>, sqlx::Error> = sqlx::query_as(&sql)
            .bind(id)
            .bind(role.name.as_str())
            .bind(&role.display_name)
            .bind(&role.description)
            .bind(role.status.as_i16())
            .fetch_optional(&self.pool)
            .await;
        match result {
            Ok(row) => row.map(DbRole::into_role).transpose(),
            Err(error) if is_unique_violation(&error) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn soft_delete_role(&self, role: RoleId) -> Result<bool, StoreError> {
        let Some(role) = stored(role.get()) else {
            return Ok(false);
        };
        let result = sqlx::query(
            "UPDATE roles SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PermissionStore for PostgresStore {
    async fn permission_by_id(
        &self,
        permission: PermissionId,
    ) -> Result<Option<Permission>, StoreError> {
        let Some(permission) = stored(permission.get()) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1 AND deleted_at IS NULL"
        );
        let row: Option<DbPermission> = sqlx::query_as(&sql)
            .bind(permission)
            .fetch_optional(&self.pool)
            .await?;
        row.map(DbPermission::into_permission).transpose()
    }

    async fn permission_by_code(
        &self,
        code: &PermissionCode,
    ) -> Result<Option<Permission>, StoreError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE code = $1 AND deleted_at IS NULL"
        );
        let row: Option<DbPermission> = sqlx::query_as(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(DbPermission::into_permission).transpose()
    }

    async fn permissions_by_ids(
        &self,
        ids: &[PermissionId],
    ) -> Result<Vec<Permission>, StoreError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions \
             WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        );
        let rows: Vec<DbPermission> = sqlx::query_as(&sql)
            .bind(stored_ids(ids, PermissionId::get))
            .fetch_all(&self.pool)
            .await?;
        permissions(rows)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE deleted_at IS NULL ORDER BY id"
        );
        let rows: Vec<DbPermission> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        permissions(rows)
    }

    async fn insert_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Option<Permission>, StoreError> {
        let sql = format!(
            "INSERT INTO permissions (code, name, resource, action, description, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (code) WHERE deleted_at IS NULL DO NOTHING \
             RETURNING {PERMISSION_COLUMNS}"
        );
        let row: Option<DbPermission> = sqlx::query_as(&sql)
            .bind(permission.code.as_str())
            .bind(&permission.name)
            .bind(permission.code.resource())
            .bind(permission.code.action())
            .bind(&permission.description)
            .bind(permission.status.as_i16())
            .fetch_optional(&self.pool)
            .await?;
        row.map(DbPermission::into_permission).transpose()
    }

    async fn update_permission(
        &self,
        permission: Permission,
    ) -> Result<Option<Permission>, StoreError> {
        let Some(id) = stored(permission.id.get()) else {
            return Ok(None);
        };
        let sql = format!(
            "UPDATE permissions SET code = $2, name = $3, resource = $4, action = $5, \
             description = $6, status = $7, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {PERMISSION_COLUMNS}"
        );
        let result: Result<Option<DbPermission>, sqlx::Error> = sqlx::query_as(&sql)
            .bind(id)
            .bind(permission.code.as_str())
            .bind(&permission.name)
            .bind(permission.code.resource())
            .bind(permission.code.action())
            .bind(&permission.description)
            .bind(permission.status.as_i16())
            .fetch_optional(&self.pool)
            .await;
        match result {
            Ok(row) => row.map(DbPermission::into_permission).transpose(),
            Err(error) if is_unique_violation(&error) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn soft_delete_permission(&self, permission: PermissionId) -> Result<bool, StoreError> {
        let Some(permission) = stored(permission.get()) else {
            return Ok(false);
        };
        let result = sqlx::query(
            "UPDATE permissions SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(permission)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl GrantStore for PostgresStore {
    async fn add_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1, UNNEST($2::BIGINT[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(to_db(role.get())?)
        .bind(to_db_ids(permissions, PermissionId::get)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<(), StoreError> {
        let Some(role) = stored(role.get()) else {
            return Ok(());
        };
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)")
            .bind(role)
            .bind(stored_ids(permissions, PermissionId::get))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn role_permissions(&self, role: RoleId) -> Result<Vec<Permission>, StoreError> {
        let Some(role) = stored(role.get()) else {
            return Ok(Vec::new());
        };
        let rows: Vec<DbPermission> = sqlx::query_as(
            "SELECT p.id, p.code, p.name, p.resource, p.action, p.description, p.status, \
                    p.created_at, p.updated_at \
             FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = $1 AND p.deleted_at IS NULL \
             ORDER BY p.id",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        permissions(rows)
    }

    async fn role_permission_codes(&self, role: RoleId) -> Result<Vec<PermissionCode>, StoreError> {
        let Some(role) = stored(role.get()) else {
            return Ok(Vec::new());
        };
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT p.code FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = $1 AND p.status = 1 AND p.deleted_at IS NULL \
             ORDER BY p.code",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        codes(rows)
    }

    async fn add_user_role(&self, user: UserId, role: RoleId) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(to_db(user.get())?)
        .bind(to_db(role.get())?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_user_role(&self, user: UserId, role: RoleId) -> Result<(), StoreError> {
        let (Some(user), Some(role)) = (stored(user.get()), stored(role.get())) else {
            return Ok(());
        };
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user)
            .bind(role)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn user_role_ids(&self, user: UserId) -> Result<Vec<RoleId>, StoreError> {
        let Some(user) = stored(user.get()) else {
            return Ok(Vec::new());
        };
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT ur.role_id FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1 AND r.deleted_at IS NULL \
             ORDER BY ur.role_id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|id| from_db(id).map(RoleId::new))
            .collect()
    }

    async fn user_permission_codes(&self, user: UserId) -> Result<Vec<PermissionCode>, StoreError> {
        let Some(user) = stored(user.get()) else {
            return Ok(Vec::new());
        };
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT p.code FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id \
             JOIN role_permissions rp ON rp.role_id = r.id \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE ur.user_id = $1 \
               AND r.status = 1 AND r.deleted_at IS NULL \
               AND p.status = 1 AND p.deleted_at IS NULL \
             ORDER BY p.code",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        codes(rows)
    }

    async fn has_permission(
        &self,
        user: UserId,
        code: &PermissionCode,
    ) -> Result<bool, StoreError> {
        let Some(user) = stored(user.get()) else {
            return Ok(false);
        };
        let granted: bool = sqlx::query_scalar(
            "SELECT EXISTS ( \
                SELECT 1 FROM user_roles ur \
                JOIN roles r ON r.id = ur.role_id \
                JOIN role_permissions rp ON rp.role_id = r.id \
                JOIN permissions p ON p.id = rp.permission_id \
                WHERE ur.user_id = $1 AND p.code = $2 \
                  AND r.status = 1 AND r.deleted_at IS NULL \
                  AND p.status = 1 AND p.deleted_at IS NULL \
             )",
        )
        .bind(user)
        .bind(code.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_outside_bigint_range_are_rejected() {
        assert_eq!(to_db(42).unwrap(), 42);
        assert!(to_db(u64::MAX).is_err());
        assert!(from_db(-1).is_err());
    }

    #[test]
    fn unstorable_ids_read_as_absent() {
        let max = i64::MAX as u64;
        assert_eq!(stored(max), Some(i64::MAX));
        assert_eq!(stored(max + 1), None);
        let ids = [RoleId::new(3), RoleId::new(u64::MAX), RoleId::new(5)];
        assert_eq!(stored_ids(&ids, RoleId::get), vec![3, 5]);
    }

    #[test]
    fn role_rows_with_invalid_names_fail_to_decode() {
        let row = DbRole {
            id: 1,
            name: "not a name".into(),
            display_name: String::new(),
            description: String::new(),
            status: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(row.into_role().is_err());
    }

    #[test]
    fn permission_rows_decode_status() {
        let row = DbPermission {
            id: 3,
            code: "article:write".into(),
            name: "Write".into(),
            resource: "article".into(),
            action: "write".into(),
            description: String::new(),
            status: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let permission = row.into_permission().unwrap();
        assert_eq!(permission.id, PermissionId::new(3));
        assert_eq!(permission.status, Status::Disabled);
    }
}
