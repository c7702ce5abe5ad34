use crate::error::StoreError;
use crate::model::{NewPermission, NewRole, Permission, Role};
use crate::permission::PermissionCode;
use crate::types::{PermissionId, RoleId, RoleName, UserId};
use async_trait::async_trait;

/// Store interface for role records.
///
/// Reads never return soft-deleted roles.
#[async_trait]
pub trait RoleStore {
    /// Returns a role by id.
    async fn role_by_id(&self, role: RoleId) -> std::result::Result<Option<Role>, StoreError>;

    /// Returns a role by exact, case-sensitive name.
    async fn role_by_name(&self, name: &RoleName) -> std::result::Result<Option<Role>, StoreError>;

    /// Returns the roles among `roles` that exist, in id order.
    async fn roles_by_ids(&self, roles: &[RoleId]) -> std::result::Result<Vec<Role>, StoreError>;

    /// Lists all roles in id order.
    async fn list_roles(&self) -> std::result::Result<Vec<Role>, StoreError>;

    /// Inserts a role. Returns `None` when the name is already taken.
    async fn insert_role(&self, role: NewRole) -> std::result::Result<Option<Role>, StoreError>;

    /// Replaces a role's mutable fields. Returns `None` when the role is gone
    /// or the new name is already taken.
    async fn update_role(&self, role: Role) -> std::result::Result<Option<Role>, StoreError>;

    /// Soft-deletes a role. Returns whether a live role was deleted.
    async fn soft_delete_role(&self, role: RoleId) -> std::result::Result<bool, StoreError>;
}

/// Store interface for permission records.
///
/// Reads never return soft-deleted permissions.
#[async_trait]
pub trait PermissionStore {
    /// Returns a permission by id.
    async fn permission_by_id(
        &self,
        permission: PermissionId,
    ) -> std::result::Result<Option<Permission>, StoreError>;

    /// Returns a permission by code.
    async fn permission_by_code(
        &self,
        code: &PermissionCode,
    ) -> std::result::Result<Option<Permission>, StoreError>;

    /// Returns the permissions among `permissions` that exist, in id order.
    async fn permissions_by_ids(
        &self,
        permissions: &[PermissionId],
    ) -> std::result::Result<Vec<Permission>, StoreError>;

    /// Lists all permissions in id order.
    async fn list_permissions(&self) -> std::result::Result<Vec<Permission>, StoreError>;

    /// Inserts a permission. Returns `None` when the code is already taken.
    async fn insert_permission(
        &self,
        permission: NewPermission,
    ) -> std::result::Result<Option<Permission>, StoreError>;

    /// Replaces a permission's mutable fields. Returns `None` when the
    /// permission is gone or the new code is already taken.
    async fn update_permission(
        &self,
        permission: Permission,
    ) -> std::result::Result<Option<Permission>, StoreError>;

    /// Soft-deletes a permission. Returns whether a live permission was deleted.
    async fn soft_delete_permission(
        &self,
        permission: PermissionId,
    ) -> std::result::Result<bool, StoreError>;
}

/// Store interface for the role-permission and user-role join tables.
#[async_trait]
pub trait GrantStore {
    /// Adds role-permission rows. Existing rows are kept.
    async fn add_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> std::result::Result<(), StoreError>;

    /// Deletes role-permission rows. Missing rows are ignored.
    async fn remove_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> std::result::Result<(), StoreError>;

    /// Returns every live permission assigned to a role, regardless of status.
    async fn role_permissions(
        &self,
        role: RoleId,
    ) -> std::result::Result<Vec<Permission>, StoreError>;

    /// Returns codes of enabled permissions assigned to a role, sorted.
    async fn role_permission_codes(
        &self,
        role: RoleId,
    ) -> std::result::Result<Vec<PermissionCode>, StoreError>;

    /// Adds a user-role row. An existing row is kept.
    async fn add_user_role(
        &self,
        user: UserId,
        role: RoleId,
    ) -> std::result::Result<(), StoreError>;

    /// Deletes a user-role row. A missing row is ignored.
    async fn remove_user_role(
        &self,
        user: UserId,
        role: RoleId,
    ) -> std::result::Result<(), StoreError>;

    /// Returns ids of live roles assigned to a user, sorted.
    async fn user_role_ids(&self, user: UserId) -> std::result::Result<Vec<RoleId>, StoreError>;

    /// Returns the distinct codes reachable through enabled roles and enabled
    /// permissions, sorted.
    async fn user_permission_codes(
        &self,
        user: UserId,
    ) -> std::result::Result<Vec<PermissionCode>, StoreError>;

    /// Returns whether an enabled role held by the user grants the enabled
    /// permission `code`.
    async fn has_permission(
        &self,
        user: UserId,
        code: &PermissionCode,
    ) -> std::result::Result<bool, StoreError>;
}

/// Composite store trait.
pub trait Store: RoleStore + PermissionStore + GrantStore + Send + Sync {}

impl<T> Store for T where T: RoleStore + PermissionStore + GrantStore + Send + Sync {}
