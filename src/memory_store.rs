use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{NewPermission, NewRole, Permission, Role, Status};
use crate::permission::PermissionCode;
use crate::store::{GrantStore, PermissionStore, RoleStore};
use crate::types::{PermissionId, RoleId, RoleName, UserId};

/// In-memory grant store for tests and demos.
///
/// Clones share the same tables.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    join_queries: AtomicUsize,
}

#[derive(Debug, Default)]
struct Tables {
    last_role_id: u64,
    last_permission_id: u64,
    roles: BTreeMap<RoleId, Row<Role>>,
    permissions: BTreeMap<PermissionId, Row<Permission>>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
    user_roles: BTreeSet<(UserId, RoleId)>,
}

#[derive(Debug)]
struct Row<T> {
    record: T,
    deleted_at: Option<DateTime<Utc>>,
}

impl<T> Row<T> {
    fn live(&self) -> Option<&T> {
        self.deleted_at.is_none().then_some(&self.record)
    }
}

impl Tables {
    fn live_role(&self, role: RoleId) -> Option<&Role> {
        self.roles.get(&role).and_then(Row::live)
    }

    fn live_permission(&self, permission: PermissionId) -> Option<&Permission> {
        self.permissions.get(&permission).and_then(Row::live)
    }

    fn role_enabled(&self, role: RoleId) -> bool {
        self.live_role(role)
            .is_some_and(|role| role.status.is_enabled())
    }

    fn name_taken(&self, name: &RoleName, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .filter_map(Row::live)
            .any(|role| &role.name == name && Some(role.id) != except)
    }

    fn code_taken(&self, code: &PermissionCode, except: Option<PermissionId>) -> bool {
        self.permissions
            .values()
            .filter_map(Row::live)
            .any(|permission| &permission.code == code && Some(permission.id) != except)
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails while `on` is true.
    pub fn set_unavailable(&self, on: bool) {
        self.inner.unavailable.store(on, Ordering::SeqCst);
    }

    /// Number of join queries answered so far.
    pub fn join_queries(&self) -> usize {
        self.inner.join_queries.load(Ordering::SeqCst)
    }

    /// Changes a role's status directly in the store.
    pub fn set_role_status(&self, role: RoleId, status: Status) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        Ok(match tables.roles.get_mut(&role) {
            Some(row) if row.deleted_at.is_none() => {
                row.record.status = status;
                row.record.updated_at = Utc::now();
                true
            }
            _ => false,
        })
    }

    /// Changes a permission's status directly in the store.
    pub fn set_permission_status(
        &self,
        permission: PermissionId,
        status: Status,
    ) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        Ok(match tables.permissions.get_mut(&permission) {
            Some(row) if row.deleted_at.is_none() => {
                row.record.status = status;
                row.record.updated_at = Utc::now();
                true
            }
            _ => false,
        })
    }

    /// Returns whether a user-role row exists.
    pub fn has_user_role(&self, user: UserId, role: RoleId) -> Result<bool, StoreError> {
        Ok(self.read()?.user_roles.contains(&(user, role)))
    }

    fn available(&self) -> Result<(), StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err("memory store unavailable".into());
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.available()?;
        self.inner
            .tables
            .read()
            .map_err(|_| "memory store lock poisoned".into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.available()?;
        self.inner
            .tables
            .write()
            .map_err(|_| "memory store lock poisoned".into())
    }

    fn join(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        let guard = self.read()?;
        self.inner.join_queries.fetch_add(1, Ordering::SeqCst);
        Ok(guard)
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn role_by_id(&self, role: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.read()?.live_role(role).cloned())
    }

    async fn role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .roles
            .values()
            .filter_map(Row::live)
            .find(|role| &role.name == name)
            .cloned())
    }

    async fn roles_by_ids(&self, roles: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let tables = self.read()?;
        let wanted: BTreeSet<RoleId> = roles.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|role| tables.live_role(role).cloned())
            .collect())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .roles
            .values()
            .filter_map(Row::live)
            .cloned()
            .collect())
    }

    async fn insert_role(&self, role: NewRole) -> Result<Option<Role>, StoreError> {
        let mut tables = self.write()?;
        if tables.name_taken(&role.name, None) {
            return Ok(None);
        }
        tables.last_role_id += 1;
        let now = Utc::now();
        let record = Role {
            id: RoleId::new(tables.last_role_id),
            name: role.name,
            display_name: role.display_name,
            description: role.description,
            status: role.status,
            created_at: now,
            updated_at: now,
        };
        tables.roles.insert(
            record.id,
            Row {
                record: record.clone(),
                deleted_at: None,
            },
        );
        Ok(Some(record))
    }

    async fn update_role(&self, role: Role) -> Result<Option<Role>, StoreError> {
        let mut tables = self.write()?;
        if tables.live_role(role.id).is_none() || tables.name_taken(&role.name, Some(role.id)) {
            return Ok(None);
        }
        let Some(row) = tables.roles.get_mut(&role.id) else {
            return Ok(None);
        };
        row.record = Role {
            created_at: row.record.created_at,
            updated_at: Utc::now(),
            ..role
        };
        Ok(Some(row.record.clone()))
    }

    async fn soft_delete_role(&self, role: RoleId) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        Ok(match tables.roles.get_mut(&role) {
            Some(row) if row.deleted_at.is_none() => {
                row.deleted_at = Some(Utc::now());
                true
            }
            _ => false,
        })
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn permission_by_id(
        &self,
        permission: PermissionId,
    ) -> Result<Option<Permission>, StoreError> {
        Ok(self.read()?.live_permission(permission).cloned())
    }

    async fn permission_by_code(
        &self,
        code: &PermissionCode,
    ) -> Result<Option<Permission>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .permissions
            .values()
            .filter_map(Row::live)
            .find(|permission| &permission.code == code)
            .cloned())
    }

    async fn permissions_by_ids(
        &self,
        permissions: &[PermissionId],
    ) -> Result<Vec<Permission>, StoreError> {
        let tables = self.read()?;
        let wanted: BTreeSet<PermissionId> = permissions.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|permission| tables.live_permission(permission).cloned())
            .collect())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .permissions
            .values()
            .filter_map(Row::live)
            .cloned()
            .collect())
    }

    async fn insert_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Option<Permission>, StoreError> {
        let mut tables = self.write()?;
        if tables.code_taken(&permission.code, None) {
            return Ok(None);
        }
        tables.last_permission_id += 1;
        let now = Utc::now();
        let record = Permission {
            id: PermissionId::new(tables.last_permission_id),
            resource: permission.code.resource().to_string(),
            action: permission.code.action().to_string(),
            code: permission.code,
            name: permission.name,
            description: permission.description,
            status: permission.status,
            created_at: now,
            updated_at: now,
        };
        tables.permissions.insert(
            record.id,
            Row {
                record: record.clone(),
                deleted_at: None,
            },
        );
        Ok(Some(record))
    }

    async fn update_permission(
        &self,
        permission: Permission,
    ) -> Result<Option<Permission>, StoreError> {
        let mut tables = self.write()?;
        if tables.live_permission(permission.id).is_none()
            || tables.code_taken(&permission.code, Some(permission.id))
        {
            return Ok(None);
        }
        let Some(row) = tables.permissions.get_mut(&permission.id) else {
            return Ok(None);
        };
        row.record = Permission {
            resource: permission.code.resource().to_string(),
            action: permission.code.action().to_string(),
            created_at: row.record.created_at,
            updated_at: Utc::now(),
            ..permission
        };
        Ok(Some(row.record.clone()))
    }

    async fn soft_delete_permission(&self, permission: PermissionId) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        Ok(match tables.permissions.get_mut(&permission) {
            Some(row) if row.deleted_at.is_none() => {
                row.deleted_at = Some(Utc::now());
                true
            }
            _ => false,
        })
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn add_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        for permission in permissions {
            tables.role_permissions.insert((role, *permission));
        }
        Ok(())
    }

    async fn remove_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        for permission in permissions {
            tables.role_permissions.remove(&(role, *permission));
        }
        Ok(())
    }

    async fn role_permissions(&self, role: RoleId) -> Result<Vec<Permission>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .role_permissions
            .range((role, PermissionId::new(0))..=(role, PermissionId::new(u64::MAX)))
            .filter_map(|(_, permission)| tables.live_permission(*permission).cloned())
            .collect())
    }

    async fn role_permission_codes(&self, role: RoleId) -> Result<Vec<PermissionCode>, StoreError> {
        let tables = self.join()?;
        let codes: BTreeSet<PermissionCode> = tables
            .role_permissions
            .range((role, PermissionId::new(0))..=(role, PermissionId::new(u64::MAX)))
            .filter_map(|(_, permission)| tables.live_permission(*permission))
            .filter(|permission| permission.status.is_enabled())
            .map(|permission| permission.code.clone())
            .collect();
        Ok(codes.into_iter().collect())
    }

    async fn add_user_role(&self, user: UserId, role: RoleId) -> Result<(), StoreError> {
        self.write()?.user_roles.insert((user, role));
        Ok(())
    }

    async fn remove_user_role(&self, user: UserId, role: RoleId) -> Result<(), StoreError> {
        self.write()?.user_roles.remove(&(user, role));
        Ok(())
    }

    async fn user_role_ids(&self, user: UserId) -> Result<Vec<RoleId>, StoreError> {
        let tables = self.join()?;
        Ok(tables
            .user_roles
            .range((user, RoleId::new(0))..=(user, RoleId::new(u64::MAX)))
            .map(|(_, role)| *role)
            .filter(|role| tables.live_role(*role).is_some())
            .collect())
    }

    async fn user_permission_codes(&self, user: UserId) -> Result<Vec<PermissionCode>, StoreError> {
        let tables = self.join()?;
        let mut codes = BTreeSet::new();
        for (_, role) in tables
            .user_roles
            .range((user, RoleId::new(0))..=(user, RoleId::new(u64::MAX)))
        {
            if !tables.role_enabled(*role) {
                continue;
            }
            let granted = tables
                .role_permissions
                .range((*role, PermissionId::new(0))..=(*role, PermissionId::new(u64::MAX)))
                .filter_map(|(_, permission)| tables.live_permission(*permission))
                .filter(|permission| permission.status.is_enabled())
                .map(|permission| permission.code.clone());
            codes.extend(granted);
        }
        Ok(codes.into_iter().collect())
    }

    async fn has_permission(
        &self,
        user: UserId,
        code: &PermissionCode,
    ) -> Result<bool, StoreError> {
        let tables = self.join()?;
        let Some(permission) = tables
            .permissions
            .values()
            .filter_map(Row::live)
            .find(|permission| &permission.code == code && permission.status.is_enabled())
        else {
            return Ok(false);
        };
        Ok(tables
            .user_roles
            .range((user, RoleId::new(0))..=(user, RoleId::new(u64::MAX)))
            .any(|(_, role)| {
                tables.role_enabled(*role)
                    && tables.role_permissions.contains(&(*role, permission.id))
            }))
    }
}
