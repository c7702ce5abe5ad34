//! Typed, TTL-bounded views over a [`Cache`] backend.
//!
//! Four independent views are kept, each under its own key namespace:
//!
//! | View | Key |
//! |---|---|
//! | user roles | `<ns>user_roles:<uid>` |
//! | role permissions | `<ns>role_permissions:<rid>` |
//! | user aggregated permissions | `<ns>user_permissions:<uid>` |
//! | permission check | `<ns>check:<uid>:<code>` |
//!
//! Every method here is infallible. Backend read failures and undecodable
//! entries are logged and reported as a miss; write and delete failures are
//! logged and dropped. The cache can change latency, never an answer.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::permission::PermissionCode;
use crate::types::{RoleId, UserId};

const FORMAT_VERSION: u8 = 1;

const USER_ROLES: &str = "user_roles:";
const ROLE_PERMISSIONS: &str = "role_permissions:";
const USER_PERMISSIONS: &str = "user_permissions:";
const CHECK: &str = "check:";

const GRANTED: &str = "1";
const DENIED: &str = "0";

/// Entry counts per view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub user_roles: usize,
    pub role_permissions: usize,
    pub user_permissions: usize,
    pub permission_checks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserRolesEntry {
    v: u8,
    user: u64,
    roles: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RolePermissionsEntry {
    v: u8,
    role: u64,
    permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserPermissionsEntry {
    v: u8,
    user: u64,
    permissions: Vec<String>,
}

/// Permission cache over a key-value backend.
#[derive(Debug, Clone)]
pub struct PermissionCache<C> {
    backend: C,
    config: CacheConfig,
}

impl<C> PermissionCache<C> {
    /// Wraps a backend with the given settings.
    pub fn new(backend: C, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Returns the settings in use.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the backend.
    pub fn backend(&self) -> &C {
        &self.backend
    }

    fn user_roles_key(&self, user: UserId) -> String {
        format!("{}{USER_ROLES}{user}", self.config.namespace)
    }

    fn role_permissions_key(&self, role: RoleId) -> String {
        format!("{}{ROLE_PERMISSIONS}{role}", self.config.namespace)
    }

    fn user_permissions_key(&self, user: UserId) -> String {
        format!("{}{USER_PERMISSIONS}{user}", self.config.namespace)
    }

    fn check_prefix(&self, user: UserId) -> String {
        format!("{}{CHECK}{user}:", self.config.namespace)
    }

    fn check_key(&self, user: UserId, code: &PermissionCode) -> String {
        format!("{}{code}", self.check_prefix(user))
    }

    fn view_prefix(&self, view: &str) -> String {
        format!("{}{view}", self.config.namespace)
    }

    fn storable<T>(&self, items: &[T]) -> bool {
        self.config.cache_empty_sets || !items.is_empty()
    }
}

impl<C: Cache> PermissionCache<C> {
    /// Cached role ids held by a user.
    pub async fn user_roles(&self, user: UserId) -> Option<Vec<RoleId>> {
        let key = self.user_roles_key(user);
        let entry: UserRolesEntry = self.read(&key).await?;
        if entry.v != FORMAT_VERSION || entry.user != user.get() {
            warn!(key = %key, "discarding user roles entry with foreign owner or version");
            return None;
        }
        debug!(user_id = %user, role_count = entry.roles.len(), "user roles cache hit");
        Some(entry.roles.into_iter().map(RoleId::new).collect())
    }

    /// Stores role ids held by a user.
    pub async fn set_user_roles(&self, user: UserId, roles: &[RoleId]) {
        if !self.storable(roles) {
            return;
        }
        let entry = UserRolesEntry {
            v: FORMAT_VERSION,
            user: user.get(),
            roles: roles.iter().map(|role| role.get()).collect(),
        };
        let key = self.user_roles_key(user);
        let ttl = self.config.user_roles_ttl;
        self.write(&key, &entry, ttl).await;
    }

    /// Cached permission codes of a role.
    pub async fn role_permissions(&self, role: RoleId) -> Option<Vec<PermissionCode>> {
        let key = self.role_permissions_key(role);
        let entry: RolePermissionsEntry = self.read(&key).await?;
        if entry.v != FORMAT_VERSION || entry.role != role.get() {
            warn!(key = %key, "discarding role permissions entry with foreign owner or version");
            return None;
        }
        let codes = decode_codes(&key, entry.permissions)?;
        debug!(role_id = %role, permission_count = codes.len(), "role permissions cache hit");
        Some(codes)
    }

    /// Stores permission codes of a role.
    pub async fn set_role_permissions(&self, role: RoleId, codes: &[PermissionCode]) {
        if !self.storable(codes) {
            return;
        }
        let entry = RolePermissionsEntry {
            v: FORMAT_VERSION,
            role: role.get(),
            permissions: encode_codes(codes),
        };
        let key = self.role_permissions_key(role);
        let ttl = self.config.role_permissions_ttl;
        self.write(&key, &entry, ttl).await;
    }

    /// Cached aggregated permission codes of a user.
    pub async fn user_permissions(&self, user: UserId) -> Option<Vec<PermissionCode>> {
        let key = self.user_permissions_key(user);
        let entry: UserPermissionsEntry = self.read(&key).await?;
        if entry.v != FORMAT_VERSION || entry.user != user.get() {
            warn!(key = %key, "discarding user permissions entry with foreign owner or version");
            return None;
        }
        let codes = decode_codes(&key, entry.permissions)?;
        debug!(user_id = %user, permission_count = codes.len(), "user permissions cache hit");
        Some(codes)
    }

    /// Stores aggregated permission codes of a user.
    pub async fn set_user_permissions(&self, user: UserId, codes: &[PermissionCode]) {
        if !self.storable(codes) {
            return;
        }
        let entry = UserPermissionsEntry {
            v: FORMAT_VERSION,
            user: user.get(),
            permissions: encode_codes(codes),
        };
        let key = self.user_permissions_key(user);
        let ttl = self.config.user_permissions_ttl;
        self.write(&key, &entry, ttl).await;
    }

    /// Cached outcome of a single permission check.
    pub async fn check(&self, user: UserId, code: &PermissionCode) -> Option<bool> {
        let key = self.check_key(user, code);
        let raw = self.get_raw(&key).await?;
        let allowed = match raw.as_str() {
            GRANTED => true,
            DENIED => false,
            _ => {
                warn!(key = %key, "discarding malformed permission check entry");
                return None;
            }
        };
        debug!(user_id = %user, permission = %code, allowed, "permission check cache hit");
        Some(allowed)
    }

    /// Stores the outcome of a permission check, negative outcomes included.
    pub async fn set_check(&self, user: UserId, code: &PermissionCode, allowed: bool) {
        let key = self.check_key(user, code);
        let value = if allowed { GRANTED } else { DENIED };
        let ttl = self.config.check_ttl;
        self.set_raw(&key, value.to_string(), ttl).await;
    }

    /// Drops every user-scoped entry: roles, aggregated permissions and all
    /// permission checks of that user.
    pub async fn invalidate_user(&self, user: UserId) {
        self.delete(&self.user_roles_key(user)).await;
        self.delete(&self.user_permissions_key(user)).await;
        let prefix = self.check_prefix(user);
        let removed = match self.backend.delete_prefix(&prefix).await {
            Ok(removed) => removed,
            Err(error) => {
                warn!(
                    prefix = %prefix,
                    error = %error,
                    "failed to delete permission check entries"
                );
                0
            }
        };
        info!(user_id = %user, checks_removed = removed, "user cache invalidated");
    }

    /// Drops the role permissions entry. User-scoped entries are untouched and
    /// age out through their own TTL.
    pub async fn invalidate_role(&self, role: RoleId) {
        self.delete(&self.role_permissions_key(role)).await;
        info!(role_id = %role, "role cache invalidated");
    }

    /// Drops every entry under the namespace. Returns the number removed.
    pub async fn invalidate_all(&self) -> usize {
        let mut total = 0;
        for view in [USER_ROLES, ROLE_PERMISSIONS, USER_PERMISSIONS, CHECK] {
            let prefix = self.view_prefix(view);
            match self.backend.delete_prefix(&prefix).await {
                Ok(removed) => total += removed,
                Err(error) => {
                    warn!(prefix = %prefix, error = %error, "failed to delete cache entries")
                }
            }
        }
        info!(
            total_deleted = total,
            "all permission cache entries invalidated"
        );
        total
    }

    /// Counts live entries per view. Views whose scan fails count as zero.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            user_roles: self.count(USER_ROLES).await,
            role_permissions: self.count(ROLE_PERMISSIONS).await,
            user_permissions: self.count(USER_PERMISSIONS).await,
            permission_checks: self.count(CHECK).await,
        }
    }

    async fn count(&self, view: &str) -> usize {
        let prefix = self.view_prefix(view);
        self.backend
            .count_prefix(&prefix)
            .await
            .unwrap_or_else(|error| {
                warn!(prefix = %prefix, error = %error, "failed to count cache entries");
                0
            })
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(key = %key, error = %error, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        match self.backend.set(key, value, ttl).await {
            Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "cache entry stored"),
            Err(error) => warn!(key = %key, error = %error, "cache write failed"),
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(error) = self.backend.delete(key).await {
            warn!(key = %key, error = %error, "cache delete failed");
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(key = %key, error = %error, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn write<T: Serialize + Sync>(&self, key: &str, entry: &T, ttl: Duration) {
        match serde_json::to_string(entry) {
            Ok(raw) => self.set_raw(key, raw, ttl).await,
            Err(error) => warn!(key = %key, error = %error, "failed to encode cache entry"),
        }
    }
}

fn encode_codes(codes: &[PermissionCode]) -> Vec<String> {
    codes.iter().map(|code| code.as_str().to_string()).collect()
}

fn decode_codes(key: &str, raw: Vec<String>) -> Option<Vec<PermissionCode>> {
    raw.into_iter()
        .map(PermissionCode::new)
        .collect::<crate::Result<Vec<_>>>()
        .map_err(|error| warn!(key = %key, error = %error, "discarding entry with invalid code"))
        .ok()
}
