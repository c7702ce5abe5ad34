//! Role-based authorization with a cache-aside permission layer.
//!
//! Users hold roles, roles hold permissions, and a permission is identified
//! by a `resource:action` code. [`Engine`] answers "does this user hold this
//! permission" from a pluggable grant store and keeps four cached views in
//! front of it: a user's role ids, a role's permission codes, a user's
//! aggregated permission codes and single check results.
//!
//! Store failures are never reported as a denial: they surface as
//! [`Error::StoreUnavailable`]. Cache failures are logged and read as misses.
//!
//! # Examples
//!
//! Basic flow with the in-memory store and cache (default features):
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "memory-cache"))]
//! # futures::executor::block_on(async {
//! use rs_rbac::{
//!     EngineBuilder, MemoryCache, MemoryStore, NewPermission, NewRole, PermissionCode,
//!     RoleName, UserId,
//! };
//!
//! let engine = EngineBuilder::new(MemoryStore::new())
//!     .cache(MemoryCache::new(10_000))
//!     .build();
//! let editor = engine
//!     .create_role(NewRole::new(RoleName::try_from("editor")?, "Editor"))
//!     .await?;
//! let write = PermissionCode::try_from("article:write")?;
//! let permission = engine
//!     .create_permission(NewPermission::new(write.clone(), "Write articles"))
//!     .await?;
//! engine.assign_permissions_to_role(editor.id, &[permission.id]).await?;
//! engine.assign_role_to_user(UserId::new(42), editor.id).await?;
//!
//! assert!(engine.check_permission(UserId::new(42), &write).await?);
//! # Ok::<(), rs_rbac::Error>(())
//! # });
//! ```
//!
//! Cache settings can be read from the environment:
//! ```no_run
//! use rs_rbac::CacheConfig;
//! let config = CacheConfig::from_env().unwrap_or_default();
//! # let _ = config;
//! ```
#![forbid(unsafe_code)]

mod cache;
mod config;
mod engine;
mod error;
mod model;
mod permission;
mod permission_cache;
mod store;
mod types;

#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

#[cfg(feature = "postgres-store")]
mod postgres_store;

#[cfg(feature = "redis-cache")]
mod redis_cache;

#[cfg(feature = "axum")]
pub mod axum;

pub use crate::cache::{Cache, NoCache};
pub use crate::config::CacheConfig;
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{CacheError, Error, Result, StoreError};
pub use crate::model::{
    NewPermission, NewRole, Permission, PermissionUpdate, Role, RoleUpdate, RoleWithPermissions,
    Status,
};
pub use crate::permission::PermissionCode;
pub use crate::permission_cache::{CacheStats, PermissionCache};
pub use crate::store::{GrantStore, PermissionStore, RoleStore, Store};
pub use crate::types::{PermissionId, RoleId, RoleName, UserId};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::MemoryCache;

#[cfg(feature = "postgres-store")]
pub use crate::postgres_store::PostgresStore;

#[cfg(feature = "redis-cache")]
pub use crate::redis_cache::RedisCache;
