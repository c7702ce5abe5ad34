use crate::types::{PermissionId, RoleId, UserId};
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Cache-backend error type.
///
/// Never surfaced by the engine; cache failures are logged and absorbed.
pub type CacheError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The grant store could not answer. Callers must not read this as a denial.
    #[error("grant store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    /// Referenced role does not exist.
    #[error("role {role} not found")]
    RoleNotFound { role: RoleId },
    /// A non-deleted role already uses this name.
    #[error("role name '{name}' already exists")]
    RoleAlreadyExists { name: String },
    /// Referenced permission does not exist.
    #[error("permission {permission} not found")]
    PermissionNotFound { permission: PermissionId },
    /// A non-deleted permission already uses this code.
    #[error("permission code '{code}' already exists")]
    PermissionAlreadyExists { code: String },
    /// Confirmed negative outcome of a permission check.
    #[error("permission denied: user {user} lacks '{permission}'")]
    PermissionDenied { user: UserId, permission: String },
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Invalid permission input.
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true when the failure is infrastructural rather than a decision.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
