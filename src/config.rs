use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "rbac:";
const USER_TTL: Duration = Duration::from_secs(5 * 60);
const ROLE_TTL: Duration = Duration::from_secs(10 * 60);

/// Permission cache settings.
///
/// Each view has its own TTL. A zero TTL disables writes to that view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub(crate) namespace: String,
    pub(crate) user_roles_ttl: Duration,
    pub(crate) role_permissions_ttl: Duration,
    pub(crate) user_permissions_ttl: Duration,
    pub(crate) check_ttl: Duration,
    pub(crate) cache_empty_sets: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            user_roles_ttl: USER_TTL,
            role_permissions_ttl: ROLE_TTL,
            user_permissions_ttl: USER_TTL,
            check_ttl: USER_TTL,
            cache_empty_sets: true,
        }
    }
}

impl CacheConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads overrides from `RBAC_CACHE_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(namespace) = env::var("RBAC_CACHE_NAMESPACE") {
            config = config.namespace(namespace);
        }
        if let Some(ttl) = ttl_env("RBAC_CACHE_USER_ROLES_TTL_SECS")? {
            config.user_roles_ttl = ttl;
        }
        if let Some(ttl) = ttl_env("RBAC_CACHE_ROLE_PERMISSIONS_TTL_SECS")? {
            config.role_permissions_ttl = ttl;
        }
        if let Some(ttl) = ttl_env("RBAC_CACHE_USER_PERMISSIONS_TTL_SECS")? {
            config.user_permissions_ttl = ttl;
        }
        if let Some(ttl) = ttl_env("RBAC_CACHE_CHECK_TTL_SECS")? {
            config.check_ttl = ttl;
        }
        if let Ok(value) = env::var("RBAC_CACHE_EMPTY_SETS") {
            config.cache_empty_sets = parse_bool("RBAC_CACHE_EMPTY_SETS", &value)?;
        }
        Ok(config)
    }

    /// Sets the key namespace prepended to every cache key.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the `user_roles:<uid>` TTL.
    pub fn user_roles_ttl(mut self, ttl: Duration) -> Self {
        self.user_roles_ttl = ttl;
        self
    }

    /// Sets the `role_permissions:<rid>` TTL.
    pub fn role_permissions_ttl(mut self, ttl: Duration) -> Self {
        self.role_permissions_ttl = ttl;
        self
    }

    /// Sets the `user_permissions:<uid>` TTL.
    pub fn user_permissions_ttl(mut self, ttl: Duration) -> Self {
        self.user_permissions_ttl = ttl;
        self
    }

    /// Sets the `check:<uid>:<code>` TTL.
    pub fn check_ttl(mut self, ttl: Duration) -> Self {
        self.check_ttl = ttl;
        self
    }

    /// Controls whether empty role and permission lists are cached.
    pub fn cache_empty_sets(mut self, on: bool) -> Self {
        self.cache_empty_sets = on;
        self
    }

    /// Returns the key namespace.
    pub fn key_namespace(&self) -> &str {
        &self.namespace
    }
}

fn ttl_env(name: &str) -> Result<Option<Duration>> {
    let Ok(value) = env::var(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|err| Error::InvalidConfig(format!("invalid {name} '{value}': {err}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
