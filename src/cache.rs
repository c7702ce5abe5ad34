use crate::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// Key-value backend behind the permission cache.
///
/// Values are opaque strings. Implementations must be safe for concurrent use;
/// atomicity is only required per key.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets a live value.
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError>;

    /// Sets a value that expires after `ttl`.
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> std::result::Result<(), CacheError>;

    /// Deletes every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> std::result::Result<usize, CacheError>;

    /// Counts live keys starting with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> std::result::Result<usize, CacheError>;
}

/// No-op cache implementation. Every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl Cache for NoCache {
    async fn get(&self, _key: &str) -> std::result::Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: String,
        _ttl: Duration,
    ) -> std::result::Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> std::result::Result<(), CacheError> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> std::result::Result<usize, CacheError> {
        Ok(0)
    }

    async fn count_prefix(&self, _prefix: &str) -> std::result::Result<usize, CacheError> {
        Ok(0)
    }
}

#[async_trait]
impl<T> Cache for std::sync::Arc<T>
where
    T: Cache + ?Sized,
{
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), CacheError> {
        (**self).delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> std::result::Result<usize, CacheError> {
        (**self).delete_prefix(prefix).await
    }

    async fn count_prefix(&self, prefix: &str) -> std::result::Result<usize, CacheError> {
        (**self).count_prefix(prefix).await
    }
}
