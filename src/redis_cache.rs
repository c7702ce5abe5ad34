//! Redis-backed cache backend.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::cache::Cache;
use crate::error::CacheError;

const SCAN_BATCH: usize = 100;

/// Redis implementation of the [`Cache`] backend.
///
/// Prefix deletion walks the keyspace with `SCAN MATCH` and removes each
/// batch with `DEL`, so it never blocks the server the way `KEYS` would.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Creates a backend from a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Opens a client for `redis_url` and wraps it.
    pub fn open(redis_url: &str) -> crate::Result<Self> {
        redis::Client::open(redis_url)
            .map(Self::new)
            .map_err(|error| crate::Error::InvalidConfig(format!("invalid redis url: {error}")))
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| format!("failed to connect to redis: {error}").into())
    }

    async fn scan_prefix(
        connection: &mut MultiplexedConnection,
        prefix: &str,
    ) -> Result<Vec<String>, CacheError> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(connection)
                .await
                .map_err(|error| format!("failed to scan '{pattern}': {error}"))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection().await?;
        connection
            .get(key)
            .await
            .map_err(|error| format!("failed to read cache entry '{key}': {error}").into())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let Some(millis) = expiry_millis(ttl) else {
            return Ok(());
        };

        let mut connection = self.connection().await?;
        let () = connection
            .pset_ex(key, value, millis)
            .await
            .map_err(|error| format!("failed to write cache entry '{key}': {error}"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        let _: usize = connection
            .del(key)
            .await
            .map_err(|error| format!("failed to delete cache entry '{key}': {error}"))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut connection = self.connection().await?;
        let keys = Self::scan_prefix(&mut connection, prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut removed = 0;
        for batch in keys.chunks(SCAN_BATCH) {
            let deleted: usize = connection
                .del(batch.to_vec())
                .await
                .map_err(|error| format!("failed to delete keys under '{prefix}': {error}"))?;
            removed += deleted;
        }
        Ok(removed)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut connection = self.connection().await?;
        Ok(Self::scan_prefix(&mut connection, prefix).await?.len())
    }
}

/// `PSETEX` expiry for `ttl`, rounded up to whole milliseconds. `None` for a
/// zero TTL, which disables the write.
fn expiry_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    let millis = ttl.as_nanos().div_ceil(1_000_000);
    Some(u64::try_from(millis).unwrap_or(u64::MAX))
}

fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
