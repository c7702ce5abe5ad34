use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::CacheError;

/// In-memory cache backend.
///
/// This is a simple LRU map with a TTL per entry. It is intended for tests
/// and single-process deployments. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<CacheState>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    /// Creates a new cache with the given capacity.
    ///
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState::default())),
            capacity,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, CacheError> {
        self.inner
            .lock()
            .map_err(|_| "memory cache lock poisoned".into())
    }

    fn remove_key(state: &mut CacheState, key: &str) -> bool {
        if state.entries.remove(key).is_some() {
            state.order.retain(|existing| existing != key);
            return true;
        }
        false
    }

    fn touch(state: &mut CacheState, key: &str) {
        state.order.retain(|existing| existing != key);
        state.order.push_back(key.to_string());
    }

    fn prune_expired(state: &mut CacheState, now: Instant) {
        state.entries.retain(|_, entry| entry.expires_at > now);
        let CacheState { entries, order } = state;
        order.retain(|key| entries.contains_key(key));
    }

    fn evict_if_needed(state: &mut CacheState, capacity: usize) {
        while state.entries.len() > capacity {
            if let Some(key) = state.order.pop_front() {
                state.entries.remove(&key);
            } else {
                break;
            }
        }
    }

    fn live_keys_with_prefix(state: &CacheState, prefix: &str, now: Instant) -> Vec<String> {
        state
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if self.capacity == 0 {
            return Ok(None);
        }

        let now = Instant::now();
        let mut guard = self.lock()?;

        let value = match guard.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at <= now => None,
            Some(entry) => Some(entry.value.clone()),
        };
        match value {
            Some(value) => {
                Self::touch(&mut guard, key);
                Ok(Some(value))
            }
            None => {
                Self::remove_key(&mut guard, key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        if self.capacity == 0 || ttl.is_zero() {
            return Ok(());
        }

        let now = Instant::now();
        let mut guard = self.lock()?;
        Self::prune_expired(&mut guard, now);

        guard.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Self::touch(&mut guard, key);
        Self::evict_if_needed(&mut guard, self.capacity);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut guard = self.lock()?;
        Self::remove_key(&mut guard, key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut guard = self.lock()?;
        let keys: Vec<String> = guard
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        let mut removed = 0;
        for key in keys {
            if Self::remove_key(&mut guard, &key) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let guard = self.lock()?;
        Ok(Self::live_keys_with_prefix(&guard, prefix, Instant::now()).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn lru_should_evict_least_recently_used() {
        let cache = MemoryCache::new(2);

        block_on(cache.set("a", "1".into(), MINUTE)).unwrap();
        block_on(cache.set("b", "2".into(), MINUTE)).unwrap();
        let _ = block_on(cache.get("a"));
        block_on(cache.set("c", "3".into(), MINUTE)).unwrap();

        assert!(block_on(cache.get("b")).unwrap().is_none());
        assert_eq!(block_on(cache.get("a")).unwrap().as_deref(), Some("1"));
        assert_eq!(block_on(cache.get("c")).unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn ttl_should_expire_entries_independently() {
        let cache = MemoryCache::new(8);

        block_on(cache.set("short", "1".into(), Duration::from_millis(10))).unwrap();
        block_on(cache.set("long", "2".into(), MINUTE)).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(block_on(cache.get("short")).unwrap().is_none());
        assert!(block_on(cache.get("long")).unwrap().is_some());
    }

    #[test]
    fn zero_ttl_is_not_stored() {
        let cache = MemoryCache::new(8);
        block_on(cache.set("k", "v".into(), Duration::ZERO)).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn delete_prefix_should_only_touch_matching_keys() {
        let cache = MemoryCache::new(8);
        block_on(cache.set("rbac:check:1:a:read", "1".into(), MINUTE)).unwrap();
        block_on(cache.set("rbac:check:1:a:write", "0".into(), MINUTE)).unwrap();
        block_on(cache.set("rbac:check:12:a:read", "1".into(), MINUTE)).unwrap();

        let removed = block_on(cache.delete_prefix("rbac:check:1:")).unwrap();

        assert_eq!(removed, 2);
        let other_user = block_on(cache.get("rbac:check:12:a:read")).unwrap();
        assert!(other_user.is_some());
        assert_eq!(block_on(cache.count_prefix("rbac:check:")).unwrap(), 1);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = MemoryCache::new(0);
        block_on(cache.set("k", "v".into(), MINUTE)).unwrap();
        assert!(block_on(cache.get("k")).unwrap().is_none());
    }
}
