//! In-memory cache tier - stands in for Redis when it is unavailable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use newsfeed_core::ports::{CacheError, CacheTier};

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Writes between purges of expired entries.
const PURGE_EVERY: usize = 64;

/// In-memory cache tier using a HashMap behind an async RwLock.
///
/// Data is per-process and lost on restart. Expired entries are dropped when
/// read and swept out every [`PURGE_EVERY`] writes, so keys that are never
/// read again do not accumulate.
pub struct InMemoryCache {
    store: RwLock<HashMap<String, MemoryEntry>>,
    writes: AtomicUsize,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired(now));
        let removed = before - store.len();
        if removed > 0 {
            tracing::debug!(removed, "Purged expired memory cache entries");
        }
        removed
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheTier for InMemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let store = self.store.read().await;
            match store.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it under the write lock, re-checking in case it was just replaced.
        let mut store = self.store.write().await;
        if store.get(key).is_some_and(|e| e.is_expired(now)) {
            store.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut store = self.store.write().await;
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            store.retain(|_, entry| !entry.is_expired(now));
        }
        store.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| now + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::new();
        cache.set("key1", "value1", None).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = InMemoryCache::new();
        cache.set("key1", "value1", None).await.unwrap();
        cache.delete("key1").await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), None);

        // Deleting again is fine
        cache.delete("key1").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_removed() {
        let cache = InMemoryCache::new();
        cache
            .set("key1", "value1", Some(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("key1").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_writes_sweep_out_unread_expired_entries() {
        let cache = InMemoryCache::new();
        for i in 0..10 {
            cache
                .set(&format!("stale-{i}"), "v", Some(Duration::from_millis(5)))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..PURGE_EVERY {
            cache.set(&format!("live-{i}"), "v", None).await.unwrap();
        }

        assert_eq!(cache.len().await, PURGE_EVERY);
        assert_eq!(cache.get("live-0").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_entries() {
        let cache = InMemoryCache::new();
        cache
            .set("short", "v", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        cache.set("forever", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("forever").await.unwrap(), Some("v".to_string()));
    }
}
