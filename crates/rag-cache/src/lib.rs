//! Bounded LRU cache with optional per-entry TTL (C10), plus a
//! null-object implementation for when caching is disabled.

use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use lru::LruCache;
use rag_core::{CacheEntry, CacheProvider, CacheStats};
use tokio::sync::Mutex;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

struct Inner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

pub struct LruTtlCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V: Clone + Send + Sync> LruTtlCache<V> {
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::new(1).expect("1 is nonzero"));
        Self {
            inner: Mutex::new(Inner { entries: LruCache::new(capacity), hits: 0, misses: 0 }),
        }
    }
}

#[async_trait]
impl<V: Clone + Send + Sync> CacheProvider<V> for LruTtlCache<V> {
    async fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let expired = matches!(inner.entries.peek(key), Some(e) if e.expires_at.is_some_and(|exp| now_ms() > exp));
        if expired {
            inner.entries.pop(key);
        }
        match inner.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    async fn set(&self, key: String, value: V, ttl_ms: Option<u64>) {
        let mut inner = self.inner.lock().await;
        let entry = CacheEntry {
            value,
            expires_at: ttl_ms.map(|ttl| now_ms() + ttl),
            last_access_epoch: now_ms(),
        };
        inner.entries.put(key, entry);
    }

    async fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.entries.pop(key).is_some()
    }

    async fn has(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let expired = matches!(inner.entries.peek(key), Some(e) if e.expires_at.is_some_and(|exp| now_ms() > exp));
        if expired {
            inner.entries.pop(key);
            return false;
        }
        inner.entries.peek(key).is_some()
    }

    async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    async fn size(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.entries.len()
    }

    async fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats { hits: inner.hits, misses: inner.misses, size: inner.entries.len() }
    }
}

/// No-op cache: always a miss, never stores anything. Valid wherever a
/// `CacheProvider` is required but caching is disabled.
pub struct NullCache<V>(PhantomData<V>);

impl<V> Default for NullCache<V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<V> NullCache<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync> CacheProvider<V> for NullCache<V> {
    async fn get(&self, _key: &str) -> Option<V> {
        None
    }

    async fn set(&self, _key: String, _value: V, _ttl_ms: Option<u64>) {}

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn has(&self, _key: &str) -> bool {
        false
    }

    async fn clear(&self) {}

    async fn size(&self) -> usize {
        0
    }

    async fn get_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_is_a_hit_and_promotes_key() {
        let cache: LruTtlCache<String> = LruTtlCache::new(2);
        cache.set("a".to_string(), "1".to_string(), None).await;
        cache.set("b".to_string(), "2".to_string(), None).await;
        assert_eq!(cache.get("a").await, Some("1".to_string()));
        // "a" is now MRU; inserting "c" should evict "b", not "a".
        cache.set("c".to_string(), "3".to_string(), None).await;
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("a").await, Some("1".to_string()));
    }

    #[tokio::test]
    async fn eviction_respects_max_size() {
        let cache: LruTtlCache<i32> = LruTtlCache::new(1);
        cache.set("a".to_string(), 1, None).await;
        cache.set("b".to_string(), 2, None).await;
        assert_eq!(cache.size().await, 1);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
    }

    #[tokio::test]
    async fn expired_entry_is_transparently_removed_on_access() {
        let cache: LruTtlCache<i32> = LruTtlCache::new(4);
        cache.set("a".to_string(), 1, Some(0)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.has("a").await, false);
    }

    #[tokio::test]
    async fn clear_resets_stats_and_data() {
        let cache: LruTtlCache<i32> = LruTtlCache::new(4);
        cache.set("a".to_string(), 1, None).await;
        cache.get("a").await;
        cache.get("missing").await;
        cache.clear().await;
        let stats = cache.get_stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn hit_rate_reflects_hits_and_misses() {
        let cache: LruTtlCache<i32> = LruTtlCache::new(4);
        cache.set("a".to_string(), 1, None).await;
        cache.get("a").await;
        cache.get("missing").await;
        let stats = cache.get_stats().await;
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn null_cache_is_always_a_miss() {
        let cache: NullCache<i32> = NullCache::new();
        cache.set("a".to_string(), 1, None).await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.size().await, 0);
        assert!(!cache.has("a").await);
    }
}
