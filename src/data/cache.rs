//! In-memory TTL cache
//!
//! Volatile and cleared on restart. Shields the record store from
//! repeated reads of the same users.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::metrics::{CACHE_EVICTIONS_TOTAL, CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CACHE_SIZE};

/// How many entries a capacity eviction inspects when looking for the
/// oldest one
const EVICTION_SAMPLE: usize = 64;

// =============================================================================
// Cache entry
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// TTL cache
// =============================================================================

/// Bounded map with per-entry expiry
///
/// Expired entries read as misses but stay in the map until they are
/// overwritten, pruned, or pushed out by capacity pressure. When a new
/// key arrives at capacity, expired entries are dropped first; if none
/// have expired, the oldest insertion among a bounded sample is evicted.
pub struct TtlCache<K, V> {
    /// Label for metrics and logs
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache holding at most `max_entries` items
    pub fn new(name: &'static str, max_entries: usize) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up a live entry
    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = self.entries.read().await;
        let result = entries
            .get(key)
            .filter(|entry| entry.is_valid(Instant::now()))
            .map(|entry| entry.value.clone());

        if result.is_some() {
            CACHE_HITS_TOTAL.with_label_values(&[self.name]).inc();
        } else {
            CACHE_MISSES_TOTAL.with_label_values(&[self.name]).inc();
        }

        result
    }

    /// Insert or replace an entry and restart its TTL
    pub async fn put(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let pruned = Self::prune_expired_locked(&mut entries, now);
            if pruned == 0 && Self::evict_oldest_locked(&mut entries) {
                CACHE_EVICTIONS_TOTAL.with_label_values(&[self.name]).inc();
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );

        CACHE_SIZE
            .with_label_values(&[self.name])
            .set(entries.len() as i64);
    }

    /// Drop a single entry
    pub async fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(key).is_some();

        CACHE_SIZE
            .with_label_values(&[self.name])
            .set(entries.len() as i64);
        removed
    }

    /// Drop every entry
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();

        CACHE_SIZE.with_label_values(&[self.name]).set(0);
        tracing::debug!(cache = self.name, removed, "Cleared cache");
        removed
    }

    /// Prune expired entries
    ///
    /// Called periodically by the maintenance task.
    pub async fn prune_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = Self::prune_expired_locked(&mut entries, Instant::now());

        CACHE_SIZE
            .with_label_values(&[self.name])
            .set(entries.len() as i64);
        if removed > 0 {
            tracing::debug!(cache = self.name, removed, "Pruned expired cache entries");
        }

        removed
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let now = Instant::now();
        let total = entries.len();
        let valid = entries.values().filter(|e| e.is_valid(now)).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
            max_entries: self.max_entries,
        }
    }

    fn prune_expired_locked(entries: &mut HashMap<K, CacheEntry<V>>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(now));
        before - entries.len()
    }

    fn evict_oldest_locked(entries: &mut HashMap<K, CacheEntry<V>>) -> bool {
        let Some(oldest_key) = entries
            .iter()
            .take(EVICTION_SAMPLE)
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        entries.remove(&oldest_key);
        true
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of entries, expired ones included
    pub total_entries: usize,
    /// Number of valid (non-expired) entries
    pub valid_entries: usize,
    /// Number of expired entries still held
    pub expired_entries: usize,
    pub max_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache(max_entries: usize) -> TtlCache<String, u32> {
        TtlCache::new("test", max_entries)
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_put_returns_stored_value() {
        let cache = cache(8);
        cache.put("alice".to_string(), 1, Duration::from_secs(300)).await;
        assert_eq!(cache.get("alice").await, Some(1));

        cache.put("alice".to_string(), 2, Duration::from_secs(300)).await;
        assert_eq!(cache.get("alice").await, Some(2));
        assert_eq!(cache.get("bob").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_stops_hitting_once_ttl_elapses() {
        let cache = cache(8);
        cache.put("alice".to_string(), 1, Duration::from_secs(300)).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("alice").await, Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("alice").await, None);

        // Still physically present until pruned
        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.expired_entries, 1);

        assert_eq!(cache.prune_expired().await, 1);
        assert_eq!(cache.stats().await.total_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn put_refreshes_expiry() {
        let cache = cache(8);
        cache.put("alice".to_string(), 1, Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put("alice".to_string(), 1, Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("alice").await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest_entry_when_nothing_expired() {
        let cache = cache(2);
        cache.put("a".to_string(), 1, Duration::from_secs(300)).await;
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.put("b".to_string(), 2, Duration::from_secs(300)).await;
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.put("c".to_string(), 3, Duration::from_secs(300)).await;

        assert_eq!(cache.stats().await.total_entries, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_drops_expired_entries_first() {
        let cache = cache(2);
        cache.put("short".to_string(), 1, Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.put("long".to_string(), 2, Duration::from_secs(1000)).await;

        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put("new".to_string(), 3, Duration::from_secs(300)).await;

        assert_eq!(cache.get("long").await, Some(2));
        assert_eq!(cache.get("new").await, Some(3));
        assert_eq!(cache.stats().await.total_entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_key_at_capacity_does_not_evict() {
        let cache = cache(2);
        cache.put("a".to_string(), 1, Duration::from_secs(300)).await;
        cache.put("b".to_string(), 2, Duration::from_secs(300)).await;
        cache.put("a".to_string(), 10, Duration::from_secs(300)).await;

        assert_eq!(cache.get("a").await, Some(10));
        assert_eq!(cache.get("b").await, Some(2));
    }

    #[tokio::test]
    async fn invalidate_and_clear_remove_entries() {
        let cache = cache(8);
        cache.put("a".to_string(), 1, Duration::from_secs(300)).await;
        cache.put("b".to_string(), 2, Duration::from_secs(300)).await;

        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));

        cache.put("c".to_string(), 3, Duration::from_secs(300)).await;
        assert_eq!(cache.clear().await, 2);
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn concurrent_puts_respect_capacity() {
        let cache = Arc::new(cache(16));

        let tasks: Vec<_> = (0..64u32)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = format!("user-{}", i % 32);
                    cache.put(key.clone(), i, Duration::from_secs(60)).await;
                    let _ = cache.get(&key).await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let stats = cache.stats().await;
        assert!(stats.total_entries <= 16);
        assert_eq!(stats.max_entries, 16);
    }
}
