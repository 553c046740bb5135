//! Bounded time-to-live cache used to throttle repeated alerts.

use std::hash::Hash;
use std::time::Duration;

use moka::sync::Cache;

/// Remembers keys for a fixed time window.
///
/// [`check_and_insert`](Self::check_and_insert) reports whether a key is new
/// within the window. Entries expire `ttl` after insertion; when the cache
/// is full, moka's TinyLFU policy decides what to evict.
#[derive(Debug, Clone)]
pub struct TtlCache<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    cache: Cache<K, ()>,
}

impl<K> TtlCache<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` keys for `ttl` each.
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(capacity.max(1)).time_to_live(ttl).build();
        Self { cache }
    }

    /// Record `key` and return `true` if it was not seen within the TTL.
    pub fn check_and_insert(&self, key: K) -> bool {
        self.cache.entry(key).or_insert(()).is_fresh()
    }

    /// Number of live entries, after pending evictions are applied.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_within_ttl_are_suppressed() {
        let cache = TtlCache::new(Duration::from_secs(60), 8);
        assert!(cache.check_and_insert("empty-retrieval"));
        assert!(!cache.check_and_insert("empty-retrieval"));
        assert!(cache.check_and_insert("graph-empty"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(50), 8);
        assert!(cache.check_and_insert("empty-rerank"));
        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.check_and_insert("empty-rerank"));
    }

    #[test]
    fn capacity_bounds_entry_count() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        for key in ["a", "b", "c", "d", "e"] {
            cache.check_and_insert(key);
        }
        assert!(cache.len() <= 2);
    }
}
