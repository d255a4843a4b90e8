use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::types::ProfileKey;

use super::fields::FieldKey;

/// Everything a dynamic value list depends on.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ValueCacheKey {
    /// Profile owning the session.
    pub profile: ProfileKey,
    /// Field being listed.
    pub field: FieldKey,
    /// De-duplicated dataset size.
    pub dataset_size: usize,
    /// Rows passing the committed predicates.
    pub visible_rows: usize,
    /// Signature of the committed predicate set.
    pub predicate_signature: u64,
    /// Whether prices include taxes and fees.
    pub include_taxes: bool,
    /// Signature of the hidden-group set.
    pub hidden_signature: u64,
}

/// Cache hit/miss counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ValueCacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
}

/// Bounded value-list cache. Reads never promote entries, so eviction drops
/// the oldest insertion first.
pub struct ValueCache {
    entries: LruCache<ValueCacheKey, Arc<[String]>>,
    stats: ValueCacheStats,
}

impl ValueCache {
    /// Creates a cache holding at most `capacity` lists.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: ValueCacheStats::default(),
        }
    }

    /// Number of cached lists.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears all cached entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = ValueCacheStats::default();
    }

    /// Records current stats and resets the internal counters.
    pub fn take_stats(&mut self) -> ValueCacheStats {
        let stats = self.stats;
        self.stats = ValueCacheStats::default();
        stats
    }

    /// Returns true when `key` is cached, without touching stats.
    pub fn contains(&self, key: &ValueCacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Retrieves the list for `key`, computing it via `loader` on miss.
    pub fn get_or_load<F>(&mut self, key: ValueCacheKey, loader: F) -> (Arc<[String]>, bool)
    where
        F: FnOnce() -> Vec<String>,
    {
        if let Some(entry) = self.entries.peek(&key) {
            self.stats.hits += 1;
            return (Arc::clone(entry), true);
        }
        let values: Arc<[String]> = loader().into();
        self.entries.push(key, Arc::clone(&values));
        self.stats.misses += 1;
        (values, false)
    }
}
