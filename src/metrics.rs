//! Engine activity hooks for cache sizing and diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking cache behaviour and session activity in the engine.
///
/// Implementations receive a callback for every value-list lookup, depth
/// query, predicate commit and chain save. The data can be used to size
/// caches or to spot recomputation storms in the presentation layer.
pub trait EngineMetrics: Send + Sync {
    /// Records a value-list lookup.
    ///
    /// # Parameters
    /// * `source` - Which path answered: "static", "dynamic" or "visits".
    /// * `cached` - Whether the answer came from a cache.
    fn value_lookup(&self, source: &'static str, cached: bool);

    /// Records a depth query for one row.
    fn depth_query(&self, cached: bool);

    /// Records a predicate becoming complete.
    fn predicate_committed(&self);

    /// Records a chain being saved.
    fn chain_saved(&self, legs: usize);
}

/// A no-op implementation of [`EngineMetrics`] that discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl EngineMetrics for NoopMetrics {
    fn value_lookup(&self, _source: &'static str, _cached: bool) {}
    fn depth_query(&self, _cached: bool) {}
    fn predicate_committed(&self) {}
    fn chain_saved(&self, _legs: usize) {}
}

/// A thread-safe counter-based implementation of [`EngineMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Lookups answered by the static index.
    pub static_lookups: AtomicU64,

    /// Lookups answered by the dynamic path.
    pub dynamic_lookups: AtomicU64,

    /// Lookups for the `visits` field.
    pub visits_lookups: AtomicU64,

    /// Value lookups served from a cache.
    pub value_cache_hits: AtomicU64,

    /// Value lookups that required a scan.
    pub value_cache_misses: AtomicU64,

    /// Depth queries served from a memo table.
    pub depth_cache_hits: AtomicU64,

    /// Depth queries that required traversal.
    pub depth_cache_misses: AtomicU64,

    /// Predicates committed.
    pub predicates_committed: AtomicU64,

    /// Chains saved.
    pub chains_saved: AtomicU64,

    /// Total legs across saved chains.
    pub chain_legs_saved: AtomicU64,
}

impl EngineMetrics for CounterMetrics {
    fn value_lookup(&self, source: &'static str, cached: bool) {
        match source {
            "static" => {
                self.static_lookups.fetch_add(1, Ordering::Relaxed);
            }
            "dynamic" => {
                self.dynamic_lookups.fetch_add(1, Ordering::Relaxed);
            }
            "visits" => {
                self.visits_lookups.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        if cached {
            self.value_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.value_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn depth_query(&self, cached: bool) {
        if cached {
            self.depth_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.depth_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn predicate_committed(&self) {
        self.predicates_committed.fetch_add(1, Ordering::Relaxed);
    }

    fn chain_saved(&self, legs: usize) {
        self.chains_saved.fetch_add(1, Ordering::Relaxed);
        self.chain_legs_saved
            .fetch_add(legs as u64, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
pub fn default_metrics() -> Arc<dyn EngineMetrics> {
    Arc::new(NoopMetrics)
}
