#![forbid(unsafe_code)]

//! Field value indexer.
//!
//! Answers "which distinct values does field F take among the rows the user
//! can currently see". Two paths exist: a static index built once per
//! snapshot in idle time, used while no predicate is committed, and a
//! dynamic scan of the committed-filtered rows memoised by signature.

/// FIFO value-list cache.
pub mod cache;
/// Field catalogue and value extraction.
pub mod fields;
/// Chunked static index.
pub mod static_index;
/// Itinerary hydration retries.
pub mod visits;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::EngineOptions;
use crate::dataset::{ItineraryLookup, Snapshot};
use crate::metrics::EngineMetrics;
use crate::types::ProfileKey;

pub use cache::{ValueCache, ValueCacheKey, ValueCacheStats};
pub use fields::{FieldContext, FieldKey, FieldKind, FieldValue};
pub use static_index::{StaticIndex, StaticIndexBuild};
pub use visits::{VisitsRetry, VisitsStatus};

/// Session state a value list depends on.
#[derive(Clone, Debug)]
pub struct ValueQuery<'a> {
    /// Profile owning the session.
    pub profile: &'a ProfileKey,
    /// Field to list.
    pub field: FieldKey,
    /// Number of committed predicates.
    pub committed: usize,
    /// Signature of the committed predicate set.
    pub committed_signature: u64,
    /// Whether prices include taxes and fees.
    pub include_taxes: bool,
}

/// Which path produced a value list.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueSource {
    /// Static index.
    Static,
    /// Scan of the filtered rows.
    Dynamic,
}

/// Answer of [`FieldValueIndexer::values_for`].
#[derive(Clone, Debug)]
pub struct ValueList {
    /// Ordered distinct values.
    pub values: Arc<[String]>,
    /// Path that produced the list.
    pub source: ValueSource,
    /// Set when the list came from a cache.
    pub cached: bool,
    /// For `visits`: when the next hydration attempt is due.
    pub retry_at: Option<Instant>,
}

/// Outcome of one static-index scheduling turn.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StaticStep {
    /// Nothing to build.
    Idle,
    /// More rows remain; schedule another turn.
    Pending,
    /// The index was sealed during this turn.
    Ready,
}

/// Cache-backed source of distinct field values.
pub struct FieldValueIndexer {
    cache: ValueCache,
    static_index: Option<StaticIndex>,
    build: Option<StaticIndexBuild>,
    visits: VisitsRetry,
    drift: f64,
    chunk_rows: usize,
    metrics: Arc<dyn EngineMetrics>,
}

impl FieldValueIndexer {
    /// Creates an indexer sized by `options`.
    pub fn new(options: &EngineOptions, metrics: Arc<dyn EngineMetrics>) -> Self {
        Self {
            cache: ValueCache::new(options.value_cache_capacity),
            static_index: None,
            build: None,
            visits: VisitsRetry::new(
                options.visits_max_attempts,
                options.visits_base_delay,
                options.visits_max_delay,
            ),
            drift: options.static_index_drift,
            chunk_rows: options.static_index_chunk_rows,
            metrics,
        }
    }

    /// Starts a static-index build when `snap` is not covered by the current
    /// index or build. Returns true when a build turn should be scheduled.
    pub fn observe_snapshot(&mut self, snap: &Snapshot, include_taxes: bool) -> bool {
        let indexed = self
            .static_index
            .as_ref()
            .is_some_and(|idx| idx.generation() == snap.generation() && idx.usable(snap, include_taxes, 0.0));
        if indexed {
            return false;
        }
        let building = self
            .build
            .as_ref()
            .is_some_and(|b| b.generation() == snap.generation() && b.include_taxes() == include_taxes);
        if !building {
            self.build = Some(StaticIndexBuild::new(snap, include_taxes));
        }
        true
    }

    /// Runs one bounded static-index turn against `snap`.
    pub fn run_static_step(&mut self, snap: &Snapshot) -> StaticStep {
        let Some(build) = self.build.as_mut() else {
            return StaticStep::Idle;
        };
        if build.generation() != snap.generation() {
            // Superseded by a newer snapshot; restart against it.
            *build = StaticIndexBuild::new(snap, build.include_taxes());
        }
        if !build.step(snap, self.chunk_rows) {
            debug!(progress = build.progress(), total = snap.len(), "index.static.step");
            return StaticStep::Pending;
        }
        let Some(build) = self.build.take() else {
            return StaticStep::Idle;
        };
        let index = build.finish();
        info!(generation = index.generation(), rows = snap.len(), "index.static.ready");
        self.static_index = Some(index);
        StaticStep::Ready
    }

    /// Returns true when a usable static index exists for `snap`.
    pub fn has_static_index(&self, snap: &Snapshot, include_taxes: bool) -> bool {
        self.static_index
            .as_ref()
            .is_some_and(|idx| idx.usable(snap, include_taxes, self.drift))
    }

    /// Hydration state of the `visits` field.
    pub fn visits_status(&self) -> VisitsStatus {
        self.visits.status()
    }

    /// Resets the hydration retry budget after a user-requested refresh.
    pub fn refresh_visits(&mut self) {
        self.visits.manual_refresh();
    }

    /// Drops every cached list.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Cache counters since the last call.
    pub fn take_cache_stats(&mut self) -> ValueCacheStats {
        self.cache.take_stats()
    }

    /// Ordered distinct values of `query.field` among `visible` rows of `snap`.
    ///
    /// `visible` holds the positions of the rows passing the committed
    /// predicates.
    pub fn values_for(
        &mut self,
        snap: &Snapshot,
        visible: &[usize],
        query: &ValueQuery<'_>,
        itineraries: &dyn ItineraryLookup,
        now: Instant,
    ) -> ValueList {
        if query.field == FieldKey::Visits {
            return self.visits_values(snap, visible, query.include_taxes, itineraries, now);
        }
        if query.committed == 0 {
            if let Some(index) = self.static_index.as_ref() {
                if index.usable(snap, query.include_taxes, self.drift) {
                    if let Some(values) = index.values(query.field) {
                        self.metrics.value_lookup("static", true);
                        return ValueList {
                            values,
                            source: ValueSource::Static,
                            cached: true,
                            retry_at: None,
                        };
                    }
                }
            }
        }
        let key = ValueCacheKey {
            profile: query.profile.clone(),
            field: query.field,
            dataset_size: snap.total_rows(),
            visible_rows: visible.len(),
            predicate_signature: query.committed_signature,
            include_taxes: query.include_taxes,
            hidden_signature: snap.hidden_signature(),
        };
        let ctx = FieldContext::new(query.include_taxes);
        let (values, cached) = self
            .cache
            .get_or_load(key, || scan(snap, visible, query.field, &ctx).0);
        self.metrics.value_lookup("dynamic", cached);
        ValueList {
            values,
            source: ValueSource::Dynamic,
            cached,
            retry_at: None,
        }
    }

    fn visits_values(
        &mut self,
        snap: &Snapshot,
        visible: &[usize],
        include_taxes: bool,
        itineraries: &dyn ItineraryLookup,
        now: Instant,
    ) -> ValueList {
        let ctx = FieldContext::new(include_taxes).with_itineraries(itineraries);
        let (values, missing) = scan(snap, visible, FieldKey::Visits, &ctx);
        self.metrics.value_lookup("visits", false);
        // Empty until every visible row is hydrated.
        let (values, retry_at) = if missing == 0 {
            self.visits.on_ready();
            (values, None)
        } else {
            let next = self.visits.on_unavailable(now);
            debug!(missing, status = ?self.visits.status(), "index.visits.unavailable");
            (Vec::new(), next)
        };
        ValueList {
            values: values.into(),
            source: ValueSource::Dynamic,
            cached: false,
            retry_at,
        }
    }
}

/// Collects the sorted distinct values of `field` over `visible` rows, and
/// counts rows whose value is not yet available.
fn scan(snap: &Snapshot, visible: &[usize], field: FieldKey, ctx: &FieldContext<'_>) -> (Vec<String>, usize) {
    let mut set = fields::ValueSet::default();
    let mut missing = 0;
    for &idx in visible {
        let value = fields::extract(snap, idx, field, ctx);
        if value == FieldValue::Unavailable {
            missing += 1;
            continue;
        }
        set.add(&value);
    }
    (set.finish(field), missing)
}
