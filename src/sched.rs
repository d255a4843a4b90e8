//! Cooperative scheduling primitives.
//!
//! The engine never spawns threads. Deferred work is recorded as a deadline
//! per [`TaskKey`]; the host drives it by calling `tick` from its event loop.
//! Scheduling a key again supersedes the previous deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Shared clock handle.
pub type ClockRef = Arc<dyn Clock>;

/// Kinds of deferred work.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TaskKey {
    /// Debounced filter-session write.
    PersistFilter,
    /// Next chunk of the static value index.
    StaticIndexStep,
    /// Next itinerary hydration attempt for the `visits` field.
    VisitsRetry,
}

/// Last-scheduled-wins deadline table.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: FxHashMap<TaskKey, Instant>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` at `at`, replacing any earlier schedule of the same key.
    pub fn schedule(&mut self, key: TaskKey, at: Instant) {
        self.pending.insert(key, at);
    }

    /// Drops a pending task.
    pub fn cancel(&mut self, key: TaskKey) -> bool {
        self.pending.remove(&key).is_some()
    }

    /// Returns true when `key` is pending.
    pub fn is_pending(&self, key: TaskKey) -> bool {
        self.pending.contains_key(&key)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Removes and returns the tasks due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TaskKey> {
        let mut due: Vec<(Instant, TaskKey)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*at, *key))
            .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, key) in &due {
            self.pending.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}

/// Ordered list handed out in fixed-size pages.
#[derive(Clone, Debug)]
pub struct Paginated<T> {
    items: Arc<[T]>,
    page_size: usize,
    cursor: usize,
}

impl<T: Clone> Paginated<T> {
    /// Wraps `items`; a zero page size is treated as one.
    pub fn new(items: impl Into<Arc<[T]>>, page_size: usize) -> Self {
        Self {
            items: items.into(),
            page_size: page_size.max(1),
            cursor: 0,
        }
    }

    /// Total number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items not yet handed out.
    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    /// Full ordered list.
    pub fn all(&self) -> &[T] {
        &self.items
    }

    /// Next page, or `None` once exhausted.
    pub fn next_page(&mut self) -> Option<Vec<T>> {
        if self.cursor >= self.items.len() {
            return None;
        }
        let end = (self.cursor + self.page_size).min(self.items.len());
        let page = self.items[self.cursor..end].to_vec();
        self.cursor = end;
        Some(page)
    }
}
