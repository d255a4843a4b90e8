#![forbid(unsafe_code)]

//! Predicate filter engine.
//!
//! A [`FilterEngine`] owns one profile's filter session: an ordered list of
//! predicates combined with AND, at most one of which is a draft. Only
//! complete predicates take part in evaluation. Changes to the committed set
//! schedule a debounced write through a [`FilterStore`]; the host drives
//! deferred work by calling [`FilterEngine::tick`].

/// Predicate evaluation.
pub mod eval;
/// Session persistence.
pub mod persist;
/// Predicates and operators.
pub mod predicate;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineOptions;
use crate::dataset::meta::key;
use crate::dataset::{ItineraryLookup, Row, Snapshot};
use crate::index::{
    FieldContext, FieldKey, FieldValueIndexer, StaticStep, ValueQuery, ValueSource, VisitsStatus,
};
use crate::metrics::{default_metrics, EngineMetrics};
use crate::sched::{ClockRef, Paginated, Scheduler, SystemClock, TaskKey};
use crate::types::{ActionError, ActionResult, PredicateId, ProfileKey, Result};

pub use eval::{evaluate, CompiledPredicate};
pub use persist::{FilterStore, JsonFileStore, MemoryFilterStore};
pub use predicate::{committed_signature, Arity, Operator, Predicate, PredicateState};

/// Persisted filter session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    /// Whether filtering is active.
    pub enabled: bool,
    /// Predicates in creation order.
    pub predicates: Vec<Predicate>,
    /// Whether `price` includes taxes and fees.
    pub include_taxes: bool,
}

impl FilterState {
    /// The predicate being edited, if any.
    pub fn draft(&self) -> Option<&Predicate> {
        self.predicates.iter().find(|p| !p.complete)
    }

    /// Number of complete predicates.
    pub fn committed_count(&self) -> usize {
        self.predicates.iter().filter(|p| p.complete).count()
    }

    /// Signature of the complete predicates.
    pub fn signature(&self) -> u64 {
        committed_signature(&self.predicates)
    }

    /// Predicates that apply: none while disabled.
    pub fn active(&self) -> &[Predicate] {
        if self.enabled {
            self.predicates.as_slice()
        } else {
            &[]
        }
    }
}

/// Work performed by one [`FilterEngine::tick`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A debounced write was flushed.
    pub persisted: bool,
    /// Outcome of the static-index turn, if one ran.
    pub static_step: Option<StaticStep>,
    /// A `visits` hydration retry is due; suggestions for it should be re-read.
    pub visits_retry_due: bool,
}

/// Value suggestions for one field.
#[derive(Clone, Debug)]
pub struct Suggestions {
    /// Ordered distinct values, handed out in pages.
    pub values: Paginated<String>,
    /// Path that produced them.
    pub source: ValueSource,
    /// Hydration state, meaningful for `visits`.
    pub visits: VisitsStatus,
}

/// Filter session for one profile.
pub struct FilterEngine {
    profile: ProfileKey,
    options: EngineOptions,
    state: FilterState,
    next_id: u64,
    store: Box<dyn FilterStore>,
    indexer: FieldValueIndexer,
    scheduler: Scheduler,
    clock: ClockRef,
    metrics: Arc<dyn EngineMetrics>,
}

impl FilterEngine {
    /// Creates an empty session.
    pub fn new(profile: ProfileKey, options: EngineOptions, store: Box<dyn FilterStore>) -> Self {
        let metrics = default_metrics();
        Self {
            indexer: FieldValueIndexer::new(&options, Arc::clone(&metrics)),
            profile,
            options,
            state: FilterState::default(),
            next_id: 1,
            store,
            scheduler: Scheduler::new(),
            clock: Arc::new(SystemClock),
            metrics,
        }
    }

    /// Restores the stored session of `profile`, or starts an empty one.
    pub fn open(profile: ProfileKey, options: EngineOptions, store: Box<dyn FilterStore>) -> Result<Self> {
        let stored = store.load(&profile)?;
        let mut engine = Self::new(profile, options, store);
        if let Some(value) = stored {
            engine.state = persist::decode(&value);
            engine.next_id = engine.state.predicates.iter().map(|p| p.id.0).max().unwrap_or(0) + 1;
            info!(
                profile = %engine.profile,
                predicates = engine.state.predicates.len(),
                committed = engine.state.committed_count(),
                "filter.session.restored"
            );
        }
        Ok(engine)
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: ClockRef) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
        self.indexer = FieldValueIndexer::new(&self.options, Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Profile owning the session.
    pub fn profile(&self) -> &ProfileKey {
        &self.profile
    }

    /// Current session state.
    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Predicates in creation order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.state.predicates
    }

    /// Looks up a predicate.
    pub fn predicate(&self, id: PredicateId) -> Option<&Predicate> {
        self.state.predicates.iter().find(|p| p.id == id)
    }

    /// Turns filtering on.
    pub fn enable(&mut self) {
        if !self.state.enabled {
            self.state.enabled = true;
            self.schedule_persist();
        }
    }

    /// Turns filtering off without discarding predicates.
    pub fn disable(&mut self) {
        if self.state.enabled {
            self.state.enabled = false;
            self.schedule_persist();
        }
    }

    /// Drops every predicate and deletes the stored session.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear(&self.profile)?;
        self.scheduler.cancel(TaskKey::PersistFilter);
        self.state = FilterState::default();
        self.next_id = 1;
        info!(profile = %self.profile, "filter.session.cleared");
        Ok(())
    }

    /// Chooses whether `price` includes taxes and fees.
    pub fn set_include_taxes(&mut self, include: bool) {
        if self.state.include_taxes == include {
            return;
        }
        self.state.include_taxes = include;
        self.scheduler.schedule(TaskKey::StaticIndexStep, self.clock.now());
        self.schedule_persist();
    }

    /// Appends a draft predicate on `field`.
    pub fn add_predicate(&mut self, field: FieldKey) -> ActionResult<PredicateId> {
        if let Some(draft) = self.state.draft() {
            return Err(ActionError::DraftInProgress(draft.id));
        }
        let id = PredicateId(self.next_id);
        self.next_id += 1;
        self.state.predicates.push(Predicate::draft(id, field));
        debug!(id = id.0, field = %field, "filter.predicate.added");
        Ok(id)
    }

    /// Changes the operator, reopening a complete predicate.
    pub fn set_operator(&mut self, id: PredicateId, operator: Operator) -> ActionResult<()> {
        let pos = self.position(id)?;
        let next = self.state.predicates[pos].reopened().with_operator(operator)?;
        self.apply_edit(pos, next)
    }

    /// Replaces the values, reopening a complete predicate. Emptying a
    /// predicate that held values removes it.
    pub fn set_values<I, S>(&mut self, id: PredicateId, values: I) -> ActionResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pos = self.position(id)?;
        let current = &self.state.predicates[pos];
        let next = current.reopened().with_values(values)?;
        if next.values.is_empty() && !current.values.is_empty() {
            return self.remove(id);
        }
        self.apply_edit(pos, next)
    }

    /// Appends one value, reopening a complete predicate.
    pub fn add_value(&mut self, id: PredicateId, value: &str) -> ActionResult<()> {
        let pos = self.position(id)?;
        let current = &self.state.predicates[pos];
        let values = current.values.iter().map(String::as_str).chain(std::iter::once(value));
        let next = current.reopened().with_values(values)?;
        self.apply_edit(pos, next)
    }

    /// Removes one value. Removing the last value removes the predicate; a
    /// complete predicate that no longer satisfies its arity becomes a draft.
    pub fn remove_value(&mut self, id: PredicateId, value: &str) -> ActionResult<()> {
        let pos = self.position(id)?;
        let current = &self.state.predicates[pos];
        let target = key(value);
        let values: Vec<String> = current
            .values
            .iter()
            .filter(|v| key(v) != target)
            .cloned()
            .collect();
        if values.len() == current.values.len() {
            return Ok(());
        }
        if values.is_empty() {
            return self.remove(id);
        }
        let was_complete = current.complete;
        let mut next = current.with_values(values)?;
        if was_complete {
            match next.committed() {
                Ok(done) => next = done,
                Err(_) => {
                    self.ensure_single_draft(id)?;
                    next = next.reopened();
                }
            }
        }
        self.state.predicates[pos] = next;
        if was_complete {
            self.schedule_persist();
        }
        Ok(())
    }

    /// Reopens a complete predicate for editing.
    pub fn edit(&mut self, id: PredicateId) -> ActionResult<()> {
        let pos = self.position(id)?;
        if !self.state.predicates[pos].complete {
            return Ok(());
        }
        let next = self.state.predicates[pos].reopened();
        self.apply_edit(pos, next)
    }

    /// Commits a draft. Idempotent on complete predicates.
    pub fn commit(&mut self, id: PredicateId) -> ActionResult<()> {
        let pos = self.position(id)?;
        let current = &self.state.predicates[pos];
        if current.complete {
            return Ok(());
        }
        let next = current.committed()?;
        debug!(
            id = id.0,
            field = %next.field_key,
            operator = %next.operator,
            values = next.values.len(),
            "filter.predicate.committed"
        );
        self.state.predicates[pos] = next;
        self.metrics.predicate_committed();
        self.schedule_persist();
        Ok(())
    }

    /// Removes a predicate.
    pub fn remove(&mut self, id: PredicateId) -> ActionResult<()> {
        let pos = self.position(id)?;
        let removed = self.state.predicates.remove(pos);
        debug!(id = id.0, complete = removed.complete, "filter.predicate.removed");
        if removed.complete {
            self.schedule_persist();
        }
        Ok(())
    }

    /// Positions of the rows of `snap` passing the active predicates.
    ///
    /// `itineraries` resolves `visits` for rows without an inline itinerary;
    /// pass the same lookup given to [`FilterEngine::suggestions`].
    pub fn evaluate_positions(&self, snap: &Snapshot, itineraries: &dyn ItineraryLookup) -> Vec<usize> {
        let ctx = FieldContext::new(self.state.include_taxes).with_itineraries(itineraries);
        evaluate(snap, self.state.active(), &ctx)
    }

    /// Rows of `snap` passing the active predicates, in snapshot order.
    pub fn evaluate<'a>(&self, snap: &'a Snapshot, itineraries: &dyn ItineraryLookup) -> Vec<&'a Row> {
        self.evaluate_positions(snap, itineraries)
            .into_iter()
            .map(|idx| snap.row(idx))
            .collect()
    }

    /// Distinct values of `field` among the rows passing the active predicates.
    ///
    /// For `visits` a missing itinerary schedules a hydration retry.
    pub fn suggestions(&mut self, snap: &Snapshot, field: FieldKey, itineraries: &dyn ItineraryLookup) -> Suggestions {
        let visible = self.evaluate_positions(snap, itineraries);
        let active = self.state.active();
        let query = ValueQuery {
            profile: &self.profile,
            field,
            committed: active.iter().filter(|p| p.complete).count(),
            committed_signature: committed_signature(active),
            include_taxes: self.state.include_taxes,
        };
        let list = self
            .indexer
            .values_for(snap, &visible, &query, itineraries, self.clock.now());
        if let Some(at) = list.retry_at {
            self.scheduler.schedule(TaskKey::VisitsRetry, at);
        }
        Suggestions {
            values: Paginated::new(list.values, self.options.option_page_size),
            source: list.source,
            visits: self.indexer.visits_status(),
        }
    }

    /// Resets the `visits` retry budget after a user-requested refresh.
    pub fn refresh_visits(&mut self) {
        self.indexer.refresh_visits();
        self.scheduler.cancel(TaskKey::VisitsRetry);
    }

    /// Hydration state of the `visits` field.
    pub fn visits_status(&self) -> VisitsStatus {
        self.indexer.visits_status()
    }

    /// Notes a new snapshot; schedules a static-index build when needed.
    pub fn observe_snapshot(&mut self, snap: &Snapshot) {
        if self.indexer.observe_snapshot(snap, self.state.include_taxes) {
            self.scheduler.schedule(TaskKey::StaticIndexStep, self.clock.now());
        }
    }

    /// Returns true when a usable static index covers `snap`.
    pub fn has_static_index(&self, snap: &Snapshot) -> bool {
        self.indexer.has_static_index(snap, self.state.include_taxes)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Returns true while a session write is pending.
    pub fn persist_pending(&self) -> bool {
        self.scheduler.is_pending(TaskKey::PersistFilter)
    }

    /// Runs the deferred work that is due.
    pub fn tick(&mut self, snap: &Snapshot) -> Result<TickReport> {
        let now = self.clock.now();
        let mut report = TickReport::default();
        let mut failed = None;
        for task in self.scheduler.take_due(now) {
            match task {
                TaskKey::PersistFilter => match self.persist_or_retry() {
                    Ok(()) => report.persisted = true,
                    Err(err) => failed = Some(err),
                },
                TaskKey::StaticIndexStep => {
                    self.indexer.observe_snapshot(snap, self.state.include_taxes);
                    let step = self.indexer.run_static_step(snap);
                    if step == StaticStep::Pending {
                        self.scheduler.schedule(TaskKey::StaticIndexStep, now);
                    }
                    report.static_step = Some(step);
                }
                TaskKey::VisitsRetry => report.visits_retry_due = true,
            }
        }
        match failed {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Writes a pending session change immediately. Returns true when a
    /// write happened.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.scheduler.cancel(TaskKey::PersistFilter) {
            return Ok(false);
        }
        self.persist_or_retry()?;
        Ok(true)
    }

    /// A failed write stays pending for the next debounce window.
    fn persist_or_retry(&mut self) -> Result<()> {
        let result = self.persist_now();
        if let Err(err) = &result {
            warn!(profile = %self.profile, error = %err, "filter.session.persist_failed");
            self.schedule_persist();
        }
        result
    }

    fn persist_now(&mut self) -> Result<()> {
        let value = persist::encode(&self.state)?;
        self.store.save(&self.profile, &value)?;
        debug!(
            profile = %self.profile,
            predicates = self.state.predicates.len(),
            "filter.session.persisted"
        );
        Ok(())
    }

    fn schedule_persist(&mut self) {
        let at = self.clock.now() + self.options.persist_debounce;
        self.scheduler.schedule(TaskKey::PersistFilter, at);
    }

    fn position(&self, id: PredicateId) -> ActionResult<usize> {
        self.state
            .predicates
            .iter()
            .position(|p| p.id == id)
            .ok_or(ActionError::UnknownPredicate(id))
    }

    fn ensure_single_draft(&self, id: PredicateId) -> ActionResult<()> {
        match self.state.draft() {
            Some(other) if other.id != id => Err(ActionError::DraftInProgress(other.id)),
            _ => Ok(()),
        }
    }

    fn apply_edit(&mut self, pos: usize, next: Predicate) -> ActionResult<()> {
        let was_complete = self.state.predicates[pos].complete;
        if was_complete {
            self.ensure_single_draft(next.id)?;
        }
        self.state.predicates[pos] = next;
        if was_complete {
            debug!(id = self.state.predicates[pos].id.0, "filter.predicate.reopened");
            self.schedule_persist();
        }
        Ok(())
    }
}
