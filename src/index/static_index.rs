//! Value index over the whole snapshot, built a chunk at a time.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::dataset::Snapshot;

use super::fields::{extract, FieldContext, FieldKey, ValueSet};

/// Completed static index.
#[derive(Clone, Debug)]
pub struct StaticIndex {
    generation: u64,
    dataset_size: usize,
    hidden_signature: u64,
    include_taxes: bool,
    values: FxHashMap<FieldKey, Arc<[String]>>,
}

impl StaticIndex {
    /// Snapshot generation the index was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true when the index may answer for `snap`: same hidden groups,
    /// same price mode and a dataset size within `max_drift` of the build.
    pub fn usable(&self, snap: &Snapshot, include_taxes: bool, max_drift: f64) -> bool {
        if self.hidden_signature != snap.hidden_signature() || self.include_taxes != include_taxes {
            return false;
        }
        drift(self.dataset_size, snap.total_rows()) <= max_drift
    }

    /// Cached list for `field`. `visits` is never indexed.
    pub fn values(&self, field: FieldKey) -> Option<Arc<[String]>> {
        self.values.get(&field).cloned()
    }
}

/// Relative size change between two dataset sizes.
pub fn drift(built: usize, current: usize) -> f64 {
    if built == current {
        return 0.0;
    }
    if built == 0 {
        return f64::INFINITY;
    }
    (built as f64 - current as f64).abs() / built as f64
}

/// In-progress static index build.
#[derive(Debug)]
pub struct StaticIndexBuild {
    generation: u64,
    dataset_size: usize,
    hidden_signature: u64,
    include_taxes: bool,
    cursor: usize,
    sets: FxHashMap<FieldKey, ValueSet>,
}

impl StaticIndexBuild {
    /// Starts a build over `snap`.
    pub fn new(snap: &Snapshot, include_taxes: bool) -> Self {
        Self {
            generation: snap.generation(),
            dataset_size: snap.total_rows(),
            hidden_signature: snap.hidden_signature(),
            include_taxes,
            cursor: 0,
            sets: FxHashMap::default(),
        }
    }

    /// Generation being indexed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Price mode being indexed.
    pub fn include_taxes(&self) -> bool {
        self.include_taxes
    }

    /// Rows processed so far.
    pub fn progress(&self) -> usize {
        self.cursor
    }

    /// Scans up to `budget` more rows. Returns true once every row is indexed.
    pub fn step(&mut self, snap: &Snapshot, budget: usize) -> bool {
        let ctx = FieldContext::new(self.include_taxes);
        let end = (self.cursor + budget.max(1)).min(snap.len());
        for idx in self.cursor..end {
            for field in FieldKey::ALL {
                if field == FieldKey::Visits {
                    continue;
                }
                let value = extract(snap, idx, field, &ctx);
                self.sets.entry(field).or_default().add(&value);
            }
        }
        self.cursor = end;
        self.cursor >= snap.len()
    }

    /// Seals the build.
    pub fn finish(self) -> StaticIndex {
        let mut values: FxHashMap<FieldKey, Arc<[String]>> = self
            .sets
            .into_iter()
            .map(|(field, set)| (field, set.finish(field).into()))
            .collect();
        for field in FieldKey::ALL {
            if field != FieldKey::Visits {
                values.entry(field).or_insert_with(|| Vec::new().into());
            }
        }
        StaticIndex {
            generation: self.generation,
            dataset_size: self.dataset_size,
            hidden_signature: self.hidden_signature,
            include_taxes: self.include_taxes,
            values,
        }
    }
}
