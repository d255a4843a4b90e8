#![forbid(unsafe_code)]

//! Read-only row dataset shared by the filter and chain subsystems.
//!
//! The data-sync layer supplies rows through [`RowSource`]. Every refresh
//! publishes a new immutable [`Snapshot`]: de-duplicated by row id, with hidden
//! rows removed, and with per-row metadata memoised lazily for the lifetime
//! of the snapshot.

/// Hidden-group rules.
pub mod hidden;
/// Itinerary lookup collaborator.
pub mod itinerary;
/// Derived row metadata.
pub mod meta;
/// Row data model.
pub mod row;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::types::{Result, RowId};

pub use hidden::{HiddenGroup, HiddenGroupKey, HiddenGroups};
pub use itinerary::{ItineraryLookup, MemoryItineraries, NoItineraries};
pub use meta::{RoomCategory, RowMeta};
pub use row::{ItineraryDay, Offer, Row, Sailing};

/// Supplier of the current row list and hidden-group membership.
pub trait RowSource {
    /// Returns the current rows. Duplicates by id are tolerated.
    fn rows(&self) -> Result<Vec<Row>>;

    /// Returns true when the row identified by `key` belongs to a hidden group.
    fn is_hidden(&self, key: &HiddenGroupKey) -> bool;

    /// Signature of the active hidden-group set; changes whenever the set does.
    fn hidden_signature(&self) -> u64;
}

/// Row source backed by an owned row list and hidden-group set.
#[derive(Clone, Debug, Default)]
pub struct StaticRowSource {
    /// Rows returned on every pull.
    pub rows: Vec<Row>,
    /// Active hidden groups.
    pub hidden: HiddenGroups,
}

impl StaticRowSource {
    /// Creates a source with no hidden groups.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            hidden: HiddenGroups::new(),
        }
    }
}

impl RowSource for StaticRowSource {
    fn rows(&self) -> Result<Vec<Row>> {
        Ok(self.rows.clone())
    }

    fn is_hidden(&self, key: &HiddenGroupKey) -> bool {
        self.hidden.is_hidden(key)
    }

    fn hidden_signature(&self) -> u64 {
        self.hidden.signature()
    }
}

/// Computes the hidden-group identity of a row.
pub fn hidden_key(row: &Row) -> HiddenGroupKey {
    let sailing = &row.sailing;
    let ship_key = sailing
        .ship_code
        .as_deref()
        .map(meta::key)
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| meta::key(&sailing.ship_name));
    let sail_date = meta::parse_date(&sailing.sail_date)
        .map(|date| date.to_string())
        .unwrap_or_else(|| sailing.sail_date.trim().to_owned());
    HiddenGroupKey {
        offer_code: meta::key(&row.offer.code),
        ship_key,
        sail_date,
    }
}

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

/// Immutable view of the visible rows at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    id: u64,
    generation: u64,
    total_rows: usize,
    hidden_signature: u64,
    rows: Vec<Row>,
    positions: FxHashMap<RowId, usize>,
    metas: Vec<OnceLock<RowMeta>>,
}

impl Snapshot {
    /// Builds a snapshot from already visible rows, with no hidden groups.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::build(0, rows, |_| false, HiddenGroups::new().signature())
    }

    fn build<F>(generation: u64, rows: Vec<Row>, hidden: F, hidden_signature: u64) -> Self
    where
        F: Fn(&HiddenGroupKey) -> bool,
    {
        let mut seen = FxHashSet::default();
        let mut unique = Vec::with_capacity(rows.len());
        for row in rows {
            if seen.insert(row.id.clone()) {
                unique.push(row);
            }
        }
        let total_rows = unique.len();
        let visible: Vec<Row> = unique
            .into_iter()
            .filter(|row| !hidden(&hidden_key(row)))
            .collect();
        let positions = visible
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.id.clone(), idx))
            .collect();
        let metas = (0..visible.len()).map(|_| OnceLock::new()).collect();
        Self {
            id: NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed),
            generation,
            total_rows,
            hidden_signature,
            rows: visible,
            positions,
            metas,
        }
    }

    /// Process-unique identity of this snapshot, used to key derived caches.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Monotonic generation assigned by [`Dataset::refresh`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of de-duplicated rows before hidden groups were applied.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Signature of the hidden-group set applied to this snapshot.
    pub fn hidden_signature(&self) -> u64 {
        self.hidden_signature
    }

    /// Visible rows in supplier order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of visible rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when no row is visible.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a row id, if visible.
    pub fn position(&self, id: &RowId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Looks up a visible row by id.
    pub fn get(&self, id: &RowId) -> Option<&Row> {
        self.position(id).map(|idx| &self.rows[idx])
    }

    /// Row at `idx`.
    pub fn row(&self, idx: usize) -> &Row {
        &self.rows[idx]
    }

    /// Metadata of the row at `idx`, computed on first access.
    pub fn meta(&self, idx: usize) -> &RowMeta {
        self.metas[idx].get_or_init(|| RowMeta::from_row(&self.rows[idx]))
    }
}

/// Owner of the current snapshot.
#[derive(Debug)]
pub struct Dataset {
    current: Arc<Snapshot>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self {
            current: Arc::new(Snapshot::from_rows(Vec::new())),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current)
    }

    /// Re-pulls rows from `source` and publishes a new snapshot.
    pub fn refresh(&mut self, source: &dyn RowSource) -> Result<Arc<Snapshot>> {
        let rows = source.rows()?;
        let pulled = rows.len();
        let generation = self.current.generation + 1;
        let snapshot = Snapshot::build(
            generation,
            rows,
            |key| source.is_hidden(key),
            source.hidden_signature(),
        );
        debug!(
            generation,
            pulled,
            unique = snapshot.total_rows(),
            visible = snapshot.len(),
            "dataset.refresh"
        );
        self.current = Arc::new(snapshot);
        Ok(self.snapshot())
    }
}
