//! Itinerary/port timeline lookup.

use rustc_hash::FxHashMap;
use time::Date;

use super::row::ItineraryDay;

/// Source of day-by-day port timelines, typically backed by a cache that is
/// hydrated asynchronously. `None` means "not yet available", not "no ports".
pub trait ItineraryLookup {
    /// Returns the timeline for the sailing of `ship_key` leaving on `sail_date`.
    fn timeline(&self, ship_key: &str, sail_date: Date) -> Option<Vec<ItineraryDay>>;
}

/// Lookup that never has data.
#[derive(Default)]
pub struct NoItineraries;

impl ItineraryLookup for NoItineraries {
    fn timeline(&self, _ship_key: &str, _sail_date: Date) -> Option<Vec<ItineraryDay>> {
        None
    }
}

/// In-memory lookup keyed by ship key and sail date.
#[derive(Default)]
pub struct MemoryItineraries {
    entries: FxHashMap<(String, Date), Vec<ItineraryDay>>,
}

impl MemoryItineraries {
    /// Creates an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a timeline.
    pub fn insert(&mut self, ship_key: &str, sail_date: Date, days: Vec<ItineraryDay>) {
        self.entries.insert((ship_key.to_owned(), sail_date), days);
    }
}

impl ItineraryLookup for MemoryItineraries {
    fn timeline(&self, ship_key: &str, sail_date: Date) -> Option<Vec<ItineraryDay>> {
        self.entries.get(&(ship_key.to_owned(), sail_date)).cloned()
    }
}
