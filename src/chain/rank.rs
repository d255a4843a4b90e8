//! Next-leg candidate ranking.

use std::cmp::Ordering;

use serde::Serialize;
use time::Date;

use crate::dataset::{RoomCategory, RowMeta};
use crate::types::RowId;

use super::link::Connection;

/// Match quality of a candidate against the current last leg.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchTier {
    /// Same ship, room category and guest count.
    Perfect,
    /// Same ship.
    SameShip,
    /// Different ship in the same port.
    SideBySide,
}

impl MatchTier {
    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Perfect => "perfect",
            MatchTier::SameShip => "same-ship",
            MatchTier::SideBySide => "side-by-side",
        }
    }

    /// Classifies `candidate` as a follower of `last`.
    pub fn classify(last: &RowMeta, candidate: &RowMeta, connection: Connection) -> Self {
        match connection {
            Connection::SideBySide => MatchTier::SideBySide,
            Connection::SameShip if same_room(last, candidate) && last.guests_key == candidate.guests_key => {
                MatchTier::Perfect
            }
            Connection::SameShip => MatchTier::SameShip,
        }
    }
}

fn same_room(a: &RowMeta, b: &RowMeta) -> bool {
    match (a.room, b.room) {
        (RoomCategory::Unknown, RoomCategory::Unknown) => a.room_key == b.room_key,
        (x, y) => x == y,
    }
}

/// One possible next leg.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Row to append.
    pub row_id: RowId,
    /// Offer code of the row.
    pub offer_code: String,
    /// Match quality.
    pub tier: MatchTier,
    /// Room category of the row.
    #[serde(skip)]
    pub room: RoomCategory,
    /// Sail date of the row.
    #[serde(skip)]
    pub start: Option<Date>,
    /// Longest chain reachable from the row, counting the row itself.
    pub depth: u32,
    /// Legs that could still follow the row.
    pub more_connections: u32,
    /// Set when nothing can follow the row.
    pub terminal: bool,
}

impl Candidate {
    /// Builds a candidate from its metadata and depth.
    pub fn new(row_id: RowId, last: &RowMeta, meta: &RowMeta, connection: Connection, depth: u32) -> Self {
        let depth = depth.max(1);
        Self {
            row_id,
            offer_code: meta.offer_code.clone(),
            tier: MatchTier::classify(last, meta, connection),
            room: meta.room,
            start: meta.start,
            depth,
            more_connections: depth - 1,
            terminal: depth == 1,
        }
    }
}

/// Presentation order: tier, then higher room category, then longer reach,
/// then earlier sail date, then row id.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    a.tier
        .cmp(&b.tier)
        .then_with(|| b.room.cmp(&a.room))
        .then_with(|| b.depth.cmp(&a.depth))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.row_id.cmp(&b.row_id))
}

/// Sorts candidates into presentation order.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(compare);
}
