//! Interactive chain-building session.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize, Serializer};
use time::Date;
use tracing::{debug, info};

use crate::config::EngineOptions;
use crate::dataset::{ItineraryDay, ItineraryLookup, Row, Snapshot};
use crate::metrics::{default_metrics, EngineMetrics};
use crate::sched::Paginated;
use crate::types::{ActionError, ActionResult, BerthError, ChainId, ProfileKey, Result, RowId};

use super::depth::{DepthCache, Exclusion};
use super::link::{connection, Connection, LinkPolicy};
use super::rank::{rank, Candidate};

/// Session phase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChainPhase {
    /// No chain open.
    Idle,
    /// Only the root leg is selected.
    RootSelected,
    /// At least one leg follows the root.
    Building,
    /// The chain was delivered under this id.
    Saved(ChainId),
    /// The session was discarded.
    Closed,
}

impl ChainPhase {
    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ChainPhase::Idle => "idle",
            ChainPhase::RootSelected => "root-selected",
            ChainPhase::Building => "building",
            ChainPhase::Saved(_) => "saved",
            ChainPhase::Closed => "closed",
        }
    }

    fn is_open(&self) -> bool {
        matches!(self, ChainPhase::RootSelected | ChainPhase::Building)
    }
}

/// A delivered chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedChain {
    /// Short identifier, `B2B-` followed by six characters.
    pub id: ChainId,
    /// Owning profile.
    pub profile: ProfileKey,
    /// Full row snapshots in chain order.
    pub legs: Vec<Row>,
    /// Number of legs.
    pub leg_count: usize,
    /// Longest chain reachable from this prefix, counting its own legs.
    pub depth: u32,
    /// Whether side-by-side connections were allowed.
    pub allow_side_by_side: bool,
}

/// Destination of saved chains.
pub trait ChainSink {
    /// Persists one chain.
    fn save_chain(&mut self, chain: &SavedChain) -> Result<()>;
}

/// Sink keeping chains in memory.
#[derive(Debug, Default)]
pub struct MemoryChainSink {
    /// Chains in save order.
    pub chains: Vec<SavedChain>,
}

impl ChainSink for MemoryChainSink {
    fn save_chain(&mut self, chain: &SavedChain) -> Result<()> {
        self.chains.push(chain.clone());
        Ok(())
    }
}

/// Sink appending one JSON document per line to a file.
#[derive(Debug, Clone)]
pub struct JsonChainSink {
    path: PathBuf,
}

impl JsonChainSink {
    /// Appends to `path`, creating it and its directory when missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every chain written so far.
    pub fn read_all(&self) -> Result<Vec<SavedChain>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<SavedChain>(line).map_err(BerthError::from))
            .collect()
    }
}

impl ChainSink for JsonChainSink {
    fn save_chain(&mut self, chain: &SavedChain) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut line = serde_json::to_vec(chain)?;
        line.push(b'\n');
        file.write_all(&line)?;
        Ok(())
    }
}

/// Day-by-day view of one leg.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegTimeline {
    /// Row of the leg.
    pub row_id: RowId,
    /// Ship display name.
    pub ship: String,
    /// Sail date.
    #[serde(serialize_with = "iso_date")]
    pub start: Option<Date>,
    /// Return date.
    #[serde(serialize_with = "iso_date")]
    pub end: Option<Date>,
    /// How the leg connects to the previous one; `None` for the root.
    #[serde(skip)]
    pub connection: Option<Connection>,
    /// Itinerary, or `None` while it is not hydrated.
    pub days: Option<Vec<ItineraryDay>>,
}

// `YYYY-MM-DD`, the same shape rows carry their sail dates in.
fn iso_date<S: Serializer>(date: &Option<Date>, out: S) -> std::result::Result<S::Ok, S::Error> {
    match date {
        Some(date) => out.serialize_str(&date.to_string()),
        None => out.serialize_none(),
    }
}

const ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Chain-building session for one profile.
pub struct ChainBuilder {
    profile: ProfileKey,
    phase: ChainPhase,
    chain: Vec<RowId>,
    policy: LinkPolicy,
    page_size: usize,
    depths: DepthCache,
    rng: ChaCha8Rng,
    metrics: Arc<dyn EngineMetrics>,
}

impl ChainBuilder {
    /// Creates an idle session.
    pub fn new(profile: ProfileKey, options: &EngineOptions) -> Self {
        let metrics = default_metrics();
        Self {
            profile,
            phase: ChainPhase::Idle,
            chain: Vec::new(),
            policy: LinkPolicy::new(options.allow_side_by_side_default),
            page_size: options.option_page_size,
            depths: DepthCache::new(options.depth_cache_capacity, Arc::clone(&metrics)),
            rng: ChaCha8Rng::from_entropy(),
            metrics,
        }
    }

    /// Makes chain ids reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Replaces the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn EngineMetrics>, options: &EngineOptions) -> Self {
        self.depths = DepthCache::new(options.depth_cache_capacity, Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> &ChainPhase {
        &self.phase
    }

    /// Legs in order; the root first.
    pub fn chain(&self) -> &[RowId] {
        &self.chain
    }

    /// Whether side-by-side connections are allowed.
    pub fn allow_side_by_side(&self) -> bool {
        self.policy.allow_side_by_side
    }

    /// Active link policy.
    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Starts a chain at `root`.
    pub fn open(&mut self, snap: &Snapshot, root: &RowId) -> ActionResult<()> {
        if self.phase.is_open() {
            return Err(self.invalid("open"));
        }
        if snap.position(root).is_none() {
            return Err(ActionError::UnknownRow(root.clone()));
        }
        self.chain = vec![root.clone()];
        self.phase = ChainPhase::RootSelected;
        debug!(root = %root, "chain.session.opened");
        Ok(())
    }

    /// Appends `row` after the last leg.
    pub fn select_option(&mut self, snap: &Snapshot, row: &RowId) -> ActionResult<()> {
        if !self.phase.is_open() {
            return Err(self.invalid("select"));
        }
        let last = self.last_position(snap)?;
        let pos = snap.position(row).ok_or_else(|| ActionError::UnknownRow(row.clone()))?;
        if self.chain.contains(row) {
            return Err(ActionError::RowAlreadyInChain(row.clone()));
        }
        let code = &snap.meta(pos).offer_code;
        if self.offer_codes(snap)?.contains(code) {
            return Err(ActionError::OfferReused(code.clone()));
        }
        if connection(snap.meta(last), snap.meta(pos), self.policy).is_none() {
            return Err(ActionError::NotLinkable(row.clone()));
        }
        self.chain.push(row.clone());
        self.phase = ChainPhase::Building;
        debug!(row = %row, legs = self.chain.len(), "chain.leg.added");
        Ok(())
    }

    /// Pops the last non-root leg.
    pub fn remove_last(&mut self) -> ActionResult<RowId> {
        if !self.phase.is_open() {
            return Err(self.invalid("remove"));
        }
        if self.chain.len() <= 1 {
            return Err(ActionError::NothingToRemove);
        }
        let removed = self.chain.pop().ok_or(ActionError::NothingToRemove)?;
        if self.chain.len() == 1 {
            self.phase = ChainPhase::RootSelected;
        }
        Ok(removed)
    }

    /// Truncates back to the root.
    pub fn reset(&mut self) -> ActionResult<()> {
        if !self.phase.is_open() {
            return Err(self.invalid("reset"));
        }
        self.chain.truncate(1);
        self.phase = ChainPhase::RootSelected;
        Ok(())
    }

    /// Changes the side-by-side setting. Disallowing it is rejected while the
    /// chain contains a ship change.
    pub fn set_allow_side_by_side(&mut self, snap: &Snapshot, allow: bool) -> ActionResult<()> {
        if allow == self.policy.allow_side_by_side {
            return Ok(());
        }
        if !allow && self.phase.is_open() {
            let positions = self.positions(snap)?;
            let crosses_ships = positions
                .windows(2)
                .any(|pair| snap.meta(pair[0]).ship_key != snap.meta(pair[1]).ship_key);
            if crosses_ships {
                return Err(ActionError::SideBySideInUse);
            }
        }
        self.policy = LinkPolicy::new(allow);
        Ok(())
    }

    /// Ranked rows that may follow the last leg.
    pub fn candidates(&mut self, snap: &Snapshot) -> ActionResult<Paginated<Candidate>> {
        if !self.phase.is_open() {
            return Err(self.invalid("candidates"));
        }
        let last = self.last_position(snap)?;
        let used = Exclusion::from_codes(self.offer_codes(snap)?);
        let graph = self.depths.graph(snap, self.policy);
        let mut list = Vec::new();
        for &(pos, conn) in graph.successors(last) {
            let meta = snap.meta(pos);
            let row_id = &snap.row(pos).id;
            if used.contains(&meta.offer_code) || self.chain.contains(row_id) {
                continue;
            }
            let excluded = used.with(&meta.offer_code);
            let depth = self.depths.depth_of(snap, self.policy, &excluded, pos);
            list.push(Candidate::new(row_id.clone(), snap.meta(last), meta, conn, depth));
        }
        rank(&mut list);
        debug!(last = %snap.row(last).id, candidates = list.len(), "chain.candidates");
        Ok(Paginated::new(list, self.page_size))
    }

    /// Longest chain reachable from the current prefix, counting its legs.
    pub fn reach(&mut self, snap: &Snapshot) -> ActionResult<u32> {
        if !self.phase.is_open() {
            return Err(self.invalid("reach"));
        }
        let last = self.last_position(snap)?;
        let used = Exclusion::from_codes(self.offer_codes(snap)?);
        let tail = self.depths.depth_of(snap, self.policy, &used, last);
        Ok(self.chain.len() as u32 + tail.saturating_sub(1))
    }

    /// Per-leg timelines; legs whose itinerary is not hydrated carry `None`.
    pub fn timeline(&self, snap: &Snapshot, itineraries: &dyn ItineraryLookup) -> ActionResult<Vec<LegTimeline>> {
        let positions = self.positions(snap)?;
        let mut out = Vec::with_capacity(positions.len());
        for (i, &pos) in positions.iter().enumerate() {
            let row = snap.row(pos);
            let meta = snap.meta(pos);
            let days = if !row.sailing.itinerary.is_empty() {
                Some(row.sailing.itinerary.clone())
            } else {
                meta.start.and_then(|start| itineraries.timeline(&meta.ship_key, start))
            };
            let link = match i {
                0 => None,
                _ => connection(snap.meta(positions[i - 1]), meta, LinkPolicy::SIDE_BY_SIDE),
            };
            out.push(LegTimeline {
                row_id: row.id.clone(),
                ship: row.sailing.ship_name.clone(),
                start: meta.start,
                end: meta.end,
                connection: link,
                days,
            });
        }
        Ok(out)
    }

    /// Delivers the chain to `sink` and ends the session.
    pub fn save(&mut self, snap: &Snapshot, sink: &mut dyn ChainSink) -> Result<SavedChain> {
        if !self.phase.is_open() {
            return Err(self.invalid("save").into());
        }
        if self.chain.len() < 2 {
            return Err(ActionError::ChainTooShort(self.chain.len()).into());
        }
        let positions = self.positions(snap)?;
        let depth = self.reach(snap)?;
        let saved = SavedChain {
            id: self.next_chain_id(),
            profile: self.profile.clone(),
            legs: positions.iter().map(|&pos| snap.row(pos).clone()).collect(),
            leg_count: positions.len(),
            depth,
            allow_side_by_side: self.policy.allow_side_by_side,
        };
        sink.save_chain(&saved)?;
        self.metrics.chain_saved(saved.leg_count);
        info!(
            id = %saved.id,
            profile = %saved.profile,
            legs = saved.leg_count,
            depth = saved.depth,
            "chain.saved"
        );
        self.chain.clear();
        self.phase = ChainPhase::Saved(saved.id.clone());
        Ok(saved)
    }

    /// Discards the session.
    pub fn close(&mut self) {
        self.chain.clear();
        self.phase = ChainPhase::Closed;
    }

    fn next_chain_id(&mut self) -> ChainId {
        let suffix: String = (0..6)
            .map(|_| char::from(ID_ALPHABET[self.rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();
        ChainId(format!("B2B-{suffix}"))
    }

    fn invalid(&self, operation: &'static str) -> ActionError {
        ActionError::InvalidPhase {
            operation,
            phase: self.phase.name(),
        }
    }

    fn positions(&self, snap: &Snapshot) -> ActionResult<Vec<usize>> {
        self.chain
            .iter()
            .map(|id| snap.position(id).ok_or_else(|| ActionError::UnknownRow(id.clone())))
            .collect()
    }

    fn last_position(&self, snap: &Snapshot) -> ActionResult<usize> {
        let last = self.chain.last().ok_or(ActionError::InvalidPhase {
            operation: "select",
            phase: self.phase.name(),
        })?;
        snap.position(last).ok_or_else(|| ActionError::UnknownRow(last.clone()))
    }

    fn offer_codes(&self, snap: &Snapshot) -> ActionResult<Vec<String>> {
        Ok(self
            .positions(snap)?
            .into_iter()
            .map(|pos| snap.meta(pos).offer_code.clone())
            .collect())
    }
}
