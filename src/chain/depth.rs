//! Longest reachable chain length per row, memoised per exclusion set.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;
use xxhash_rust::xxh64::Xxh64;

use crate::dataset::Snapshot;
use crate::metrics::EngineMetrics;

use super::graph::LinkGraph;
use super::link::LinkPolicy;

/// Offer codes that may not appear again in a chain.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Exclusion {
    codes: BTreeSet<String>,
}

impl Exclusion {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from offer codes.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Copy of the set with `code` added.
    pub fn with(&self, code: &str) -> Self {
        let mut next = self.clone();
        next.codes.insert(code.to_owned());
        next
    }

    /// Returns true when `code` is excluded.
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    /// Number of excluded codes.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Order-independent signature.
    pub fn signature(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        for code in &self.codes {
            hasher.update(code.as_bytes());
            hasher.update(&[0]);
        }
        hasher.digest()
    }
}

/// Computes `depth` for every row of `graph`.
///
/// A row's depth is 1 plus the largest depth among its successors whose
/// offer code is neither excluded nor the row's own. Edges back into the
/// current path are skipped, so cycles terminate.
pub fn compute_depths(snap: &Snapshot, graph: &LinkGraph, excluded: &Exclusion) -> Vec<u32> {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let n = graph.len();
    let mut state = vec![UNSEEN; n];
    let mut best = vec![0u32; n];
    let mut depth = vec![1u32; n];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if state[root] != UNSEEN {
            continue;
        }
        state[root] = ON_PATH;
        stack.push((root, 0));
        while let Some(top) = stack.last_mut() {
            let (node, edge) = *top;
            if let Some(&(succ, _)) = graph.successors(node).get(edge) {
                top.1 += 1;
                let code = &snap.meta(succ).offer_code;
                if excluded.contains(code) || *code == snap.meta(node).offer_code {
                    continue;
                }
                match state[succ] {
                    DONE => best[node] = best[node].max(depth[succ]),
                    ON_PATH => {}
                    _ => {
                        state[succ] = ON_PATH;
                        stack.push((succ, 0));
                    }
                }
                continue;
            }
            depth[node] = 1 + best[node];
            state[node] = DONE;
            stack.pop();
            if let Some(&(parent, _)) = stack.last() {
                best[parent] = best[parent].max(depth[node]);
            }
        }
    }
    depth
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct DepthKey {
    snapshot: u64,
    hidden_signature: u64,
    policy: LinkPolicy,
    exclusion: u64,
}

/// Depth tables and the link graph they were computed on.
pub struct DepthCache {
    graph: Option<Arc<LinkGraph>>,
    tables: LruCache<DepthKey, Arc<[u32]>>,
    metrics: Arc<dyn EngineMetrics>,
}

impl DepthCache {
    /// Retains at most `capacity` depth tables.
    pub fn new(capacity: usize, metrics: Arc<dyn EngineMetrics>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            graph: None,
            tables: LruCache::new(capacity),
            metrics,
        }
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true when no table is cached.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Link graph for `snap` under `policy`, rebuilt when either changed.
    pub fn graph(&mut self, snap: &Snapshot, policy: LinkPolicy) -> Arc<LinkGraph> {
        if let Some(graph) = self.graph.as_ref() {
            if graph.snapshot_id() == snap.id() && graph.policy() == policy {
                return Arc::clone(graph);
            }
        }
        let graph = Arc::new(LinkGraph::build(snap, policy));
        self.graph = Some(Arc::clone(&graph));
        graph
    }

    /// Depth of every row of `snap` under `policy` and `excluded`.
    pub fn depths(&mut self, snap: &Snapshot, policy: LinkPolicy, excluded: &Exclusion) -> Arc<[u32]> {
        let key = DepthKey {
            snapshot: snap.id(),
            hidden_signature: snap.hidden_signature(),
            policy,
            exclusion: excluded.signature(),
        };
        if let Some(table) = self.tables.get(&key) {
            self.metrics.depth_query(true);
            return Arc::clone(table);
        }
        let graph = self.graph(snap, policy);
        let table: Arc<[u32]> = compute_depths(snap, &graph, excluded).into();
        debug!(
            rows = table.len(),
            excluded = excluded.len(),
            side_by_side = policy.allow_side_by_side,
            "chain.depth.computed"
        );
        self.metrics.depth_query(false);
        self.tables.put(key, Arc::clone(&table));
        table
    }

    /// Depth of the row at `idx`.
    pub fn depth_of(&mut self, snap: &Snapshot, policy: LinkPolicy, excluded: &Exclusion, idx: usize) -> u32 {
        self.depths(snap, policy, excluded).get(idx).copied().unwrap_or(1)
    }

    /// Drops every table and the graph.
    pub fn clear(&mut self) {
        self.graph = None;
        self.tables.clear();
    }
}
