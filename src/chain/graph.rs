//! Explicit adjacency over a snapshot under one link policy.

use rustc_hash::FxHashMap;
use time::Date;
use tracing::{debug, warn};

use crate::dataset::Snapshot;

use super::link::{connection, Connection, LinkPolicy};

/// Outgoing connections of every visible row.
#[derive(Debug, Clone)]
pub struct LinkGraph {
    snapshot: u64,
    policy: LinkPolicy,
    edges: Vec<Vec<(usize, Connection)>>,
    cyclic: Vec<usize>,
}

impl LinkGraph {
    /// Builds the graph for `snap`. Rows are bucketed by start date so each
    /// row is only compared with rows sailing the day it returns.
    pub fn build(snap: &Snapshot, policy: LinkPolicy) -> Self {
        let mut by_start: FxHashMap<Date, Vec<usize>> = FxHashMap::default();
        for idx in 0..snap.len() {
            if let Some(start) = snap.meta(idx).start {
                by_start.entry(start).or_default().push(idx);
            }
        }
        let mut edge_count = 0usize;
        let edges: Vec<Vec<(usize, Connection)>> = (0..snap.len())
            .map(|from| {
                let meta = snap.meta(from);
                let Some(bucket) = meta.end.and_then(|end| by_start.get(&end)) else {
                    return Vec::new();
                };
                let out: Vec<(usize, Connection)> = bucket
                    .iter()
                    .filter(|&&to| to != from)
                    .filter_map(|&to| connection(meta, snap.meta(to), policy).map(|c| (to, c)))
                    .collect();
                edge_count += out.len();
                out
            })
            .collect();
        let cyclic = cyclic_rows(&edges);
        if !cyclic.is_empty() {
            warn!(rows = cyclic.len(), "chain.graph.cycle_detected");
        }
        debug!(
            rows = snap.len(),
            edges = edge_count,
            side_by_side = policy.allow_side_by_side,
            "chain.graph.built"
        );
        Self {
            snapshot: snap.id(),
            policy,
            edges,
            cyclic,
        }
    }

    /// Identity of the snapshot the graph was built from.
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot
    }

    /// Policy the graph was built under.
    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true for an empty snapshot.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Rows that may directly follow `from`, with how they connect.
    pub fn successors(&self, from: usize) -> &[(usize, Connection)] {
        self.edges.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows lying on or behind a cycle. Empty unless zero-night sailings
    /// produce same-day loops.
    pub fn cyclic_rows(&self) -> &[usize] {
        &self.cyclic
    }
}

/// Kahn's algorithm: rows never drained lie on or downstream of a cycle.
fn cyclic_rows(edges: &[Vec<(usize, Connection)>]) -> Vec<usize> {
    let mut indegree = vec![0usize; edges.len()];
    for out in edges {
        for &(to, _) in out {
            indegree[to] += 1;
        }
    }
    let mut ready: Vec<usize> = (0..edges.len()).filter(|&i| indegree[i] == 0).collect();
    let mut drained = vec![false; edges.len()];
    while let Some(node) = ready.pop() {
        drained[node] = true;
        for &(to, _) in &edges[node] {
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.push(to);
            }
        }
    }
    (0..edges.len()).filter(|&i| !drained[i]).collect()
}
