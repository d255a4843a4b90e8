#![forbid(unsafe_code)]

//! Back-to-back chain discovery.
//!
//! Two legs connect when the second sails the day the first returns, from
//! the port the first returns to, and (unless side-by-side connections are
//! allowed) on the same ship. [`LinkGraph`] materialises those connections
//! for a snapshot, [`DepthCache`] memoises the longest reachable chain per
//! row and exclusion set, and [`ChainBuilder`] drives an interactive session.

/// Chain-building session.
pub mod builder;
/// Longest-path depth.
pub mod depth;
/// Link graph.
pub mod graph;
/// Connection rule.
pub mod link;
/// Candidate ranking.
pub mod rank;

pub use builder::{ChainBuilder, ChainPhase, ChainSink, JsonChainSink, LegTimeline, MemoryChainSink, SavedChain};
pub use depth::{compute_depths, DepthCache, Exclusion};
pub use graph::LinkGraph;
pub use link::{connection, linkable, Connection, LinkPolicy};
pub use rank::{Candidate, MatchTier};
