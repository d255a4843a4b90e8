//! Berth: offer exploration for cruise offer-sailing rows.
//!
//! The crate answers two questions over a read-only [`dataset::Snapshot`]:
//! which rows survive a user's filter session ([`filter::FilterEngine`],
//! backed by the [`index::FieldValueIndexer`] for value suggestions) and
//! which rows can be sailed back-to-back ([`chain::ChainBuilder`]).
//! Everything runs on the caller's thread; deferred work is driven through
//! the cooperative scheduler in [`sched`].

#![warn(missing_docs)]

pub mod chain;
pub mod config;
pub mod dataset;
pub mod filter;
pub mod import;
pub mod index;
pub mod metrics;
pub mod sched;
pub mod types;

pub use chain::{ChainBuilder, ChainPhase, ChainSink, JsonChainSink, LinkPolicy, MemoryChainSink, SavedChain};
pub use config::{EngineConfig, EngineOptions};
pub use dataset::{Dataset, Row, RowSource, Snapshot, StaticRowSource};
pub use filter::{FilterEngine, FilterStore, JsonFileStore, MemoryFilterStore, Operator, Predicate};
pub use index::{FieldKey, FieldValueIndexer};
pub use types::{ActionError, BerthError, ChainId, PredicateId, ProfileKey, Result, RowId};
