#![forbid(unsafe_code)]

//! Identifiers and error types shared across the engine.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Stable identifier of an offer-sailing row, assigned by the row supplier.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub String);

/// Session-local identifier of a predicate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateId(pub u64);

/// User profile that owns filter sessions and saved chains.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileKey(pub String);

/// Short identifier attached to a saved chain.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PredicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId(value.to_owned())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        RowId(value)
    }
}

impl From<&str> for ProfileKey {
    fn from(value: &str) -> Self {
        ProfileKey(value.to_owned())
    }
}

/// Rejected user actions. State is never mutated when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Another predicate is still being edited.
    #[error("predicate {0} is still a draft")]
    DraftInProgress(PredicateId),
    /// The predicate id is not part of the session.
    #[error("unknown predicate {0}")]
    UnknownPredicate(PredicateId),
    /// The predicate does not hold the value count its operator requires.
    #[error("operator {operator} requires {expected} (got {found})")]
    IncompleteValues {
        /// Operator name.
        operator: &'static str,
        /// Human-readable arity requirement.
        expected: &'static str,
        /// Number of values held.
        found: usize,
    },
    /// A value could not be interpreted for the operator.
    #[error("value '{value}' is not valid for {operator}")]
    InvalidValue {
        /// Operator name.
        operator: &'static str,
        /// Offending value.
        value: String,
    },
    /// The field kind does not support the operator.
    #[error("field '{field}' does not support operator {operator}")]
    OperatorNotSupported {
        /// Field key.
        field: &'static str,
        /// Operator name.
        operator: &'static str,
    },
    /// Referenced row is not part of the current dataset snapshot.
    #[error("row {0} is not in the dataset")]
    UnknownRow(RowId),
    /// Row is already a leg of the chain.
    #[error("row {0} is already in the chain")]
    RowAlreadyInChain(RowId),
    /// The offer code is already used by another leg.
    #[error("offer {0} is already used in the chain")]
    OfferReused(String),
    /// The row does not connect to the last leg.
    #[error("row {0} does not connect to the last leg")]
    NotLinkable(RowId),
    /// Fewer than two legs.
    #[error("chain needs at least 2 legs (got {0})")]
    ChainTooShort(usize),
    /// Only the root leg remains.
    #[error("no leg to remove")]
    NothingToRemove,
    /// The operation is not valid in the current session phase.
    #[error("{operation} not allowed while {phase}")]
    InvalidPhase {
        /// Attempted operation.
        operation: &'static str,
        /// Current phase name.
        phase: &'static str,
    },
    /// Changing the connection policy would break existing links.
    #[error("chain contains side-by-side connections")]
    SideBySideInUse,
}

impl ActionError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::DraftInProgress(_) => "DraftInProgress",
            ActionError::UnknownPredicate(_) => "UnknownPredicate",
            ActionError::IncompleteValues { .. } => "IncompleteValues",
            ActionError::InvalidValue { .. } => "InvalidValue",
            ActionError::OperatorNotSupported { .. } => "OperatorNotSupported",
            ActionError::UnknownRow(_) => "UnknownRow",
            ActionError::RowAlreadyInChain(_) => "RowAlreadyInChain",
            ActionError::OfferReused(_) => "OfferReused",
            ActionError::NotLinkable(_) => "NotLinkable",
            ActionError::ChainTooShort(_) => "ChainTooShort",
            ActionError::NothingToRemove => "NothingToRemove",
            ActionError::InvalidPhase { .. } => "InvalidPhase",
            ActionError::SideBySideInUse => "SideBySideInUse",
        }
    }
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum BerthError {
    /// I/O failure in a store or loader.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// CSV decoding failure.
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    /// A user action was rejected.
    #[error("rejected: {0}")]
    Action(#[from] ActionError),
    /// Row file is not in a recognised shape.
    #[error("import: {0}")]
    Import(String),
    /// Requested entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A shared store's lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BerthError>;

/// Result of a session operation that may be rejected.
pub type ActionResult<T> = std::result::Result<T, ActionError>;

/// Locks `mutex`, turning poisoning into [`BerthError::LockPoisoned`].
pub fn acquire_lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| {
        error!(what, "store.lock_poisoned");
        BerthError::LockPoisoned(what)
    })
}
