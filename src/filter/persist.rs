//! Filter-session persistence: store trait, stores, and a lenient decoder.
//!
//! Stored state has the shape
//! `{ enabled, predicates: [{ id, fieldKey, operator, values, complete }],
//! includeTaxesAndFeesInPriceFilters }`. Decoding never fails: malformed
//! predicates are dropped and logged.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::index::fields::FieldKey;
use crate::types::{acquire_lock, PredicateId, ProfileKey, Result};

use super::predicate::{Operator, Predicate};
use super::FilterState;

/// Storage for per-profile filter sessions.
pub trait FilterStore {
    /// Replaces the stored state of `profile`.
    fn save(&self, profile: &ProfileKey, state: &Value) -> Result<()>;
    /// Returns the stored state of `profile`, if any.
    fn load(&self, profile: &ProfileKey) -> Result<Option<Value>>;
    /// Deletes the stored state of `profile`.
    fn clear(&self, profile: &ProfileKey) -> Result<()>;
}

/// In-memory store. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryFilterStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    states: FxHashMap<ProfileKey, Value>,
    saves: usize,
}

impl MemoryFilterStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn saves(&self) -> Result<usize> {
        Ok(acquire_lock(&self.inner, "memory filter store")?.saves)
    }

    /// Stores raw state, bypassing encoding.
    pub fn put_raw(&self, profile: &ProfileKey, state: Value) -> Result<()> {
        acquire_lock(&self.inner, "memory filter store")?
            .states
            .insert(profile.clone(), state);
        Ok(())
    }
}

impl FilterStore for MemoryFilterStore {
    fn save(&self, profile: &ProfileKey, state: &Value) -> Result<()> {
        let mut inner = acquire_lock(&self.inner, "memory filter store")?;
        inner.states.insert(profile.clone(), state.clone());
        inner.saves += 1;
        Ok(())
    }

    fn load(&self, profile: &ProfileKey) -> Result<Option<Value>> {
        Ok(acquire_lock(&self.inner, "memory filter store")?
            .states
            .get(profile)
            .cloned())
    }

    fn clear(&self, profile: &ProfileKey) -> Result<()> {
        acquire_lock(&self.inner, "memory filter store")?
            .states
            .remove(profile);
        Ok(())
    }
}

/// Store writing one JSON file per profile under a directory.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Uses `dir`, creating it on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the state of `profile`.
    pub fn path_for(&self, profile: &ProfileKey) -> PathBuf {
        let name: String = profile
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.filter.json"))
    }
}

impl FilterStore for JsonFileStore {
    fn save(&self, profile: &ProfileKey, state: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(profile);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &path)?;
        debug!(profile = %profile, path = %path.display(), "filter.store.saved");
        Ok(())
    }

    fn load(&self, profile: &ProfileKey) -> Result<Option<Value>> {
        let path = self.path_for(profile);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(profile = %profile, error = %err, "filter.store.unreadable");
                Ok(None)
            }
        }
    }

    fn clear(&self, profile: &ProfileKey) -> Result<()> {
        match fs::remove_file(self.path_for(profile)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState<'a> {
    enabled: bool,
    predicates: &'a [Predicate],
    include_taxes_and_fees_in_price_filters: bool,
}

/// Serialises a session.
pub fn encode(state: &FilterState) -> Result<Value> {
    Ok(serde_json::to_value(PersistedState {
        enabled: state.enabled,
        predicates: &state.predicates,
        include_taxes_and_fees_in_price_filters: state.include_taxes,
    })?)
}

/// Restores a session, dropping whatever does not parse.
///
/// Legacy operator names are mapped on the way in, only the first draft is
/// kept, and ids are reassigned in order starting at 1.
pub fn decode(value: &Value) -> FilterState {
    let mut state = FilterState::default();
    let Some(obj) = value.as_object() else {
        warn!("filter.restore.not_an_object");
        return state;
    };
    state.enabled = obj.get("enabled").and_then(Value::as_bool).unwrap_or(false);
    state.include_taxes = obj
        .get("includeTaxesAndFeesInPriceFilters")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let entries: &[Value] = match obj.get("predicates") {
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(_) => {
            warn!("filter.restore.predicates_not_an_array");
            &[]
        }
        None => &[],
    };
    let mut has_draft = false;
    for (position, entry) in entries.iter().enumerate() {
        let id = PredicateId(state.predicates.len() as u64 + 1);
        let Some(predicate) = decode_predicate(id, entry) else {
            warn!(position, "filter.restore.predicate_dropped");
            continue;
        };
        if !predicate.complete {
            if has_draft {
                warn!(position, "filter.restore.extra_draft_dropped");
                continue;
            }
            has_draft = true;
        }
        state.predicates.push(predicate);
    }
    state
}

fn decode_predicate(id: PredicateId, entry: &Value) -> Option<Predicate> {
    let obj = entry.as_object()?;
    let field = FieldKey::parse(obj.get("fieldKey")?.as_str()?)?;
    let operator = Operator::parse(obj.get("operator")?.as_str()?)?;
    let values = obj
        .get("values")?
        .as_array()?
        .iter()
        .map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect::<Option<Vec<String>>>()?;
    let complete = obj.get("complete").and_then(Value::as_bool).unwrap_or(false);
    let predicate = Predicate::draft(id, field)
        .with_operator(operator)
        .ok()?
        .with_values(&values)
        .ok()?;
    if complete {
        // A committed predicate that no longer satisfies its arity comes back
        // as a draft; an empty one is dropped.
        if predicate.values.is_empty() {
            return None;
        }
        return Some(predicate.committed().unwrap_or(predicate));
    }
    Some(predicate)
}
