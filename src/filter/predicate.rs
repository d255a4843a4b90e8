//! Predicates and their draft/complete lifecycle.
//!
//! Transitions are pure: each returns a new [`Predicate`] or an
//! [`ActionError`], leaving the input untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::dataset::meta::{key, normalize_text, parse_date};
use crate::index::fields::{format_number, parse_number, FieldKey, FieldKind};
use crate::types::{ActionError, ActionResult, PredicateId};

/// Comparison applied by a predicate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operator {
    /// Field value is one of the values.
    In,
    /// Field value is none of the values.
    NotIn,
    /// Field value contains any token, case-insensitively.
    Contains,
    /// Field value contains none of the tokens.
    NotContains,
    /// Field date lies within `[values[0], values[1]]`.
    DateRange,
    /// Field number is strictly below the value.
    LessThan,
    /// Field number is strictly above the value.
    GreaterThan,
}

/// How many values an operator takes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Arity {
    /// Any number of values; at least one to commit.
    List,
    /// Exactly two dates to commit.
    Pair,
    /// Exactly one number to commit.
    Single,
}

impl Operator {
    /// Every operator.
    pub const ALL: [Operator; 7] = [
        Operator::In,
        Operator::NotIn,
        Operator::Contains,
        Operator::NotContains,
        Operator::DateRange,
        Operator::LessThan,
        Operator::GreaterThan,
    ];

    /// Persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::Contains => "contains",
            Operator::NotContains => "not-contains",
            Operator::DateRange => "date-range",
            Operator::LessThan => "less-than",
            Operator::GreaterThan => "greater-than",
        }
    }

    /// Parses an operator name. Case, spaces, dashes and underscores are
    /// ignored; legacy `starts-with` and `between` map to `contains` and
    /// `date-range`.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let op = match folded.as_str() {
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            "contains" | "startswith" => Operator::Contains,
            "notcontains" => Operator::NotContains,
            "daterange" | "between" => Operator::DateRange,
            "lessthan" => Operator::LessThan,
            "greaterthan" => Operator::GreaterThan,
            _ => return None,
        };
        Some(op)
    }

    /// Value count class.
    pub fn arity(&self) -> Arity {
        match self {
            Operator::DateRange => Arity::Pair,
            Operator::LessThan | Operator::GreaterThan => Arity::Single,
            _ => Arity::List,
        }
    }

    /// Returns true when fields of `kind` accept this operator.
    pub fn supports(&self, kind: FieldKind) -> bool {
        match self {
            Operator::In | Operator::NotIn => true,
            Operator::Contains | Operator::NotContains => {
                matches!(kind, FieldKind::Text | FieldKind::MultiText)
            }
            Operator::DateRange => kind == FieldKind::Date,
            Operator::LessThan | Operator::GreaterThan => kind == FieldKind::Number,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a predicate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PredicateState {
    /// Being edited; excluded from evaluation.
    Draft,
    /// Committed; included in evaluation.
    Complete,
}

/// One field/operator/values condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    /// Session-local id.
    pub id: PredicateId,
    /// Field tested.
    pub field_key: FieldKey,
    /// Comparison.
    pub operator: Operator,
    /// Ordered values.
    pub values: Vec<String>,
    /// Whether the predicate is committed.
    pub complete: bool,
}

impl Predicate {
    /// Fresh draft on `field` using `in`.
    pub fn draft(id: PredicateId, field: FieldKey) -> Self {
        Self {
            id,
            field_key: field,
            operator: Operator::In,
            values: Vec::new(),
            complete: false,
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> PredicateState {
        if self.complete {
            PredicateState::Complete
        } else {
            PredicateState::Draft
        }
    }

    /// Switches the operator. Values survive only within the same arity class.
    pub fn with_operator(&self, operator: Operator) -> ActionResult<Self> {
        if !operator.supports(self.field_key.kind()) {
            return Err(ActionError::OperatorNotSupported {
                field: self.field_key.as_str(),
                operator: operator.as_str(),
            });
        }
        let mut next = self.clone();
        if operator.arity() != self.operator.arity() {
            next.values.clear();
        }
        next.operator = operator;
        Ok(next)
    }

    /// Replaces the values after normalising them for the operator.
    pub fn with_values<I, S>(&self, values: I) -> ActionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = normalize_values(self.operator, values)?;
        let mut next = self.clone();
        next.values = normalized;
        Ok(next)
    }

    /// Checks the value count required to commit.
    pub fn check_complete(&self) -> ActionResult<()> {
        let found = self.values.len();
        let (ok, expected) = match self.operator.arity() {
            Arity::List => (found >= 1, "at least 1 value"),
            Arity::Pair => (found == 2, "exactly 2 dates"),
            Arity::Single => (found == 1, "exactly 1 number"),
        };
        if ok {
            Ok(())
        } else {
            Err(ActionError::IncompleteValues {
                operator: self.operator.as_str(),
                expected,
                found,
            })
        }
    }

    /// Draft -> complete. Idempotent on complete predicates.
    pub fn committed(&self) -> ActionResult<Self> {
        self.check_complete()?;
        let mut next = self.clone();
        next.complete = true;
        Ok(next)
    }

    /// Complete -> draft.
    pub fn reopened(&self) -> Self {
        let mut next = self.clone();
        next.complete = false;
        next
    }

    fn hash_into(&self, hasher: &mut Xxh64) {
        hasher.update(self.field_key.as_str().as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(self.operator.as_str().as_bytes());
        for value in &self.values {
            hasher.update(&[0x1f]);
            hasher.update(value.as_bytes());
        }
    }
}

fn normalize_values<I, S>(operator: Operator, values: I) -> ActionResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for raw in values {
        let raw = normalize_text(raw.as_ref());
        if raw.is_empty() {
            continue;
        }
        let value = match operator.arity() {
            Arity::List => {
                if out.iter().any(|v| key(v) == key(&raw)) {
                    continue;
                }
                raw
            }
            Arity::Pair => parse_date(&raw)
                .map(|d| d.to_string())
                .ok_or_else(|| invalid(operator, &raw))?,
            Arity::Single => parse_number(&raw)
                .map(format_number)
                .ok_or_else(|| invalid(operator, &raw))?,
        };
        out.push(value);
    }
    let max = match operator.arity() {
        Arity::List => usize::MAX,
        Arity::Pair => 2,
        Arity::Single => 1,
    };
    if out.len() > max {
        return Err(ActionError::IncompleteValues {
            operator: operator.as_str(),
            expected: if max == 2 { "at most 2 dates" } else { "at most 1 number" },
            found: out.len(),
        });
    }
    if operator.arity() == Arity::Pair {
        // ISO dates sort chronologically as strings.
        out.sort();
    }
    Ok(out)
}

fn invalid(operator: Operator, value: &str) -> ActionError {
    ActionError::InvalidValue {
        operator: operator.as_str(),
        value: value.to_owned(),
    }
}

/// Order-independent signature of the complete predicates in `predicates`.
pub fn committed_signature(predicates: &[Predicate]) -> u64 {
    let mut parts: Vec<u64> = predicates
        .iter()
        .filter(|p| p.complete)
        .map(|p| {
            let mut hasher = Xxh64::new(0);
            p.hash_into(&mut hasher);
            hasher.digest()
        })
        .collect();
    parts.sort_unstable();
    let mut hasher = Xxh64::new(0x5eed);
    for part in parts {
        hasher.update(&part.to_le_bytes());
    }
    hasher.digest()
}
