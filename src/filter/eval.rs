//! Predicate evaluation over a snapshot.

use rustc_hash::FxHashSet;
use time::Date;

use crate::dataset::meta::{key, parse_date};
use crate::dataset::Snapshot;
use crate::index::fields::{extract, normalize_input, parse_number, FieldContext, FieldKey, FieldValue};

use super::predicate::{Operator, Predicate};

#[derive(Clone, Debug)]
enum Test {
    In(FxHashSet<String>),
    NotIn(FxHashSet<String>),
    Contains(Vec<String>),
    NotContains(Vec<String>),
    DateRange(Date, Date),
    LessThan(f64),
    GreaterThan(f64),
}

/// Predicate prepared for repeated evaluation.
#[derive(Clone, Debug)]
pub struct CompiledPredicate {
    field: FieldKey,
    test: Test,
}

impl CompiledPredicate {
    /// Compiles a complete predicate. Drafts and predicates whose values do
    /// not parse for their operator yield `None`.
    pub fn compile(predicate: &Predicate) -> Option<Self> {
        if !predicate.complete || predicate.check_complete().is_err() {
            return None;
        }
        let field = predicate.field_key;
        let values = &predicate.values;
        let set = || -> FxHashSet<String> { values.iter().map(|v| normalize_input(field, v)).collect() };
        let tokens = || -> Vec<String> {
            values
                .iter()
                .map(|v| key(v))
                .filter(|v| !v.is_empty())
                .collect()
        };
        let test = match predicate.operator {
            Operator::In => Test::In(set()),
            Operator::NotIn => Test::NotIn(set()),
            Operator::Contains => Test::Contains(tokens()),
            Operator::NotContains => Test::NotContains(tokens()),
            Operator::DateRange => {
                let lo = parse_date(values.first()?)?;
                let hi = parse_date(values.get(1)?)?;
                Test::DateRange(lo.min(hi), lo.max(hi))
            }
            Operator::LessThan => Test::LessThan(parse_number(values.first()?)?),
            Operator::GreaterThan => Test::GreaterThan(parse_number(values.first()?)?),
        };
        Some(Self { field, test })
    }

    /// Field tested.
    pub fn field(&self) -> FieldKey {
        self.field
    }

    /// Tests one extracted value.
    ///
    /// Missing and not-yet-hydrated values fail positive tests and pass the
    /// negated ones.
    pub fn matches(&self, value: &FieldValue) -> bool {
        let keys = || value.display().iter().map(|v| key(v)).collect::<Vec<_>>();
        match &self.test {
            Test::In(set) => keys().iter().any(|k| set.contains(k)),
            Test::NotIn(set) => !keys().iter().any(|k| set.contains(k)),
            Test::Contains(tokens) => contains_any(&keys(), tokens),
            Test::NotContains(tokens) => !contains_any(&keys(), tokens),
            Test::DateRange(lo, hi) => match value {
                FieldValue::Date(d) => lo <= d && d <= hi,
                _ => false,
            },
            Test::LessThan(limit) => match value {
                FieldValue::Number(n) => n < limit,
                _ => false,
            },
            Test::GreaterThan(limit) => match value {
                FieldValue::Number(n) => n > limit,
                _ => false,
            },
        }
    }

    /// Tests the row at `idx`.
    pub fn matches_row(&self, snap: &Snapshot, idx: usize, ctx: &FieldContext<'_>) -> bool {
        self.matches(&extract(snap, idx, self.field, ctx))
    }
}

fn contains_any(haystacks: &[String], tokens: &[String]) -> bool {
    haystacks
        .iter()
        .any(|h| tokens.iter().any(|t| h.contains(t.as_str())))
}

/// Compiles every complete predicate of `predicates`.
pub fn compile_all(predicates: &[Predicate]) -> Vec<CompiledPredicate> {
    predicates.iter().filter_map(CompiledPredicate::compile).collect()
}

/// Positions of the rows of `snap` passing every complete predicate.
pub fn evaluate(snap: &Snapshot, predicates: &[Predicate], ctx: &FieldContext<'_>) -> Vec<usize> {
    let compiled = compile_all(predicates);
    (0..snap.len())
        .filter(|&idx| compiled.iter().all(|p| p.matches_row(snap, idx, ctx)))
        .collect()
}
