#![allow(missing_docs)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use berth::{
    config::EngineOptions,
    dataset::{NoItineraries, Offer, Row, Sailing, Snapshot},
    filter::{FilterEngine, FilterStore, JsonFileStore, MemoryFilterStore, Operator},
    index::FieldKey,
    sched::ManualClock,
    types::{ProfileKey, Result, RowId},
};
use serde_json::json;
use tempfile::TempDir;

fn row(id: &str, ship: &str, nights: u32, sail_date: &str) -> Row {
    Row::new(
        id,
        Offer {
            code: format!("OFF-{id}"),
            ..Offer::default()
        },
        Sailing {
            ship_name: ship.into(),
            sail_date: sail_date.into(),
            nights: Some(nights),
            ..Sailing::default()
        },
    )
}

fn sample() -> Snapshot {
    Snapshot::from_rows(vec![
        row("r1", "Oasis", 7, "2025-06-01"),
        row("r2", "Icon", 5, "2025-06-10"),
        row("r3", "Oasis", 10, "2025-06-11"),
    ])
}

fn ids(rows: &[&Row]) -> Vec<String> {
    rows.iter().map(|r| r.id.0.clone()).collect()
}

fn session(store: Box<dyn FilterStore>, clock: Arc<ManualClock>) -> FilterEngine {
    let mut engine = FilterEngine::new(ProfileKey::from("alice"), EngineOptions::default(), store).with_clock(clock);
    engine.enable();
    engine
}

#[test]
fn ship_in_keeps_matching_rows() -> Result<()> {
    let snap = sample();
    let mut engine = session(Box::new(MemoryFilterStore::new()), Arc::new(ManualClock::new()));
    let id = engine.add_predicate(FieldKey::Ship)?;
    engine.set_values(id, ["Oasis"])?;
    engine.commit(id)?;
    assert_eq!(ids(&engine.evaluate(&snap, &NoItineraries)), vec!["r1", "r3"]);
    Ok(())
}

#[test]
fn nights_greater_than_is_numeric() -> Result<()> {
    let snap = sample();
    let mut engine = session(Box::new(MemoryFilterStore::new()), Arc::new(ManualClock::new()));
    let id = engine.add_predicate(FieldKey::Nights)?;
    let op = Operator::parse("greater than").expect("operator alias");
    engine.set_operator(id, op)?;
    engine.set_values(id, ["6"])?;
    engine.commit(id)?;
    assert_eq!(ids(&engine.evaluate(&snap, &NoItineraries)), vec!["r1", "r3"]);
    Ok(())
}

#[test]
fn date_range_is_inclusive() -> Result<()> {
    let snap = sample();
    let mut engine = session(Box::new(MemoryFilterStore::new()), Arc::new(ManualClock::new()));
    let id = engine.add_predicate(FieldKey::SailDate)?;
    engine.set_operator(id, Operator::parse("date range").expect("operator alias"))?;
    engine.set_values(id, ["2025-06-10", "2025-06-01"])?;
    engine.commit(id)?;
    assert_eq!(engine.predicate(id).map(|p| p.values.clone()), Some(vec!["2025-06-01".to_owned(), "2025-06-10".to_owned()]));
    assert_eq!(ids(&engine.evaluate(&snap, &NoItineraries)), vec!["r1", "r2"]);
    Ok(())
}

#[test]
fn committing_twice_changes_nothing() -> Result<()> {
    let mut engine = session(Box::new(MemoryFilterStore::new()), Arc::new(ManualClock::new()));
    let id = engine.add_predicate(FieldKey::Ship)?;
    engine.set_values(id, ["Oasis"])?;
    engine.commit(id)?;
    let once = engine.state().clone();
    engine.commit(id)?;
    assert_eq!(engine.state(), &once);
    Ok(())
}

#[test]
fn draft_never_filters() -> Result<()> {
    let snap = sample();
    let mut engine = session(Box::new(MemoryFilterStore::new()), Arc::new(ManualClock::new()));
    let ship = engine.add_predicate(FieldKey::Ship)?;
    engine.set_values(ship, ["Icon"])?;
    assert_eq!(engine.evaluate(&snap, &NoItineraries).len(), 3);
    engine.commit(ship)?;
    assert_eq!(ids(&engine.evaluate(&snap, &NoItineraries)), vec!["r2"]);

    // Reopening takes the predicate out of the committed set until it is
    // committed again.
    engine.edit(ship)?;
    assert_eq!(engine.evaluate(&snap, &NoItineraries).len(), 3);
    engine.add_value(ship, "Oasis")?;
    engine.commit(ship)?;
    assert_eq!(engine.evaluate(&snap, &NoItineraries).len(), 3);
    Ok(())
}

#[test]
fn rejected_actions_report_codes() -> Result<()> {
    let mut engine = session(Box::new(MemoryFilterStore::new()), Arc::new(ManualClock::new()));
    let id = engine.add_predicate(FieldKey::Ship)?;
    assert_eq!(engine.commit(id).unwrap_err().code(), "IncompleteValues");
    assert_eq!(
        engine.set_operator(id, Operator::GreaterThan).unwrap_err().code(),
        "OperatorNotSupported"
    );
    assert_eq!(engine.add_predicate(FieldKey::Nights).unwrap_err().code(), "DraftInProgress");

    let nights = {
        engine.remove(id)?;
        engine.add_predicate(FieldKey::Nights)?
    };
    engine.set_operator(nights, Operator::LessThan)?;
    assert_eq!(engine.add_value(nights, "seven").unwrap_err().code(), "InvalidValue");
    assert!(engine.predicate(nights).map_or(false, |p| p.values.is_empty()));
    Ok(())
}

#[test]
fn session_survives_reopen_from_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let snap = sample();
    let clock = Arc::new(ManualClock::new());
    {
        let mut engine = session(Box::new(JsonFileStore::new(dir.path())), clock.clone());
        let id = engine.add_predicate(FieldKey::Ship)?;
        engine.set_values(id, ["Oasis"])?;
        engine.commit(id)?;
        engine.set_include_taxes(true);
        let draft = engine.add_predicate(FieldKey::Nights)?;
        engine.set_operator(draft, Operator::GreaterThan)?;
        assert!(engine.persist_pending());
        clock.advance(Duration::from_millis(400));
        assert!(engine.tick(&snap)?.persisted);
    }

    let restored = FilterEngine::open(
        ProfileKey::from("alice"),
        EngineOptions::default(),
        Box::new(JsonFileStore::new(dir.path())),
    )?;
    let state = restored.state();
    assert!(state.enabled);
    assert!(state.include_taxes);
    assert_eq!(state.predicates.len(), 2);
    assert_eq!(state.committed_count(), 1);
    assert_eq!(state.draft().map(|p| p.field_key), Some(FieldKey::Nights));
    assert_eq!(ids(&restored.evaluate(&snap, &NoItineraries)), vec!["r1", "r3"]);
    Ok(())
}

#[test]
fn malformed_stored_session_is_restored_leniently() -> Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path());
    let profile = ProfileKey::from("bob");
    let stored = json!({
        "enabled": true,
        "predicates": [
            {"id": 4, "fieldKey": "ship", "operator": "starts-with", "values": ["oas"], "complete": true},
            {"id": 5, "fieldKey": "unknownField", "operator": "in", "values": ["x"], "complete": true},
            {"id": 6, "fieldKey": "nights", "operator": "in", "values": [], "complete": false},
            {"id": 7, "fieldKey": "month", "operator": "in", "values": [], "complete": false}
        ]
    });
    fs::write(store.path_for(&profile), serde_json::to_vec(&stored)?)?;

    let engine = FilterEngine::open(profile, EngineOptions::default(), Box::new(store))?;
    let preds = engine.predicates();
    assert_eq!(preds.len(), 2);
    assert_eq!(preds[0].operator, Operator::Contains);
    assert_eq!(preds[0].id.0, 1);
    assert!(!preds[1].complete);
    assert_eq!(
        engine.evaluate(&sample(), &NoItineraries).iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
        vec![RowId::from("r1"), RowId::from("r3")]
    );
    Ok(())
}

#[test]
fn writes_wait_for_a_quiet_period() -> Result<()> {
    let snap = sample();
    let clock = Arc::new(ManualClock::new());
    let store = MemoryFilterStore::new();
    let mut engine = session(Box::new(store.clone()), clock.clone());
    for ship in ["Oasis", "Icon", "Oasis"] {
        let id = engine.add_predicate(FieldKey::Ship)?;
        engine.set_values(id, [ship])?;
        engine.commit(id)?;
        engine.remove(id)?;
        clock.advance(Duration::from_millis(150));
        assert!(!engine.tick(&snap)?.persisted);
    }
    clock.advance(Duration::from_millis(400));
    assert!(engine.tick(&snap)?.persisted);
    assert_eq!(store.saves()?, 1);

    // Draft edits alone do not write.
    let id = engine.add_predicate(FieldKey::Ship)?;
    engine.set_values(id, ["Icon"])?;
    assert!(!engine.persist_pending());

    engine.clear()?;
    assert!(store.load(&ProfileKey::from("alice"))?.is_none());
    Ok(())
}
