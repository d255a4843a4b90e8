#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use berth::{
    config::EngineOptions,
    dataset::{Dataset, HiddenGroup, ItineraryDay, MemoryItineraries, NoItineraries, Offer, Row, Sailing, StaticRowSource},
    filter::{FilterEngine, MemoryFilterStore},
    index::{FieldKey, StaticStep, ValueSource, VisitsStatus},
    metrics::CounterMetrics,
    sched::ManualClock,
    types::{ProfileKey, Result},
};
use time::macros::date;

fn row(i: usize, ship: &str, sail_date: &str, nights: u32) -> Row {
    Row::new(
        format!("r{i}"),
        Offer {
            code: format!("X{}", i % 7),
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

fn fleet(n: usize) -> Vec<Row> {
    let ships = ["Oasis", "Icon", "Wonder", "Utopia"];
    (0..n)
        .map(|i| {
            let date = format!("2025-{:02}-{:02}", 1 + i % 12, 1 + i % 28);
            row(i, ships[i % ships.len()], &date, 3 + (i % 5) as u32)
        })
        .collect()
}

fn engine(options: EngineOptions, clock: Arc<ManualClock>) -> FilterEngine {
    let mut engine = FilterEngine::new(ProfileKey::from("p"), options, Box::new(MemoryFilterStore::new())).with_clock(clock);
    engine.enable();
    engine
}

fn build_static(engine: &mut FilterEngine, snap: &berth::dataset::Snapshot) -> Result<()> {
    engine.observe_snapshot(snap);
    loop {
        match engine.tick(snap)?.static_step {
            Some(StaticStep::Pending) => continue,
            _ => return Ok(()),
        }
    }
}

#[test]
fn values_sort_in_presentation_order() {
    let snap = berth::dataset::Snapshot::from_rows(vec![
        row(0, "Oasis", "2025-07-05", 14),
        row(1, "oasis", "2025-01-15", 5),
        row(2, "Icon", "2025-06-01", 10),
        row(3, "Icon", "2025-06-02", 7),
    ]);
    let mut engine = engine(EngineOptions::default(), Arc::new(ManualClock::new()));

    let nights = engine.suggestions(&snap, FieldKey::Nights, &NoItineraries);
    assert_eq!(nights.values.all(), ["5", "7", "10", "14"]);

    let days = engine.suggestions(&snap, FieldKey::DayOfWeek, &NoItineraries);
    assert_eq!(days.values.all(), ["Sunday", "Monday", "Wednesday", "Saturday"]);

    let months = engine.suggestions(&snap, FieldKey::Month, &NoItineraries);
    assert_eq!(months.values.all(), ["January", "June", "July"]);

    // Case-insensitive de-duplication keeps one spelling per value.
    let ships = engine.suggestions(&snap, FieldKey::Ship, &NoItineraries);
    assert_eq!(ships.values.len(), 2);
}

#[test]
fn static_index_tolerates_small_drift_only() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine(EngineOptions::default().static_index_chunk_rows(16), clock);
    let mut dataset = Dataset::new();
    let mut source = StaticRowSource::new(fleet(40));
    let snap = dataset.refresh(&source)?;
    build_static(&mut engine, &snap)?;
    assert!(engine.has_static_index(&snap));
    assert_eq!(engine.suggestions(&snap, FieldKey::Ship, &NoItineraries).source, ValueSource::Static);

    // 41 rows is within 5% of 40.
    source.rows = fleet(41);
    let grown = dataset.refresh(&source)?;
    assert_eq!(engine.suggestions(&grown, FieldKey::Ship, &NoItineraries).source, ValueSource::Static);

    // 45 rows is not.
    source.rows = fleet(45);
    let drifted = dataset.refresh(&source)?;
    assert!(!engine.has_static_index(&drifted));
    assert_eq!(engine.suggestions(&drifted, FieldKey::Ship, &NoItineraries).source, ValueSource::Dynamic);

    // Rebuilding for the new snapshot restores the static path.
    build_static(&mut engine, &drifted)?;
    assert_eq!(engine.suggestions(&drifted, FieldKey::Ship, &NoItineraries).source, ValueSource::Static);

    // A hidden-group change invalidates the index too.
    source.hidden.insert(HiddenGroup::offer("X1"));
    let hidden = dataset.refresh(&source)?;
    assert_eq!(engine.suggestions(&hidden, FieldKey::Ship, &NoItineraries).source, ValueSource::Dynamic);
    Ok(())
}

#[test]
fn static_index_is_bypassed_once_a_predicate_commits() -> Result<()> {
    let mut engine = engine(EngineOptions::default(), Arc::new(ManualClock::new()));
    let snap = berth::dataset::Snapshot::from_rows(fleet(20));
    build_static(&mut engine, &snap)?;
    let id = engine.add_predicate(FieldKey::Ship)?;
    engine.set_values(id, ["Icon"])?;

    // A draft does not count.
    assert_eq!(engine.suggestions(&snap, FieldKey::Ship, &NoItineraries).source, ValueSource::Static);

    engine.commit(id)?;
    let ships = engine.suggestions(&snap, FieldKey::Ship, &NoItineraries);
    assert_eq!(ships.source, ValueSource::Dynamic);
    assert_eq!(ships.values.all(), ["Icon"]);
    Ok(())
}

#[test]
fn dynamic_lists_are_cached_per_signature() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let mut engine = engine(EngineOptions::default(), Arc::new(ManualClock::new())).with_metrics(metrics.clone());
    let snap = berth::dataset::Snapshot::from_rows(fleet(20));
    let id = engine.add_predicate(FieldKey::Ship)?;
    engine.set_values(id, ["Oasis", "Icon"])?;
    engine.commit(id)?;

    engine.suggestions(&snap, FieldKey::Nights, &NoItineraries);
    engine.suggestions(&snap, FieldKey::Nights, &NoItineraries);
    assert_eq!(metrics.value_cache_misses.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.value_cache_hits.load(Ordering::Relaxed), 1);

    // A different committed set is a different key.
    engine.set_values(id, ["Oasis"])?;
    engine.commit(id)?;
    engine.suggestions(&snap, FieldKey::Nights, &NoItineraries);
    assert_eq!(metrics.value_cache_misses.load(Ordering::Relaxed), 2);
    Ok(())
}

#[test]
fn visits_retry_then_fall_back_to_manual_refresh() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let options = EngineOptions::default().visits_retry(2, Duration::from_millis(100), Duration::from_secs(1));
    let mut engine = engine(options, clock.clone());
    let snap = berth::dataset::Snapshot::from_rows(vec![
        row(0, "Oasis", "2025-06-01", 7),
        row(1, "Icon", "2025-06-08", 7),
    ]);

    let first = engine.suggestions(&snap, FieldKey::Visits, &NoItineraries);
    assert!(first.values.is_empty());
    assert!(matches!(first.visits, VisitsStatus::Retrying { attempt: 1, .. }));
    assert!(!engine.tick(&snap)?.visits_retry_due);

    clock.advance(Duration::from_millis(100));
    assert!(engine.tick(&snap)?.visits_retry_due);
    let second = engine.suggestions(&snap, FieldKey::Visits, &NoItineraries);
    assert!(matches!(second.visits, VisitsStatus::Retrying { attempt: 2, .. }));

    clock.advance(Duration::from_millis(200));
    assert!(engine.tick(&snap)?.visits_retry_due);
    let third = engine.suggestions(&snap, FieldKey::Visits, &NoItineraries);
    assert_eq!(third.visits, VisitsStatus::ManualRefresh);
    clock.advance(Duration::from_secs(5));
    assert!(!engine.tick(&snap)?.visits_retry_due);

    // Hydrated itineraries after a manual refresh.
    engine.refresh_visits();
    let mut lookup = MemoryItineraries::new();
    let port = |day: u32, name: &str, sea_day: bool| ItineraryDay {
        day,
        port: name.into(),
        sea_day,
    };
    lookup.insert(
        "oasis",
        date!(2025 - 06 - 01),
        vec![port(1, "Miami", false), port(2, "At Sea", true), port(3, "Nassau", false)],
    );
    lookup.insert("icon", date!(2025 - 06 - 08), vec![port(1, "Miami", false), port(2, "Cozumel", false)]);
    let ready = engine.suggestions(&snap, FieldKey::Visits, &lookup);
    assert_eq!(ready.visits, VisitsStatus::Ready);
    assert_eq!(ready.values.all(), ["Cozumel", "Miami", "Nassau"]);
    Ok(())
}

#[test]
fn committed_visits_match_rows_hydrated_by_lookup() -> Result<()> {
    let mut engine = engine(EngineOptions::default(), Arc::new(ManualClock::new()));
    let snap = berth::dataset::Snapshot::from_rows(vec![
        row(0, "Oasis", "2025-06-01", 7),
        row(1, "Icon", "2025-06-08", 7),
    ]);
    let port = |day: u32, name: &str| ItineraryDay {
        day,
        port: name.into(),
        sea_day: false,
    };
    let mut lookup = MemoryItineraries::new();
    lookup.insert("oasis", date!(2025 - 06 - 01), vec![port(1, "Nassau")]);
    lookup.insert("icon", date!(2025 - 06 - 08), vec![port(1, "Cozumel")]);
    assert_eq!(engine.suggestions(&snap, FieldKey::Visits, &lookup).values.all(), ["Cozumel", "Nassau"]);

    let id = engine.add_predicate(FieldKey::Visits)?;
    engine.set_values(id, ["Nassau"])?;
    engine.commit(id)?;

    let kept: Vec<&str> = engine.evaluate(&snap, &lookup).iter().map(|r| r.id.0.as_str()).collect();
    assert_eq!(kept, ["r0"]);
    let narrowed = engine.suggestions(&snap, FieldKey::Visits, &lookup);
    assert_eq!(narrowed.visits, VisitsStatus::Ready);
    assert_eq!(narrowed.values.all(), ["Nassau"]);
    Ok(())
}
