#![allow(missing_docs)]

use berth::{
    chain::{linkable, ChainBuilder, ChainPhase, Connection, JsonChainSink, LinkPolicy, MatchTier, MemoryChainSink},
    config::EngineOptions,
    dataset::{Dataset, HiddenGroup, ItineraryDay, MemoryItineraries, NoItineraries, Offer, Row, Sailing, Snapshot, StaticRowSource},
    types::{ActionError, BerthError, ProfileKey, Result, RowId},
};
use tempfile::TempDir;
use time::macros::date;

fn leg(id: &str, offer: &str, ship: &str, start: &str, nights: u32, port: &str) -> Row {
    Row::new(
        id,
        Offer {
            code: offer.into(),
            room_type: Some("Balcony".into()),
            guests: Some("2 Guests".into()),
            ..Offer::default()
        },
        Sailing {
            ship_name: ship.into(),
            sail_date: start.into(),
            nights: Some(nights),
            departure_port: Some(port.into()),
            arrival_port: Some(port.into()),
            ..Sailing::default()
        },
    )
}

fn pair() -> Snapshot {
    Snapshot::from_rows(vec![
        leg("A", "X1", "Oasis", "2025-06-01", 7, "Miami"),
        leg("B", "X2", "Oasis", "2025-06-08", 4, "Miami"),
        leg("C", "X1", "Oasis", "2025-06-01", 7, "Miami"),
    ])
}

fn builder() -> ChainBuilder {
    ChainBuilder::new(ProfileKey::from("alice"), &EngineOptions::default()).with_seed(42)
}

fn id(raw: &str) -> RowId {
    RowId::from(raw)
}

#[test]
fn end_date_and_port_make_rows_linkable() {
    let snap = pair();
    let (a, b) = (snap.meta(0), snap.meta(1));
    assert!(linkable(a, b, LinkPolicy::SAME_SHIP));
    // Linkability is directional.
    assert!(!linkable(b, a, LinkPolicy::SAME_SHIP));
}

#[test]
fn reused_offer_is_rejected_before_linkability() {
    let snap = pair();
    let mut chain = builder();
    chain.open(&snap, &id("A")).unwrap();
    assert_eq!(chain.select_option(&snap, &id("C")), Err(ActionError::OfferReused("X1".into())));
    chain.select_option(&snap, &id("B")).unwrap();
    assert_eq!(chain.chain(), &[id("A"), id("B")]);
}

#[test]
fn save_needs_two_legs_and_reports_depth() -> Result<()> {
    let snap = pair();
    let mut chain = builder();
    let mut sink = MemoryChainSink::default();
    chain.open(&snap, &id("A"))?;
    let err = chain.save(&snap, &mut sink).unwrap_err();
    assert!(matches!(err, BerthError::Action(ActionError::ChainTooShort(1))));
    assert_eq!(chain.phase(), &ChainPhase::RootSelected);

    chain.select_option(&snap, &id("B"))?;
    let saved = chain.save(&snap, &mut sink)?;
    assert_eq!(saved.depth, 2);
    assert_eq!(saved.leg_count, 2);
    assert!(saved.id.0.starts_with("B2B-"));
    assert!(saved.id.0[4..]
        .chars()
        .all(|c| "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".contains(c)));
    assert_eq!(sink.chains, vec![saved]);
    Ok(())
}

#[test]
fn seeded_sessions_produce_the_same_ids() -> Result<()> {
    let snap = pair();
    let mut ids = Vec::new();
    for _ in 0..2 {
        let mut chain = builder();
        chain.open(&snap, &id("A"))?;
        chain.select_option(&snap, &id("B"))?;
        ids.push(chain.save(&snap, &mut MemoryChainSink::default())?.id);
    }
    assert_eq!(ids[0], ids[1]);
    Ok(())
}

fn network() -> Vec<Row> {
    vec![
        leg("a", "X1", "Oasis", "2025-06-01", 7, "Miami"),
        leg("b", "X2", "Oasis", "2025-06-08", 3, "Miami"),
        leg("b2", "X5", "Oasis", "2025-06-08", 3, "Miami"),
        leg("c", "X3", "Oasis", "2025-06-11", 4, "Miami"),
        leg("d", "X4", "Icon", "2025-06-08", 5, "Miami"),
        leg("e", "X2", "Oasis", "2025-06-15", 2, "Miami"),
        leg("f", "X6", "Oasis", "2025-06-08", 2, "Nassau"),
    ]
}

#[test]
fn candidates_carry_depth_and_tier() -> Result<()> {
    let snap = Snapshot::from_rows(network());
    let mut chain = builder();
    chain.open(&snap, &id("a"))?;
    let list = chain.candidates(&snap)?;
    let ranked: Vec<(&str, u32)> = list.all().iter().map(|c| (c.row_id.0.as_str(), c.depth)).collect();
    // e reuses b's offer, so only b2 reaches it.
    assert_eq!(ranked, vec![("b2", 3), ("b", 2)]);
    assert!(list.all().iter().all(|c| c.tier == MatchTier::Perfect));
    assert_eq!(chain.reach(&snap)?, 4);

    chain.select_option(&snap, &id("b2"))?;
    chain.select_option(&snap, &id("c"))?;
    chain.select_option(&snap, &id("e"))?;
    let last = chain.candidates(&snap)?;
    assert!(last.is_empty());
    assert_eq!(chain.reach(&snap)?, 4);
    Ok(())
}

#[test]
fn side_by_side_opens_other_ships() -> Result<()> {
    let snap = Snapshot::from_rows(network());
    let mut chain = builder();
    chain.open(&snap, &id("a"))?;
    assert_eq!(chain.select_option(&snap, &id("d")), Err(ActionError::NotLinkable(id("d"))));
    chain.set_allow_side_by_side(&snap, true)?;
    let list = chain.candidates(&snap)?;
    let last = list.all().last().map(|c| (c.row_id.clone(), c.tier, c.terminal));
    assert_eq!(last, Some((id("d"), MatchTier::SideBySide, true)));
    chain.select_option(&snap, &id("d"))?;
    assert_eq!(chain.set_allow_side_by_side(&snap, false), Err(ActionError::SideBySideInUse));

    let timeline = chain.timeline(&snap, &NoItineraries)?;
    assert_eq!(timeline[1].connection, Some(Connection::SideBySide));
    assert!(timeline.iter().all(|l| l.days.is_none()));
    Ok(())
}

#[test]
fn hidden_rows_drop_out_of_chains() -> Result<()> {
    let mut dataset = Dataset::new();
    let mut source = StaticRowSource::new(network());
    source.hidden.insert(HiddenGroup::offer("X3"));
    let snap = dataset.refresh(&source)?;
    let mut chain = builder();
    chain.open(&snap, &id("a"))?;
    // Without c nothing follows b or b2.
    assert_eq!(chain.reach(&snap)?, 2);
    assert!(chain.candidates(&snap)?.all().iter().all(|c| c.terminal));
    Ok(())
}

#[test]
fn timeline_uses_hydrated_itineraries() -> Result<()> {
    let snap = pair();
    let mut chain = builder();
    chain.open(&snap, &id("A"))?;
    chain.select_option(&snap, &id("B"))?;
    let mut lookup = MemoryItineraries::new();
    lookup.insert(
        "oasis",
        date!(2025 - 06 - 01),
        vec![ItineraryDay {
            day: 1,
            port: "Miami".into(),
            sea_day: false,
        }],
    );
    let timeline = chain.timeline(&snap, &lookup)?;
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].days.as_ref().map(Vec::len), Some(1));
    assert_eq!(timeline[0].end, Some(date!(2025 - 06 - 08)));
    assert_eq!(timeline[1].connection, Some(Connection::SameShip));
    assert!(timeline[1].days.is_none());
    Ok(())
}

#[test]
fn saved_chains_land_in_a_json_lines_file() -> Result<()> {
    let dir = TempDir::new()?;
    let mut sink = JsonChainSink::new(dir.path().join("chains").join("alice.jsonl"));
    let snap = pair();
    let mut chain = builder();
    chain.open(&snap, &id("A"))?;
    chain.select_option(&snap, &id("B"))?;
    let saved = chain.save(&snap, &mut sink)?;

    // A new chain may start once the previous one is saved.
    chain.open(&snap, &id("B"))?;
    assert_eq!(chain.phase(), &ChainPhase::RootSelected);

    let stored = sink.read_all()?;
    assert_eq!(stored, vec![saved]);
    assert!(!stored[0].allow_side_by_side);
    Ok(())
}
