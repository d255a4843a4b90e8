#![allow(missing_docs)]

use std::collections::BTreeSet;

use berth::{
    chain::{linkable, ChainBuilder, LinkPolicy},
    config::EngineOptions,
    dataset::{NoItineraries, Offer, Row, Sailing, Snapshot},
    filter::{persist, FilterEngine, MemoryFilterStore, Operator},
    index::FieldKey,
    types::ProfileKey,
};
use proptest::prelude::*;

const SHIPS: [&str; 3] = ["Oasis", "Icon", "Wonder"];
const PORTS: [&str; 2] = ["Miami", "Nassau"];

#[derive(Debug, Clone)]
struct Shape {
    ship: usize,
    offer: u8,
    day: u8,
    nights: u8,
    port: usize,
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    (0..SHIPS.len(), 0u8..6, 1u8..20, 1u8..5, 0..PORTS.len()).prop_map(|(ship, offer, day, nights, port)| Shape {
        ship,
        offer,
        day,
        nights,
        port,
    })
}

fn rows(shapes: &[Shape]) -> Vec<Row> {
    shapes
        .iter()
        .enumerate()
        .map(|(i, s)| {
            Row::new(
                format!("r{i}"),
                Offer {
                    code: format!("X{}", s.offer),
                    ..Offer::default()
                },
                Sailing {
                    ship_name: SHIPS[s.ship].into(),
                    sail_date: format!("2025-06-{:02}", s.day),
                    nights: Some(u32::from(s.nights)),
                    departure_port: Some(PORTS[s.port].into()),
                    ..Sailing::default()
                },
            )
        })
        .collect()
}

fn engine() -> FilterEngine {
    let mut engine = FilterEngine::new(ProfileKey::from("p"), EngineOptions::default(), Box::new(MemoryFilterStore::new()));
    engine.enable();
    engine
}

fn ids(engine: &FilterEngine, snap: &Snapshot) -> BTreeSet<usize> {
    engine.evaluate_positions(snap, &NoItineraries).into_iter().collect()
}

proptest! {
    #[test]
    fn adding_in_values_never_shrinks_the_result(
        shapes in prop::collection::vec(arb_shape(), 1..30),
        first in 0..SHIPS.len(),
        extra in 0..SHIPS.len(),
    ) {
        let snap = Snapshot::from_rows(rows(&shapes));
        let mut engine = engine();
        let id = engine.add_predicate(FieldKey::Ship).unwrap();
        engine.set_values(id, [SHIPS[first]]).unwrap();
        engine.commit(id).unwrap();
        let narrow = ids(&engine, &snap);

        engine.add_value(id, SHIPS[extra]).unwrap();
        engine.commit(id).unwrap();
        let wide = ids(&engine, &snap);
        prop_assert!(narrow.is_subset(&wide));
    }

    #[test]
    fn committing_another_predicate_never_grows_the_result(
        shapes in prop::collection::vec(arb_shape(), 1..30),
        ship in 0..SHIPS.len(),
        bound in 1u8..6,
    ) {
        let snap = Snapshot::from_rows(rows(&shapes));
        let mut engine = engine();
        let first = engine.add_predicate(FieldKey::Ship).unwrap();
        engine.set_values(first, [SHIPS[ship]]).unwrap();
        engine.commit(first).unwrap();
        let before = ids(&engine, &snap);

        let second = engine.add_predicate(FieldKey::Nights).unwrap();
        engine.set_operator(second, Operator::LessThan).unwrap();
        engine.set_values(second, [bound.to_string()]).unwrap();
        prop_assert_eq!(ids(&engine, &snap), before.clone());
        engine.commit(second).unwrap();
        let after = ids(&engine, &snap);
        prop_assert!(after.is_subset(&before));
        for idx in &after {
            prop_assert!(u32::from(shapes[*idx].nights) < u32::from(bound));
        }
    }

    #[test]
    fn stored_sessions_decode_to_the_same_predicates(
        ships in prop::collection::vec(0..SHIPS.len(), 1..4),
        bound in 1u32..30,
        enabled in any::<bool>(),
        taxes in any::<bool>(),
    ) {
        let mut engine = engine();
        let ship = engine.add_predicate(FieldKey::Ship).unwrap();
        engine.set_values(ship, ships.iter().map(|&i| SHIPS[i])).unwrap();
        engine.commit(ship).unwrap();
        let price = engine.add_predicate(FieldKey::Price).unwrap();
        engine.set_operator(price, Operator::GreaterThan).unwrap();
        engine.set_values(price, [format!("${bound}00")]).unwrap();
        engine.commit(price).unwrap();
        if !enabled {
            engine.disable();
        }
        engine.set_include_taxes(taxes);

        let encoded = persist::encode(engine.state()).unwrap();
        let decoded = persist::decode(&encoded);
        prop_assert_eq!(&decoded, engine.state());
    }

    #[test]
    fn chains_never_reuse_an_offer(
        shapes in prop::collection::vec(arb_shape(), 2..25),
        picks in prop::collection::vec(0usize..25, 1..10),
        side_by_side in any::<bool>(),
    ) {
        let snap = Snapshot::from_rows(rows(&shapes));
        let mut chain = ChainBuilder::new(ProfileKey::from("p"), &EngineOptions::default())
            .with_seed(1);
        chain.set_allow_side_by_side(&snap, side_by_side).unwrap();
        chain.open(&snap, &snap.row(0).id).unwrap();
        for pick in picks {
            let candidates = chain.candidates(&snap).unwrap();
            let options = candidates.all();
            if options.is_empty() {
                // Nothing listed must also mean nothing is accepted.
                for row in snap.rows() {
                    prop_assert!(chain.select_option(&snap, &row.id).is_err());
                }
                break;
            }
            let next = options[pick % options.len()].row_id.clone();
            chain.select_option(&snap, &next).unwrap();
        }

        let legs: Vec<usize> = chain.chain().iter().filter_map(|id| snap.position(id)).collect();
        let offers: BTreeSet<&str> = legs.iter().map(|&i| snap.meta(i).offer_code.as_str()).collect();
        prop_assert_eq!(offers.len(), legs.len());
        let policy = LinkPolicy::new(side_by_side);
        for pair in legs.windows(2) {
            prop_assert!(linkable(snap.meta(pair[0]), snap.meta(pair[1]), policy));
        }
    }
}
