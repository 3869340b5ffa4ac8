//! Every lookup path returns the record exactly as written

use crate::common::*;
use proptest::prelude::*;

fn seed(store: &ShadowStore<Player>) -> Vec<Player> {
    let mut out = Vec::new();
    for (email, team, level, offset) in [
        ("Ann@Example.com", "red", 3, 30),
        ("bo@example.com", "red", 5, 10),
        ("cy@example.com", "blue", 3, 20),
    ] {
        let mut p = Player::new(email, team, level, at(offset));
        store.put(&mut p).unwrap();
        out.push(p);
    }
    out
}

#[test]
fn put_assigns_shadow_ids_counting_down() {
    let store = players();
    let ps = seed(&store);
    let ids: Vec<i64> = ps.iter().map(|p| p.id.unwrap().to_raw().unwrap()).collect();
    assert_eq!(ids, vec![-1, -2, -3]);
}

#[test]
fn persisted_ids_are_kept() {
    let store = players();
    let mut p = Player::new("dee@example.com", "green", 1, at(0));
    p.id = Some(RecordId::Persisted(900));
    assert_eq!(store.put(&mut p).unwrap(), RecordId::Persisted(900));
    assert_eq!(store.get(RecordId::Persisted(900)).unwrap(), Some(p));
}

#[test]
fn get_by_id_round_trips() {
    let store = players();
    for p in seed(&store) {
        assert_eq!(store.get(p.id.unwrap()).unwrap(), Some(p));
    }
}

#[test]
fn hash_index_is_case_insensitive_when_declared() {
    let store = players();
    let ps = seed(&store);
    let found = store
        .get_by_hash_index(BY_EMAIL, vec!["ANN@EXAMPLE.COM".into()])
        .unwrap();
    assert_eq!(found, Some(ps[0].clone()));
    assert_eq!(
        store.get_by_hash_index(BY_EMAIL, vec!["nobody@example.com".into()]).unwrap(),
        None
    );
}

#[test]
fn set_index_and_intersection() {
    let store = players();
    let ps = seed(&store);

    let mut red = store.get_by_set_index(BY_TEAM, vec!["red".into()]).unwrap();
    red.sort_by_key(|p| p.email.clone());
    assert_eq!(red, vec![ps[0].clone(), ps[1].clone()]);

    let red_level_3 = store
        .intersect_set_indexes(vec![
            (BY_TEAM, vec!["red".into()]),
            (BY_LEVEL, vec![3i64.into()]),
        ])
        .unwrap();
    assert_eq!(red_level_3, vec![ps[0].clone()]);
}

#[test]
fn range_index_orders_by_score() {
    let store = players();
    let ps = seed(&store);
    let red = store.get_by_range_index(BY_JOINED, vec!["red".into()], None).unwrap();
    assert_eq!(red, vec![ps[1].clone(), ps[0].clone()]);

    let window = store
        .get_by_range_index(
            BY_JOINED,
            vec!["red".into()],
            Some((
                ScoreBound::Exclusive(at(10).index_score()),
                ScoreBound::Inclusive(at(30).index_score()),
            )),
        )
        .unwrap();
    assert_eq!(window, vec![ps[0].clone()]);
}

#[test]
fn get_many_skips_missing_and_keeps_order() {
    let store = players();
    let ps = seed(&store);
    let ids = vec![ps[2].id.unwrap(), RecordId::Shadow(99), ps[0].id.unwrap()];
    assert_eq!(store.get_many(&ids).unwrap(), vec![ps[2].clone(), ps[0].clone()]);

    let map = store
        .get_map(vec![ps[1].id.unwrap(), ps[1].id.unwrap()])
        .unwrap();
    assert_eq!(map.len(), 1);
}

#[test]
fn wrong_arity_lookup_is_rejected() {
    let store = players();
    let err = store
        .get_by_set_index(BY_TEAM, vec!["red".into(), "extra".into()])
        .unwrap_err();
    assert!(matches!(err, VeloError::InvalidInput { .. }));
    assert!(matches!(
        store.get_by_set_index(7, vec!["red".into()]),
        Err(VeloError::UnknownIndex { .. })
    ));
}

#[test]
fn malformed_body_is_a_decode_error() {
    let store = players();
    store.client().set("dbshadow:Player:-1", "{not json").unwrap();
    assert!(matches!(
        store.get(RecordId::Shadow(1)),
        Err(VeloError::Decode { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn range_queries_match_a_linear_filter(
        offsets in proptest::collection::vec(-5_000i64..5_000, 1..20),
        lo in -6_000i64..6_000,
        span in 0i64..6_000,
    ) {
        let store = players();
        let mut written = Vec::new();
        for (n, offset) in offsets.iter().enumerate() {
            let mut p = Player::new(&format!("p{}@x", n), "t", 0, at(*offset));
            store.put(&mut p).unwrap();
            written.push(p);
        }
        let hi = lo + span;
        let got = store
            .get_by_range_index(
                BY_JOINED,
                vec!["t".into()],
                Some((
                    ScoreBound::Exclusive(at(lo).index_score()),
                    ScoreBound::Inclusive(at(hi).index_score()),
                )),
            )
            .unwrap();

        let mut expected: Vec<Player> = written
            .into_iter()
            .filter(|p| {
                let t = p.joined_at.unwrap();
                t > at(lo) && t <= at(hi)
            })
            .collect();
        // ties are ordered by member text
        expected.sort_by_key(|p| (p.joined_at, p.id.unwrap().to_string()));
        prop_assert_eq!(got, expected);
    }
}
