//! Index flush and rebuild

use crate::common::*;

#[test]
fn updates_leave_stale_entries_until_reindex() {
    let store = players();
    let mut p = Player::new("mover@example.com", "red", 1, at(0));
    let id = store.put(&mut p).unwrap();

    p.team = Some("blue".into());
    store.put(&mut p).unwrap();

    // the old bucket still names the record, but resolves to its new state
    assert!(store.ids_by_set_index(BY_TEAM, vec!["red".into()]).unwrap().contains(&id));
    assert_eq!(
        store.get_by_set_index(BY_TEAM, vec!["blue".into()]).unwrap(),
        vec![p.clone()]
    );

    let indexed = store.reindex().unwrap();
    assert_eq!(indexed, 1);
    assert!(store.ids_by_set_index(BY_TEAM, vec!["red".into()]).unwrap().is_empty());
    assert_eq!(
        store.ids_by_range_index(BY_JOINED, vec!["blue".into()], None).unwrap(),
        vec![id]
    );
}

#[test]
fn flush_then_reindex_restores_lookups() {
    let store = players();
    let mut a = Player::new("a@example.com", "red", 1, at(0));
    let mut b = Player::new("b@example.com", "red", 2, at(1));
    store.put(&mut a).unwrap();
    store.put(&mut b).unwrap();

    assert!(store.flush_indexes().unwrap() > 0);
    assert!(store.get_by_set_index(BY_TEAM, vec!["red".into()]).unwrap().is_empty());
    assert_eq!(store.get(a.id.unwrap()).unwrap(), Some(a.clone()));

    assert_eq!(store.reindex().unwrap(), 2);
    assert_eq!(
        store.get_by_range_index(BY_JOINED, vec!["red".into()], None).unwrap(),
        vec![a.clone(), b]
    );
    assert_eq!(
        store.get_by_hash_index(BY_EMAIL, vec!["A@EXAMPLE.COM".into()]).unwrap(),
        Some(a)
    );
}

#[test]
fn put_without_indexes_touches_only_the_body() {
    let store = players();
    let mut p = Player::new("quiet@example.com", "red", 1, at(0));
    let id = store.put_without_indexes(&mut p).unwrap();
    assert_eq!(store.get(id).unwrap(), Some(p));
    assert!(store.ids_by_set_index(BY_TEAM, vec!["red".into()]).unwrap().is_empty());
}

#[test]
fn traced_pool_behaves_like_plain_pool() {
    init_tracing();
    let store: ShadowStore<Player> = ShadowStore::for_pool(&StorePool::in_memory_traced(1)).unwrap();
    let mut p = Player::new("loud@example.com", "red", 1, at(0));
    let id = store.put(&mut p).unwrap();
    assert_eq!(store.get(id).unwrap(), Some(p));
}
