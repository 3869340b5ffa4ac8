//! Deleting a record removes it from every index

use crate::common::*;

#[test]
fn delete_clears_body_and_every_index() {
    let store = players();
    let mut p = Player::new("Eve@Example.com", "red", 4, at(5));
    let id = store.put(&mut p).unwrap();

    store.delete(&p).unwrap();

    assert_eq!(store.get(id).unwrap(), None);
    assert_eq!(
        store.get_by_hash_index(BY_EMAIL, vec!["eve@example.com".into()]).unwrap(),
        None
    );
    assert!(!store.ids_by_set_index(BY_TEAM, vec!["red".into()]).unwrap().contains(&id));
    assert!(!store.ids_by_set_index(BY_LEVEL, vec![4i64.into()]).unwrap().contains(&id));
    assert!(!store
        .ids_by_range_index(BY_JOINED, vec!["red".into()], None)
        .unwrap()
        .contains(&id));
}

#[test]
fn delete_leaves_neighbours_alone() {
    let store = players();
    let mut keep = Player::new("keep@example.com", "red", 4, at(1));
    let mut drop = Player::new("drop@example.com", "red", 4, at(2));
    store.put(&mut keep).unwrap();
    store.put(&mut drop).unwrap();

    store.delete(&drop).unwrap();

    assert_eq!(
        store.get_by_set_index(BY_TEAM, vec!["red".into()]).unwrap(),
        vec![keep.clone()]
    );
    assert_eq!(
        store.get_by_range_index(BY_JOINED, vec!["red".into()], None).unwrap(),
        vec![keep]
    );
}

#[test]
fn deleting_an_unsaved_record_is_a_noop() {
    let store = players();
    let p = Player::new("ghost@example.com", "red", 1, at(0));
    store.delete(&p).unwrap();
    assert!(store.client().keys("dbshadow").unwrap().is_empty());
}

#[test]
fn stale_index_entry_reads_as_not_found() {
    let store = players();
    let mut p = Player::new("gone@example.com", "red", 1, at(0));
    let id = store.put(&mut p).unwrap();
    // body vanishes behind the index's back
    store.client().del(&[format!("dbshadow:Player:{}", id)]).unwrap();

    assert_eq!(
        store.get_by_hash_index(BY_EMAIL, vec!["gone@example.com".into()]).unwrap(),
        None
    );
    assert!(store.get_by_set_index(BY_TEAM, vec!["red".into()]).unwrap().is_empty());
    assert!(store
        .get_by_range_index(BY_JOINED, vec!["red".into()], None)
        .unwrap()
        .is_empty());
}
