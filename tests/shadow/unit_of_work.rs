//! Buffered writes, locks and messages through a unit of work

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn setup() -> (StorePool, LockManager, ShadowStore<Player>) {
    init_tracing();
    let pool = StorePool::in_memory(1);
    let locks = LockManager::new(pool.clone(), short_locks());
    let store = ShadowStore::for_pool(&pool).unwrap();
    (pool, locks, store)
}

#[test]
fn commit_makes_saves_visible() {
    let (_pool, locks, store) = setup();
    let mut uow = UnitOfWork::new(locks);
    let mut p = Player::new("c@example.com", "red", 1, at(0));

    let id = uow.save(&mut p).unwrap();
    assert_eq!(p.id, Some(id));
    assert_eq!(store.get(id).unwrap(), None);

    let summary = uow.commit().unwrap();
    assert_eq!(summary.saves, 1);
    assert_eq!(store.get(id).unwrap(), Some(p));
    assert_eq!(uow.status(), &UnitOfWorkStatus::Committed);
}

#[test]
fn rollback_leaves_no_trace() {
    let (pool, locks, store) = setup();
    let mut uow = UnitOfWork::new(locks);
    let mut p = Player::new("r@example.com", "red", 1, at(0));
    let id = uow.save(&mut p).unwrap();
    uow.lock(LockKey::for_record::<Player>(id)).unwrap();

    uow.rollback().unwrap();

    assert_eq!(store.get(id).unwrap(), None);
    assert!(store.ids_by_set_index(BY_TEAM, vec!["red".into()]).unwrap().is_empty());
    // only the id counter remains
    let client = pool.partition(0).unwrap();
    assert!(client.keys("dbshadow:").unwrap().is_empty());
    assert!(client.keys("dbshadow_lock:").unwrap().is_empty());
}

#[test]
fn closed_unit_refuses_more_work() {
    let (_pool, locks, _store) = setup();
    let mut uow = UnitOfWork::new(locks);
    uow.commit().unwrap();

    let mut p = Player::new("late@example.com", "red", 1, at(0));
    assert!(matches!(
        uow.save(&mut p),
        Err(VeloError::UnitOfWorkClosed { .. })
    ));
    assert!(uow.commit().is_err());
}

#[test]
fn repeated_saves_coalesce_to_last_state() {
    let (_pool, locks, store) = setup();
    let mut uow = UnitOfWork::new(locks);
    let mut p = Player::new("co@example.com", "red", 1, at(0));
    uow.save(&mut p).unwrap();
    p.level = 2;
    uow.save(&mut p).unwrap();
    p.level = 3;
    uow.save(&mut p).unwrap();
    assert_eq!(uow.pending().saves, 1);

    uow.commit().unwrap();
    assert_eq!(store.get(p.id.unwrap()).unwrap().map(|s| s.level), Some(3));
}

#[test]
fn buffered_delete_applies_after_saves() {
    let (_pool, locks, store) = setup();
    let mut p = Player::new("d@example.com", "red", 1, at(0));
    let id = store.put(&mut p).unwrap();

    let mut uow = UnitOfWork::new(locks);
    assert!(uow.delete(&p).unwrap());
    assert!(!uow.delete(&Player::default()).unwrap());
    let summary = uow.commit().unwrap();

    assert_eq!(summary.deletes, 1);
    assert_eq!(store.get(id).unwrap(), None);
}

#[test]
fn held_lock_blocks_other_units_until_commit() {
    let (_pool, locks, _store) = setup();
    let key = LockKey::new("Player", RecordId::Persisted(7), 0);

    let mut first = UnitOfWork::new(locks.clone());
    first.lock(key).unwrap();

    let mut second = UnitOfWork::new(locks.clone());
    assert!(matches!(second.lock(key), Err(VeloError::LockTimeout { .. })));

    first.commit().unwrap();
    second.lock(key).unwrap();
    assert!(second.is_locked(&key));
    second.rollback().unwrap();
}

#[test]
fn reentrant_locks_release_once_and_fire_callbacks_once() {
    let (_pool, locks, _store) = setup();
    let key = LockKey::new("Player", RecordId::Persisted(8), 0);
    let fired = Arc::new(AtomicUsize::new(0));
    let callback = {
        let fired = Arc::clone(&fired);
        LockCallback::new("count", move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    let mut uow = UnitOfWork::new(locks.clone());
    uow.lock_with_callback(key, callback.clone()).unwrap();
    uow.lock_with_callback(key, callback).unwrap();
    assert_eq!(uow.hold_count(&key), 2);

    assert!(!uow.unlock(&key).unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(uow.unlock(&key).unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!uow.unlock(&key).unwrap());

    // free for anyone now
    let owner = LockOwner::new_unique();
    assert!(locks.try_acquire(&key, &owner).unwrap());
}

#[test]
fn commit_force_releases_nested_holds() {
    let (_pool, locks, _store) = setup();
    let key = LockKey::new("Player", RecordId::Persisted(9), 0);
    let mut uow = UnitOfWork::new(locks.clone());
    uow.lock(key).unwrap();
    uow.lock(key).unwrap();

    let summary = uow.commit().unwrap();
    assert_eq!(summary.locks_released, 1);
    assert!(locks.try_acquire(&key, &LockOwner::new_unique()).unwrap());
}

#[test]
fn messages_reach_live_queues_only() {
    let (pool, locks, _store) = setup();
    let routing = MessageRouting::default();
    let client = pool.partition(routing.partition).unwrap();
    let mut live = Pipeline::new();
    live.zadd(routing.liveness_key(ALICE), 1, "session-1");
    live.execute(&client).unwrap();

    let mut uow = UnitOfWork::new(locks);
    uow.queue_message(ALICE, serde_json::json!({"kind": "limit", "n": 1})).unwrap();
    uow.queue_message(BOB, serde_json::json!({"kind": "limit", "n": 2})).unwrap();
    assert_eq!(uow.pending().messages, 2);
    assert!(client.lrange(&routing.queue_key(ALICE)).unwrap().is_empty());

    let summary = uow.commit().unwrap();
    assert_eq!(summary.messages_delivered, 1);
    assert_eq!(summary.messages_dropped, 1);

    let queued = client.lrange(&routing.queue_key(ALICE)).unwrap();
    assert_eq!(queued.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&queued[0]).unwrap();
    assert_eq!(payload["n"], 1);
    assert!(client.lrange(&routing.queue_key(BOB)).unwrap().is_empty());
}

#[test]
fn rolled_back_messages_are_never_delivered() {
    let (pool, locks, _store) = setup();
    let routing = MessageRouting::default();
    let client = pool.partition(0).unwrap();
    let mut live = Pipeline::new();
    live.zadd(routing.liveness_key(ALICE), 1, "session-1");
    live.execute(&client).unwrap();

    let mut uow = UnitOfWork::new(locks);
    uow.queue_message(ALICE, "hello").unwrap();
    uow.rollback().unwrap();

    assert!(client.lrange(&routing.queue_key(ALICE)).unwrap().is_empty());
}

#[test]
fn run_commits_on_ok_and_rolls_back_on_err() {
    let (_pool, locks, store) = setup();

    let id = UnitOfWork::run(locks.clone(), |uow| {
        let mut p = Player::new("ok@example.com", "red", 1, at(0));
        uow.save(&mut p)
    })
    .unwrap();
    assert!(store.get(id).unwrap().is_some());

    let mut doomed = None;
    let result: VeloResult<()> = UnitOfWork::run(locks, |uow| {
        let mut p = Player::new("err@example.com", "red", 1, at(0));
        doomed = Some(uow.save(&mut p)?);
        Err(VeloError::invalid_input("nope"))
    });
    assert!(matches!(result, Err(VeloError::InvalidInput { .. })));
    assert_eq!(store.get(doomed.unwrap()).unwrap(), None);
}

#[test]
fn dropping_an_open_unit_releases_its_locks() {
    let (_pool, locks, _store) = setup();
    let key = LockKey::new("Player", RecordId::Persisted(10), 0);
    {
        let mut uow = UnitOfWork::new(locks.clone());
        uow.lock(key).unwrap();
    }
    assert!(locks.try_acquire(&key, &LockOwner::new_unique()).unwrap());
}
