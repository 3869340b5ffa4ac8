//! Serialization of concurrent evaluations on the same composite key

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn first_only(engine: &VelocityEngine) -> EventType {
    engine
        .register_type(
            EventType::new("first-only")
                .requiring(RequiredField::Principal)
                .with_rule(Rule::new(3600, 1, Trigger::Equal).with_param("first", true)),
        )
        .unwrap()
}

#[test]
fn without_the_lock_both_evaluations_miss_the_trip() {
    let engine = engine();
    let t = first_only(&engine);
    let key = EventKey::new().principal(ALICE);

    // both writers store before either evaluates
    let a = store_event(&engine, &t, &key, 1, at(0));
    let b = store_event(&engine, &t, &key, 1, at(0));

    let mut trips = 0;
    for event in [&a, &b] {
        let events = engine.get_events(&t, &key, EventQuery::ending_at(at(0))).unwrap();
        assert_eq!(events.iter().map(|e| e.weight).sum::<i64>(), 2);
        let mut uow = engine.begin();
        if engine.apply_rules(&mut uow, &t, event, &events, None, false).unwrap().is_some() {
            trips += 1;
        }
        uow.commit().unwrap();
    }
    assert_eq!(trips, 0);
}

#[test]
fn with_the_lock_exactly_one_evaluation_trips() {
    let engine = engine();
    let t = first_only(&engine);
    let request = || EventRequest::new("first-only").principal(ALICE).at(at(0));

    let mut first = engine.begin();
    let a = engine.create_event(&mut first, request()).unwrap();
    assert!(a.is_violation());

    // the second writer cannot get in while the first holds the principal lock
    let mut blocked = impatient_uow(&engine);
    let err = engine.create_event(&mut blocked, request()).unwrap_err();
    assert!(matches!(err, VeloError::LockTimeout { .. }));
    assert_eq!(
        engine.get_events(&t, &EventKey::new().principal(ALICE), EventQuery::ending_at(at(0))).unwrap().len(),
        1
    );
    blocked.rollback().unwrap();

    first.commit().unwrap();

    let b = evaluate(&engine, request());
    assert!(!b.is_violation());
    assert_eq!(
        engine.get_events(&t, &EventKey::new().principal(ALICE), EventQuery::ending_at(at(0))).unwrap().len(),
        2
    );
}

#[test]
fn principal_lock_is_held_until_the_unit_ends() {
    let engine = engine();
    first_only(&engine);

    let mut uow = engine.begin();
    engine
        .create_event(&mut uow, EventRequest::new("first-only").principal(ALICE).at(at(0)))
        .unwrap();
    let queue_lock = LockKey::new("MessageQueue", ALICE, 0);
    assert!(uow.is_locked(&queue_lock));
    assert_eq!(uow.held_locks(), vec![queue_lock]);

    // a second evaluation in the same unit reuses the lock
    engine
        .create_event(&mut uow, EventRequest::new("first-only").principal(ALICE).at(at(1)))
        .unwrap();
    assert_eq!(uow.hold_count(&queue_lock), 2);

    uow.commit().unwrap();
    assert!(engine
        .lock_manager()
        .try_acquire(&queue_lock, &LockOwner::new_unique())
        .unwrap());
}

#[test]
fn turn_locks_come_before_the_principal_lock() {
    let engine = engine();
    engine
        .register_type(
            EventType::new("in-room")
                .requiring(RequiredField::Principal)
                .requiring(RequiredField::PrimaryContext)
                .requiring(RequiredField::SecondaryContext)
                .with_rule(Rule::new(60, 10, Trigger::Above)),
        )
        .unwrap();
    let room = RecordId::Persisted(7);
    let seat = RecordId::Persisted(8);

    let mut uow = engine.begin();
    engine
        .create_event(
            &mut uow,
            EventRequest::new("in-room")
                .principal(ALICE)
                .primary_context(room)
                .secondary_context(seat)
                .at(at(0)),
        )
        .unwrap();
    assert_eq!(
        uow.held_locks(),
        vec![
            LockKey::new("SecondaryContextTurn", seat, 0),
            LockKey::new("PrimaryContextTurn", room, 0),
            LockKey::new("MessageQueue", ALICE, 0),
        ]
    );
    uow.commit().unwrap();
}

#[test]
fn other_principals_are_not_blocked() {
    let engine = engine();
    first_only(&engine);

    let mut alice = engine.begin();
    engine
        .create_event(&mut alice, EventRequest::new("first-only").principal(ALICE).at(at(0)))
        .unwrap();

    let mut bob = impatient_uow(&engine);
    let evaluation = engine
        .create_event(&mut bob, EventRequest::new("first-only").principal(BOB).at(at(0)))
        .unwrap();
    assert!(evaluation.is_violation());
    bob.commit().unwrap();
    alice.commit().unwrap();
}

#[test]
fn concurrent_writers_produce_exactly_one_trip() {
    const WRITERS: usize = 8;
    let engine = engine();
    let t = first_only(&engine);
    let trips = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..WRITERS {
            s.spawn(|| {
                let evaluation = evaluate(
                    &engine,
                    EventRequest::new("first-only").principal(ALICE).at(at(0)),
                );
                if evaluation.is_violation() {
                    trips.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(trips.load(Ordering::SeqCst), 1);
    let stored = engine
        .get_events(&t, &EventKey::new().principal(ALICE), EventQuery::ending_at(at(0)))
        .unwrap();
    assert_eq!(stored.len(), WRITERS);
}
