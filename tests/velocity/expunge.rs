//! Dropping events past their expunge age

use crate::common::*;

#[test]
fn expunge_drops_live_and_cancelled_events_past_the_age() {
    let engine = engine();
    let t = engine
        .register_type(
            EventType::new("aged")
                .requiring(RequiredField::Principal)
                .with_rule(Rule::new(60, 100, Trigger::Above))
                .expunge_after(3600),
        )
        .unwrap();
    let key = EventKey::new().principal(ALICE);

    let ancient = store_event(&engine, &t, &key, 1, at(-7200));
    let mut old_cancelled = store_event(&engine, &t, &key, 1, at(-3601));
    engine.cancel(&mut old_cancelled, None).unwrap();
    let recent = store_event(&engine, &t, &key, 1, at(-100));
    let now = store_event(&engine, &t, &key, 1, at(0));

    assert_eq!(engine.expunge(&t, &key, Some(at(0))).unwrap(), 2);

    assert_eq!(engine.event_store().get(ancient.id.unwrap()).unwrap(), None);
    assert_eq!(engine.event_store().get(old_cancelled.id.unwrap()).unwrap(), None);
    let left = engine
        .get_events(
            &t,
            &key,
            EventQuery::ending_at(at(0)).starting_after(at(-10_000)).include_removed(),
        )
        .unwrap();
    assert_eq!(left, vec![recent, now]);

    // nothing more to do
    assert_eq!(engine.expunge(&t, &key, Some(at(0))).unwrap(), 0);
}

#[test]
fn default_expunge_age_is_the_longest_window() {
    let engine = engine();
    let t = engine
        .register_type(
            EventType::new("short")
                .requiring(RequiredField::Principal)
                .with_rule(Rule::new(30, 100, Trigger::Above))
                .with_rule(Rule::new(60, 100, Trigger::Above)),
        )
        .unwrap();
    let key = EventKey::new().principal(ALICE);

    store_event(&engine, &t, &key, 1, at(-61));
    let boundary = store_event(&engine, &t, &key, 1, at(-60));

    assert_eq!(engine.expunge(&t, &key, Some(at(0))).unwrap(), 1);
    assert_eq!(
        engine.event_store().get(boundary.id.unwrap()).unwrap(),
        Some(boundary)
    );
}

#[test]
fn expunge_is_scoped_to_one_composite_key() {
    let engine = engine();
    let t = engine
        .register_type(
            EventType::new("scoped")
                .requiring(RequiredField::Principal)
                .with_rule(Rule::new(60, 100, Trigger::Above)),
        )
        .unwrap();
    let alice = EventKey::new().principal(ALICE);
    let bob = EventKey::new().principal(BOB);
    store_event(&engine, &t, &alice, 1, at(-500));
    let bobs = store_event(&engine, &t, &bob, 1, at(-500));

    assert_eq!(engine.expunge(&t, &alice, Some(at(0))).unwrap(), 1);
    assert_eq!(engine.event_store().get(bobs.id.unwrap()).unwrap(), Some(bobs));
}
