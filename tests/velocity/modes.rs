//! Normal, test and test-and-save evaluation

use crate::common::*;
use serde_json::json;

fn burst_type(engine: &VelocityEngine) -> EventType {
    engine
        .register_type(
            EventType::new("burst")
                .requiring(RequiredField::Principal)
                .with_rule(Rule::new(60, 5, Trigger::Above).with_param("reason", "burst")),
        )
        .unwrap()
}

fn stored(engine: &VelocityEngine, event_type: &EventType) -> Vec<Event> {
    engine
        .get_events(
            event_type,
            &EventKey::new().principal(ALICE),
            EventQuery::ending_at(at(3600)).starting_after(at(-3600)),
        )
        .unwrap()
}

#[test]
fn normal_mode_stores_before_evaluating() {
    let engine = engine();
    let t = burst_type(&engine);

    let evaluation = evaluate(&engine, EventRequest::new("burst").principal(ALICE).at(at(0)));
    assert!(evaluation.persisted);
    let id = evaluation.event.id.unwrap();
    assert!(matches!(id, RecordId::Shadow(_)));
    assert_eq!(stored(&engine, &t), vec![evaluation.event]);
}

#[test]
fn test_mode_never_persists() {
    let engine = engine();
    let t = burst_type(&engine);
    let key = EventKey::new().principal(ALICE);

    for _ in 0..10 {
        let mut uow = engine.begin();
        let evaluation = engine
            .test_event(&mut uow, EventRequest::new("burst").key(key.clone()).at(at(0)))
            .unwrap();
        uow.commit().unwrap();
        assert!(!evaluation.persisted);
        assert_eq!(evaluation.event.id, None);
        // only the tested event itself is ever in its window
        assert!(!evaluation.is_violation());
    }

    assert!(stored(&engine, &t).is_empty());
    let type_id = t.id.unwrap();
    let live = engine
        .event_store()
        .ids_by_range_index(
            0,
            vec![
                type_id.into(),
                Some(ALICE).into(),
                None::<RecordId>.into(),
                None::<RecordId>.into(),
                None::<String>.into(),
            ],
            None,
        )
        .unwrap();
    assert!(live.is_empty());
}

#[test]
fn test_mode_counts_the_tested_event() {
    let engine = engine();
    let t = burst_type(&engine);
    let key = EventKey::new().principal(ALICE);
    for offset in -5..0 {
        store_event(&engine, &t, &key, 1, at(offset));
    }

    let mut uow = engine.begin();
    let evaluation = engine
        .test_event(&mut uow, EventRequest::new("burst").key(key).at(at(0)))
        .unwrap();
    uow.commit().unwrap();

    assert_eq!(evaluation.violation, Some(json!({"reason": "burst"}).as_object().unwrap().clone()));
    assert_eq!(stored(&engine, &t).len(), 5);
}

#[test]
fn test_and_save_persists_only_when_unblocked() {
    let engine = engine();
    let t = burst_type(&engine);
    for offset in [-40, -30, -20, -10] {
        evaluate(&engine, EventRequest::new("burst").principal(ALICE).at(at(offset)));
    }

    let fifth = evaluate(
        &engine,
        EventRequest::new("burst")
            .principal(ALICE)
            .at(at(0))
            .mode(EvaluationMode::TestAndSave),
    );
    assert!(!fifth.is_violation());
    assert!(fifth.persisted);
    assert!(fifth.event.id.is_some());
    assert_eq!(stored(&engine, &t).len(), 5);

    let sixth = evaluate(
        &engine,
        EventRequest::new("burst")
            .principal(ALICE)
            .at(at(1))
            .mode(EvaluationMode::TestAndSave),
    );
    let violation = sixth.violation.unwrap();
    assert_eq!(violation.get("reason"), Some(&json!("burst")));
    assert!(!sixth.persisted);
    assert_eq!(sixth.event.id, None);
    assert_eq!(stored(&engine, &t).len(), 5);
}

#[test]
fn normal_event_survives_rollback() {
    let engine = engine();
    let t = burst_type(&engine);

    let mut uow = engine.begin();
    let evaluation = engine
        .create_event(&mut uow, EventRequest::new("burst").principal(ALICE).at(at(0)))
        .unwrap();
    uow.rollback().unwrap();

    assert_eq!(stored(&engine, &t), vec![evaluation.event]);
}

#[test]
fn weights_add_up() {
    let engine = engine();
    burst_type(&engine);

    let light = evaluate(&engine, EventRequest::new("burst").principal(ALICE).weight(5).at(at(0)));
    assert!(!light.is_violation());
    let heavy = evaluate(&engine, EventRequest::new("burst").principal(ALICE).weight(1).at(at(1)));
    assert!(heavy.is_violation());
}

#[test]
fn resolved_type_skips_the_tag_lookup() {
    let engine = engine();
    let t = burst_type(&engine);

    let evaluation = evaluate(&engine, EventRequest::for_type(t.clone()).principal(ALICE).at(at(0)));
    assert_eq!(evaluation.event.type_id, t.id);
}
