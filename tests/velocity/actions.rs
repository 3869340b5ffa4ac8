//! Rule actions running inside the caller's unit of work

use crate::common::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Engine whose "flag" action writes an audit entry
fn flagging_engine() -> VelocityEngine {
    init_tracing();
    let config = fast_config();
    let pool = config.memory_pool();
    let trail = AuditTrail::new(&pool, config.audit_partition).unwrap();

    let mut actions = ActionRegistry::new();
    actions.register_fn("flag", move |uow, call| {
        let mut entry = AuditEntry::new("velocity", call.event_type.tag.clone())
            .at(call.event.created_at)
            .details(json!({"weight": call.weight, "params": call.params}));
        if let Some(principal) = call.event.principal_id {
            entry = entry.principal(principal);
        }
        trail.record(uow, entry)?;
        Ok(())
    });

    let engine = VelocityEngine::new(pool, config).unwrap().with_actions(actions);
    engine
        .register_type(
            EventType::new("spam")
                .requiring(RequiredField::Principal)
                .with_rule(
                    Rule::new(3600, 2, Trigger::Above)
                        .with_action("flag")
                        .with_param("severity", "high"),
                ),
        )
        .unwrap();
    engine
}

fn flags(engine: &VelocityEngine) -> Vec<AuditEntry> {
    engine.audit().by_kind("velocity").unwrap()
}

#[test]
fn firing_rule_runs_its_action_with_weight_and_params() {
    let engine = flagging_engine();
    for offset in 0..2 {
        evaluate(&engine, EventRequest::new("spam").principal(ALICE).at(at(offset)));
    }
    assert!(flags(&engine).is_empty());

    let third = evaluate(&engine, EventRequest::new("spam").principal(ALICE).at(at(2)));
    // action rules never report a violation
    assert!(!third.is_violation());

    let flagged = flags(&engine);
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].principal_id, Some(ALICE));
    assert_eq!(flagged[0].unique_id, "spam");
    assert_eq!(flagged[0].created_at, at(2));
    assert_eq!(flagged[0].details["weight"], json!(3));
    assert_eq!(flagged[0].details["params"]["severity"], json!("high"));

    let by_alice = engine.audit().by_principal(Some(ALICE), at(0), at(2)).unwrap();
    assert_eq!(by_alice, flagged);
}

#[test]
fn test_modes_never_run_actions() {
    let engine = flagging_engine();
    let key = EventKey::new().principal(ALICE);
    let t = engine.resolve_type("spam").unwrap();
    for offset in 0..5 {
        store_event(&engine, &t, &key, 1, at(offset));
    }

    for mode in [EvaluationMode::Test, EvaluationMode::TestAndSave] {
        evaluate(
            &engine,
            EventRequest::new("spam").key(key.clone()).at(at(6)).mode(mode),
        );
    }
    assert!(flags(&engine).is_empty());
}

#[test]
fn rollback_discards_action_writes_but_not_the_event() {
    let engine = flagging_engine();
    let key = EventKey::new().principal(ALICE);
    let t = engine.resolve_type("spam").unwrap();
    store_event(&engine, &t, &key, 1, at(0));
    store_event(&engine, &t, &key, 1, at(1));

    let mut uow = engine.begin();
    engine
        .create_event(&mut uow, EventRequest::new("spam").key(key.clone()).at(at(2)))
        .unwrap();
    assert_eq!(uow.pending().saves, 1);
    uow.rollback().unwrap();

    assert!(flags(&engine).is_empty());
    assert_eq!(
        engine.get_events(&t, &key, EventQuery::ending_at(at(2))).unwrap().len(),
        3
    );
}

#[test]
fn failing_action_propagates_its_error() {
    init_tracing();
    let mut actions = ActionRegistry::new();
    actions.register_fn("explode", |_, _| Err(VeloError::invalid_input("boom")));
    let engine = VelocityEngine::in_memory(fast_config())
        .unwrap()
        .with_actions(actions);
    engine
        .register_type(
            EventType::new("fragile").with_rule(Rule::new(60, 0, Trigger::Above).with_action("explode")),
        )
        .unwrap();

    let mut uow = engine.begin();
    let err = engine
        .create_event(&mut uow, EventRequest::new("fragile").at(at(0)))
        .unwrap_err();
    assert!(matches!(err, VeloError::InvalidInput { .. }));
    uow.rollback().unwrap();
}

#[test]
fn check_and_action_rules_mix() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut actions = ActionRegistry::new();
    {
        let calls = Arc::clone(&calls);
        actions.register_fn("count", move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    let engine = VelocityEngine::in_memory(fast_config())
        .unwrap()
        .with_actions(actions);
    engine
        .register_type(
            EventType::new("mixed")
                .with_rule(Rule::new(60, 1, Trigger::Above).with_param("level", "soft"))
                .with_rule(Rule::new(60, 1, Trigger::Above).with_action("count"))
                .with_rule(Rule::new(60, 1, Trigger::Above).with_param("level", "hard")),
        )
        .unwrap();

    evaluate(&engine, EventRequest::new("mixed").unique_id("k").at(at(0)));
    let second = evaluate(&engine, EventRequest::new("mixed").unique_id("k").at(at(1)));

    assert_eq!(second.violation.unwrap()["level"], json!("hard"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unknown_actions_are_rejected_at_registration() {
    let engine = engine();
    let err = engine
        .register_type(EventType::new("bad").with_rule(Rule::new(60, 1, Trigger::Above).with_action("nope")))
        .unwrap_err();
    assert!(matches!(err, VeloError::UnknownAction { ref name } if name == "nope"));
    assert!(matches!(
        engine.resolve_type("bad"),
        Err(VeloError::UnknownEventType { .. })
    ));
}
