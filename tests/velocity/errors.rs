//! Failures reported to the caller unchanged

use crate::common::*;

#[test]
fn unknown_tag_is_reported() {
    let engine = engine();
    let mut uow = engine.begin();
    let err = engine
        .create_event(&mut uow, EventRequest::new("missing").principal(ALICE))
        .unwrap_err();
    assert!(matches!(err, VeloError::UnknownEventType { ref tag } if tag == "missing"));
    assert!(uow.held_locks().is_empty());
}

#[test]
fn missing_required_field_stores_nothing_and_locks_nothing() {
    let engine = engine();
    let t = engine
        .register_type(
            EventType::new("strict")
                .requiring(RequiredField::Principal)
                .requiring(RequiredField::UniqueId)
                .with_rule(Rule::new(60, 1, Trigger::Above)),
        )
        .unwrap();

    let mut uow = engine.begin();
    let err = engine
        .create_event(&mut uow, EventRequest::new("strict").at(at(0)))
        .unwrap_err();
    assert!(matches!(
        err,
        VeloError::MissingRequiredField {
            field: RequiredField::Principal
        }
    ));

    let err = engine
        .create_event(&mut uow, EventRequest::new("strict").principal(ALICE).at(at(0)))
        .unwrap_err();
    assert!(matches!(
        err,
        VeloError::MissingRequiredField {
            field: RequiredField::UniqueId
        }
    ));
    assert!(uow.held_locks().is_empty());
    uow.rollback().unwrap();

    let key = EventKey::new().principal(ALICE).unique_id("u-1");
    assert!(engine
        .get_events(&t, &key, EventQuery::ending_at(at(0)))
        .unwrap()
        .is_empty());
    assert!(matches!(
        engine.get_events(&t, &EventKey::new(), EventQuery::new()),
        Err(VeloError::MissingRequiredField { .. })
    ));
}

#[test]
fn unregistered_types_cannot_be_queried() {
    let engine = engine();
    let loose = EventType::new("loose").with_rule(Rule::new(60, 1, Trigger::Above));
    assert!(matches!(
        engine.get_events(&loose, &EventKey::new(), EventQuery::new()),
        Err(VeloError::InvalidInput { .. })
    ));
}

#[test]
fn malformed_types_are_rejected() {
    let engine = engine();
    assert!(matches!(
        engine.register_type(EventType::new("")),
        Err(VeloError::InvalidInput { .. })
    ));
    assert!(matches!(
        engine.register_type(EventType::new("instant").with_rule(Rule::new(0, 1, Trigger::Above))),
        Err(VeloError::InvalidInput { .. })
    ));
}

#[test]
fn engine_refuses_a_pool_that_is_too_small() {
    init_tracing();
    let err = VelocityEngine::new(StorePool::in_memory(1), fast_config()).unwrap_err();
    assert!(matches!(err, VeloError::Config { .. }));
}

#[test]
fn engine_loads_its_config_from_a_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("velostore.toml");
    VelocityConfig::write_default_if_missing(&path).unwrap();

    let mut config = VelocityConfig::from_file(&path).unwrap();
    assert!(config.uses_default_secret());
    config.cancel_secret = "rotated".into();
    config.write_to_file(&path).unwrap();

    let reloaded = VelocityConfig::from_file(&path).unwrap();
    assert_eq!(reloaded.cancel_secret, "rotated");
    let engine = VelocityEngine::in_memory(reloaded).unwrap();
    assert_eq!(engine.pool().len(), engine.config().partitions);
}

#[test]
fn engine_works_over_a_traced_pool() {
    init_tracing();
    let engine = VelocityEngine::new(StorePool::in_memory_traced(2), fast_config()).unwrap();
    engine
        .register_type(
            EventType::new("traced")
                .requiring(RequiredField::Principal)
                .with_rule(Rule::new(60, 0, Trigger::Above)),
        )
        .unwrap();
    let evaluation = evaluate(&engine, EventRequest::new("traced").principal(ALICE).at(at(0)));
    assert!(evaluation.is_violation());
}
