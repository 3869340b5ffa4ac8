//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::sync::Once;
use std::time::Duration;
pub use velostore::*;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (shown with --nocapture)
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Time
// ============================================================================

/// Fixed reference instant: 2023-11-14T22:13:20Z
pub const T0_SECS: i64 = 1_700_000_000;

/// `T0` shifted by whole seconds
pub fn at(offset_secs: i64) -> Timestamp {
    Timestamp::from_secs(T0_SECS + offset_secs)
}

/// `T0` shifted by microseconds
pub fn at_micros(offset_micros: i64) -> Timestamp {
    Timestamp::from_micros(T0_SECS * 1_000_000 + offset_micros)
}

// ============================================================================
// Engine
// ============================================================================

/// Default config with fast lock polling
pub fn fast_config() -> VelocityConfig {
    VelocityConfig {
        lock_wait_ms: 2000,
        lock_poll_min_ms: 1,
        lock_poll_max_ms: 3,
        cancel_secret: "test-secret".into(),
        ..VelocityConfig::default()
    }
}

/// In-memory engine with fast lock polling
pub fn engine() -> VelocityEngine {
    init_tracing();
    VelocityEngine::in_memory(fast_config()).unwrap()
}

/// Principal ids used across tests
pub const ALICE: RecordId = RecordId::Persisted(101);
pub const BOB: RecordId = RecordId::Persisted(102);

/// Lock timings that give up almost immediately
pub fn short_locks() -> LockConfig {
    LockConfig {
        wait: Duration::from_millis(20),
        lease: Duration::from_secs(30),
        poll_min: Duration::from_millis(1),
        poll_max: Duration::from_millis(3),
    }
}

/// Unit of work over the engine's pool whose locks give up almost immediately
pub fn impatient_uow(engine: &VelocityEngine) -> UnitOfWork {
    UnitOfWork::new(LockManager::new(engine.pool().clone(), short_locks()))
}

/// Evaluate `request` in its own unit of work and commit
pub fn evaluate(engine: &VelocityEngine, request: EventRequest) -> Evaluation {
    let mut uow = engine.begin();
    let evaluation = engine.create_event(&mut uow, request).unwrap();
    uow.commit().unwrap();
    evaluation
}

/// Store an event directly, bypassing evaluation and locks
pub fn store_event(
    engine: &VelocityEngine,
    event_type: &EventType,
    key: &EventKey,
    weight: i64,
    created_at: Timestamp,
) -> Event {
    let type_id = event_type.id.unwrap();
    let mut event = Event::new(type_id, key, weight, created_at);
    engine.event_store().put(&mut event).unwrap();
    event
}

// ============================================================================
// Shadow records
// ============================================================================

pub static PLAYER: RecordSchema = RecordSchema {
    class: "Player",
    partition: 0,
    fields: &["id", "email", "team", "level", "joined_at", "nickname"],
    hash_indexes: &[HashIndexDef {
        fields: &[IndexField::with_transforms("email", &[FieldTransform::Lower])],
    }],
    set_indexes: &[
        SetIndexDef {
            fields: &[IndexField::new("team")],
        },
        SetIndexDef {
            fields: &[IndexField::new("level")],
        },
    ],
    range_indexes: &[RangeIndexDef {
        score: "joined_at",
        fields: &[IndexField::new("team")],
    }],
};

pub const BY_EMAIL: usize = 0;
pub const BY_TEAM: usize = 0;
pub const BY_LEVEL: usize = 1;
pub const BY_JOINED: usize = 0;

/// Record exercising every index flavor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Player {
    pub id: Option<RecordId>,
    pub email: String,
    pub team: Option<String>,
    pub level: i64,
    pub joined_at: Option<Timestamp>,
    pub nickname: Option<String>,
}

impl Player {
    pub fn new(email: &str, team: &str, level: i64, joined_at: Timestamp) -> Self {
        Self {
            id: None,
            email: email.into(),
            team: Some(team.into()),
            level,
            joined_at: Some(joined_at),
            nickname: None,
        }
    }
}

impl ShadowRecord for Player {
    fn schema() -> &'static RecordSchema {
        &PLAYER
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn field_value(&self, field: &str) -> VeloResult<FieldValue> {
        match field {
            "email" => Ok(self.email.as_str().into()),
            "team" => Ok(self.team.clone().into()),
            "level" => Ok(self.level.into()),
            "joined_at" => Ok(self.joined_at.into()),
            other => Err(VeloError::UnknownField {
                class: "Player".into(),
                field: other.into(),
            }),
        }
    }
}

/// Store of players over a fresh single-partition pool
pub fn players() -> ShadowStore<Player> {
    init_tracing();
    ShadowStore::for_pool(&StorePool::in_memory(1)).unwrap()
}
