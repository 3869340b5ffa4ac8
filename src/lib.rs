//! Velostore - velocity rules over a key-value shadow store
//!
//! Velostore records weighted, timestamped events against composite entity
//! keys and evaluates sliding-window threshold rules over them. Underneath
//! sits a shadow store that mirrors structured records into a key-value
//! store with hash, set and range indexes, leased record locks, and a
//! request-scoped unit of work that buffers writes until commit.
//!
//! # Quick Start
//!
//! ```
//! use velostore::{EventRequest, EventType, RecordId, RequiredField, Rule, Trigger, VelocityConfig, VelocityEngine};
//!
//! let engine = VelocityEngine::in_memory(VelocityConfig::default())?;
//! engine.register_type(
//!     EventType::new("login_failed")
//!         .requiring(RequiredField::Principal)
//!         .with_rule(Rule::new(300, 3, Trigger::Above).with_param("reason", "too many attempts")),
//! )?;
//!
//! let mut uow = engine.begin();
//! let eval = engine.create_event(
//!     &mut uow,
//!     EventRequest::new("login_failed").principal(RecordId::Persisted(42)),
//! )?;
//! assert!(eval.violation.is_none());
//! uow.commit()?;
//! # Ok::<(), velostore::VeloError>(())
//! ```
//!
//! # Architecture
//!
//! | crate | role |
//! |---|---|
//! | `velostore-core` | ids, timestamps, schemas, traits, errors |
//! | `velostore-storage` | store commands, client, pipelines, backends |
//! | `velostore-primitives` | typed shadow records and their indexes |
//! | `velostore-concurrency` | leased locks and the unit of work |
//! | `velostore-engine` | event types, rules and the velocity engine |

pub use velostore_concurrency::{
    CommitSummary, LockCallback, LockConfig, LockKey, LockManager, LockOwner, MessagePayload,
    MessageRouting, PendingOperations, UnitOfWork, UnitOfWorkStatus,
};
pub use velostore_core::{
    FieldTransform, FieldValue, HashIndexDef, IndexField, KvBackend, RangeIndexDef, RecordId,
    RecordSchema, RequiredField, ScoreBound, SetIndexDef, ShadowRecord, Timestamp, VeloError,
    VeloResult,
};
pub use velostore_engine::{
    ActionCall, ActionRegistry, AuditEntry, AuditTrail, CancellationTokens, Evaluation,
    EvaluationMode, Event, EventKey, EventQuery, EventRequest, EventType, NoRelatedLocks,
    RelatedLocks, Rule, RuleAction, StandardRelatedLocks, SyncMode, Trigger, TypeRef,
    VelocityConfig, VelocityEngine,
};
pub use velostore_primitives::{ScoreRange, ShadowStore};
pub use velostore_storage::{KvClient, MemoryBackend, Pipeline, StorePool, TracedBackend};

#[cfg(feature = "redis")]
pub use velostore_storage::RedisBackend;
