//! Locks on the entities an event touches
//!
//! Evaluations that share an entity must be serialized, or two concurrent
//! increments can both read the pre-increment sum and an `equal` trigger
//! never fires. Which lock guards which entity belongs to the entity's
//! owner; the engine only asks a [`RelatedLocks`] implementation to take
//! them.

use velostore_concurrency::{LockKey, MessageRouting, UnitOfWork};
use velostore_core::{RequiredField, VeloResult};

use crate::event::EventKey;
use crate::event_type::EventType;

/// Acquires the locks an evaluation must hold
pub trait RelatedLocks: Send + Sync {
    /// Take the locks for `key` inside `uow`
    ///
    /// Implementations must acquire in one fixed, system-wide order.
    fn lock_related(&self, uow: &mut UnitOfWork, event_type: &EventType, key: &EventKey) -> VeloResult<()>;
}

/// Locks turn and queue resources of required entities
///
/// Acquisition order, fixed system-wide:
/// 1. secondary-context turn lock
/// 2. primary-context turn lock
/// 3. principal queue lock
///
/// Only entities the type requires are locked. The principal queue lock is
/// the same lock message delivery takes, so it defaults to the
/// [`MessageRouting`] lock class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardRelatedLocks {
    /// Lock class of secondary-context turns
    pub secondary_turn_class: &'static str,
    /// Lock class of primary-context turns
    pub primary_turn_class: &'static str,
    /// Lock class of principal queues
    pub principal_queue_class: &'static str,
    /// Partition holding the lock keys
    pub partition: usize,
}

impl Default for StandardRelatedLocks {
    fn default() -> Self {
        let routing = MessageRouting::default();
        Self {
            secondary_turn_class: "SecondaryContextTurn",
            primary_turn_class: "PrimaryContextTurn",
            principal_queue_class: routing.lock_class,
            partition: routing.partition,
        }
    }
}

impl StandardRelatedLocks {
    /// Locks `key` needs under `event_type`, in acquisition order
    pub fn keys_for(&self, event_type: &EventType, key: &EventKey) -> Vec<LockKey> {
        let plan = [
            (RequiredField::SecondaryContext, self.secondary_turn_class, key.secondary_context),
            (RequiredField::PrimaryContext, self.primary_turn_class, key.primary_context),
            (RequiredField::Principal, self.principal_queue_class, key.principal),
        ];
        plan.into_iter()
            .filter(|(field, _, _)| event_type.requires(*field))
            .filter_map(|(_, class, id)| id.map(|id| LockKey::new(class, id, self.partition)))
            .collect()
    }
}

impl RelatedLocks for StandardRelatedLocks {
    fn lock_related(&self, uow: &mut UnitOfWork, event_type: &EventType, key: &EventKey) -> VeloResult<()> {
        for lock in self.keys_for(event_type, key) {
            uow.lock(lock)?;
        }
        Ok(())
    }
}

/// Takes no locks
///
/// Evaluations are then unserialized; only for callers that already hold
/// whatever serializes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRelatedLocks;

impl RelatedLocks for NoRelatedLocks {
    fn lock_related(&self, _uow: &mut UnitOfWork, _event_type: &EventType, _key: &EventKey) -> VeloResult<()> {
        Ok(())
    }
}
