//! Request-scoped unit of work
//!
//! A `UnitOfWork` gives the shadow store transaction-like behavior it does
//! not have natively. During the unit:
//! - saves and deletes are buffered, keyed by (class, id) so repeated
//!   writes of one record coalesce into the last one
//! - locks are tracked; re-locking a held key only bumps a hold count
//! - notification messages are queued
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──commit()──▶ Committed     saves → deletes → messages → release locks
//!   │
//!   └──rollback()──▶ RolledBack    discard buffers → release locks
//! ```
//!
//! Locks are released on both paths: they are leases, not data. Dropping an
//! open unit of work rolls it back.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};
use velostore_core::{RecordId, ShadowRecord, VeloError, VeloResult};
use velostore_primitives::ShadowStore;
use velostore_storage::{KvClient, Pipeline, StorePool};

use crate::lock::{LockCallback, LockKey, LockManager, LockOwner};
use crate::message::{MessagePayload, MessageRouting, QueuedMessage};

/// Lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOfWorkStatus {
    /// Accepting work
    Open,
    /// Flushed and released
    Committed,
    /// Discarded and released
    RolledBack {
        /// Why the unit ended this way
        reason: String,
    },
}

impl fmt::Display for UnitOfWorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfWorkStatus::Open => f.write_str("open"),
            UnitOfWorkStatus::Committed => f.write_str("committed"),
            UnitOfWorkStatus::RolledBack { reason } => write!(f, "rolled back ({})", reason),
        }
    }
}

/// Buffered work that a commit would apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingOperations {
    /// Buffered saves
    pub saves: usize,
    /// Buffered deletes
    pub deletes: usize,
    /// Queued messages
    pub messages: usize,
}

impl PendingOperations {
    /// Total buffered items
    pub fn total(&self) -> usize {
        self.saves + self.deletes + self.messages
    }

    /// Nothing buffered
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// What a commit did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitSummary {
    /// Records written
    pub saves: usize,
    /// Records deleted
    pub deletes: usize,
    /// Messages pushed onto live queues
    pub messages_delivered: usize,
    /// Messages skipped because their queue was not live
    pub messages_dropped: usize,
    /// Locks released
    pub locks_released: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    partition: usize,
    class: &'static str,
    id: RecordId,
}

/// Type-erased buffered record
trait PendingWrite: Send {
    fn stage_save(&mut self, client: &KvClient, pipeline: &mut Pipeline) -> VeloResult<()>;
    fn stage_delete(&self, client: &KvClient, pipeline: &mut Pipeline) -> VeloResult<()>;
}

struct Pending<T>(T);

impl<T: ShadowRecord> PendingWrite for Pending<T> {
    fn stage_save(&mut self, client: &KvClient, pipeline: &mut Pipeline) -> VeloResult<()> {
        ShadowStore::<T>::new(client.clone()).stage_put(&mut self.0, pipeline)?;
        Ok(())
    }

    fn stage_delete(&self, client: &KvClient, pipeline: &mut Pipeline) -> VeloResult<()> {
        ShadowStore::<T>::new(client.clone()).stage_delete(&self.0, pipeline)?;
        Ok(())
    }
}

struct HeldLock {
    key: LockKey,
    holds: usize,
    callbacks: Vec<LockCallback>,
}

impl HeldLock {
    fn fire_callbacks(&self) {
        for callback in &self.callbacks {
            debug!(lock = %self.key, callback = callback.name(), "firing lock callback");
            callback.fire(&self.key);
        }
    }
}

#[derive(Clone, Copy)]
enum Bucket {
    Saves,
    Deletes,
}

/// Request-scoped write-back buffer and lock tracker
pub struct UnitOfWork {
    locks: LockManager,
    owner: LockOwner,
    routing: MessageRouting,
    status: UnitOfWorkStatus,
    saves: BTreeMap<PendingKey, Box<dyn PendingWrite>>,
    deletes: BTreeMap<PendingKey, Box<dyn PendingWrite>>,
    messages: Vec<QueuedMessage>,
    held: Vec<HeldLock>,
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("owner", &self.owner)
            .field("status", &self.status)
            .field("pending", &self.pending())
            .field("held_locks", &self.held_locks())
            .finish()
    }
}

impl UnitOfWork {
    /// Begin a unit of work with a fresh lock owner
    pub fn new(locks: LockManager) -> Self {
        Self {
            locks,
            owner: LockOwner::new_unique(),
            routing: MessageRouting::default(),
            status: UnitOfWorkStatus::Open,
            saves: BTreeMap::new(),
            deletes: BTreeMap::new(),
            messages: Vec::new(),
            held: Vec::new(),
        }
    }

    /// Use a specific lock owner
    pub fn with_owner(mut self, owner: LockOwner) -> Self {
        self.owner = owner;
        self
    }

    /// Route messages somewhere other than the default queues
    pub fn with_routing(mut self, routing: MessageRouting) -> Self {
        self.routing = routing;
        self
    }

    /// Run `work` inside a fresh unit; commit on `Ok`, roll back on `Err`
    ///
    /// The work's error is returned unchanged; a rollback failure is only
    /// logged.
    pub fn run<T>(
        locks: LockManager,
        work: impl FnOnce(&mut UnitOfWork) -> VeloResult<T>,
    ) -> VeloResult<T> {
        let mut uow = UnitOfWork::new(locks);
        match work(&mut uow) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = uow.rollback() {
                    warn!(error = %rollback_error, "rollback after failed work also failed");
                }
                Err(e)
            }
        }
    }

    // === Accessors ===

    /// Lock identity of this unit
    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Lifecycle state
    pub fn status(&self) -> &UnitOfWorkStatus {
        &self.status
    }

    /// Still accepting work
    pub fn is_open(&self) -> bool {
        self.status == UnitOfWorkStatus::Open
    }

    /// Lock primitives
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Store pool
    pub fn pool(&self) -> &StorePool {
        self.locks.pool()
    }

    fn ensure_open(&self) -> VeloResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(VeloError::UnitOfWorkClosed {
                state: self.status.to_string(),
            })
        }
    }

    // === Locks ===

    /// Acquire `key`, or bump its hold count if this unit already holds it
    ///
    /// # Errors
    ///
    /// `LockTimeout` if another owner keeps the lock past the wait deadline.
    pub fn lock(&mut self, key: LockKey) -> VeloResult<()> {
        self.lock_inner(key, None)
    }

    /// Like [`lock`](Self::lock), registering a callback fired on release
    pub fn lock_with_callback(&mut self, key: LockKey, callback: LockCallback) -> VeloResult<()> {
        self.lock_inner(key, Some(callback))
    }

    fn lock_inner(&mut self, key: LockKey, callback: Option<LockCallback>) -> VeloResult<()> {
        self.ensure_open()?;
        if let Some(held) = self.held.iter_mut().find(|h| h.key == key) {
            held.holds += 1;
            if let Some(cb) = callback {
                if !held.callbacks.iter().any(|c| c.name() == cb.name()) {
                    held.callbacks.push(cb);
                }
            }
            debug!(lock = %key, holds = held.holds, "lock already held");
            return Ok(());
        }
        self.locks.acquire(&key, &self.owner)?;
        self.held.push(HeldLock {
            key,
            holds: 1,
            callbacks: callback.into_iter().collect(),
        });
        Ok(())
    }

    /// Drop one hold on `key`; the last hold fires callbacks and releases it
    ///
    /// Callbacks run while the lock is still held and tracked by this unit;
    /// the store lock and the tracking entry go away afterwards. Returns true
    /// when this call released the lock.
    pub fn unlock(&mut self, key: &LockKey) -> VeloResult<bool> {
        let Some(position) = self.held.iter().position(|h| h.key == *key) else {
            return Ok(false);
        };
        let held = &mut self.held[position];
        held.holds -= 1;
        if held.holds > 0 {
            return Ok(false);
        }
        held.fire_callbacks();
        let released = self.locks.release(key, &self.owner);
        self.held.remove(position);
        released?;
        Ok(true)
    }

    /// Whether this unit holds `key`
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.held.iter().any(|h| h.key == *key)
    }

    /// Holds this unit has on `key` (0 when not held)
    pub fn hold_count(&self, key: &LockKey) -> usize {
        self.held
            .iter()
            .find(|h| h.key == *key)
            .map_or(0, |h| h.holds)
    }

    /// Held locks in acquisition order
    pub fn held_locks(&self) -> Vec<LockKey> {
        self.held.iter().map(|h| h.key).collect()
    }

    // === Buffered writes ===

    /// Buffer a save in the record's own partition
    ///
    /// A record without identity is given one now so the caller can refer
    /// to it before commit.
    pub fn save<T: ShadowRecord>(&mut self, record: &mut T) -> VeloResult<RecordId> {
        self.save_in(T::schema().partition, record)
    }

    /// Buffer a save in an explicit partition
    pub fn save_in<T: ShadowRecord>(&mut self, partition: usize, record: &mut T) -> VeloResult<RecordId> {
        self.ensure_open()?;
        let client = self.pool().partition(partition)?;
        let id = match record.id() {
            Some(id) => id,
            None => {
                let id = ShadowStore::<T>::new(client.clone()).allocate_id()?;
                record.set_id(id);
                id
            }
        };
        let key = PendingKey {
            partition,
            class: T::schema().class,
            id,
        };
        self.saves.insert(key, Box::new(Pending(record.clone())));
        debug!(class = key.class, id = %id, "save buffered");
        Ok(id)
    }

    /// Buffer a delete in the record's own partition
    ///
    /// Returns false for a record that was never stored.
    pub fn delete<T: ShadowRecord>(&mut self, record: &T) -> VeloResult<bool> {
        self.delete_in(T::schema().partition, record)
    }

    /// Buffer a delete in an explicit partition
    pub fn delete_in<T: ShadowRecord>(&mut self, partition: usize, record: &T) -> VeloResult<bool> {
        self.ensure_open()?;
        self.pool().partition(partition)?;
        let Some(id) = record.id() else {
            return Ok(false);
        };
        let key = PendingKey {
            partition,
            class: T::schema().class,
            id,
        };
        self.deletes.insert(key, Box::new(Pending(record.clone())));
        debug!(class = key.class, id = %id, "delete buffered");
        Ok(true)
    }

    /// Queue a message for `recipient`'s live queue
    pub fn queue_message(
        &mut self,
        recipient: RecordId,
        payload: impl MessagePayload + 'static,
    ) -> VeloResult<()> {
        self.ensure_open()?;
        self.messages.push(QueuedMessage {
            recipient,
            payload: Box::new(payload),
        });
        Ok(())
    }

    /// Counts of buffered work
    pub fn pending(&self) -> PendingOperations {
        PendingOperations {
            saves: self.saves.len(),
            deletes: self.deletes.len(),
            messages: self.messages.len(),
        }
    }

    /// Throw away buffered saves, deletes and messages; locks stay held
    pub fn discard_pending(&mut self) -> PendingOperations {
        let discarded = self.pending();
        self.saves.clear();
        self.deletes.clear();
        self.messages.clear();
        if !discarded.is_empty() {
            debug!(
                saves = discarded.saves,
                deletes = discarded.deletes,
                messages = discarded.messages,
                "discarded pending work"
            );
        }
        discarded
    }

    // === Completion ===

    /// Flush buffered work, then release every lock
    ///
    /// Locks are released even when flushing fails; the unit then ends
    /// rolled back and the flush error is returned.
    pub fn commit(&mut self) -> VeloResult<CommitSummary> {
        self.ensure_open()?;
        let mut summary = CommitSummary::default();
        let flushed = self.flush(&mut summary);
        if flushed.is_err() {
            self.discard_pending();
        }
        let released = self.release_all(&mut summary);
        match flushed.and(released) {
            Ok(()) => {
                self.status = UnitOfWorkStatus::Committed;
                debug!(
                    saves = summary.saves,
                    deletes = summary.deletes,
                    messages = summary.messages_delivered,
                    locks = summary.locks_released,
                    "unit of work committed"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, "unit of work commit failed");
                self.status = UnitOfWorkStatus::RolledBack {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Discard buffered work and release every lock
    pub fn rollback(&mut self) -> VeloResult<()> {
        self.ensure_open()?;
        let discarded = self.discard_pending();
        let mut summary = CommitSummary::default();
        let released = self.release_all(&mut summary);
        self.status = UnitOfWorkStatus::RolledBack {
            reason: "rolled back".to_string(),
        };
        debug!(
            discarded = discarded.total(),
            locks = summary.locks_released,
            "unit of work rolled back"
        );
        released
    }

    fn flush(&mut self, summary: &mut CommitSummary) -> VeloResult<()> {
        let saves = std::mem::take(&mut self.saves);
        summary.saves = saves.len();
        self.flush_bucket(saves, Bucket::Saves)?;

        let deletes = std::mem::take(&mut self.deletes);
        summary.deletes = deletes.len();
        self.flush_bucket(deletes, Bucket::Deletes)?;

        self.deliver_messages(summary)
    }

    /// One pipeline per partition
    fn flush_bucket(
        &self,
        bucket: BTreeMap<PendingKey, Box<dyn PendingWrite>>,
        kind: Bucket,
    ) -> VeloResult<()> {
        let mut pipelines: BTreeMap<usize, Pipeline> = BTreeMap::new();
        for (key, mut write) in bucket {
            let client = self.pool().partition(key.partition)?;
            let pipeline = pipelines.entry(key.partition).or_default();
            match kind {
                Bucket::Saves => write.stage_save(client, pipeline)?,
                Bucket::Deletes => write.stage_delete(client, pipeline)?,
            }
        }
        for (partition, pipeline) in pipelines {
            pipeline.execute(self.pool().partition(partition)?)?;
        }
        Ok(())
    }

    fn deliver_messages(&mut self, summary: &mut CommitSummary) -> VeloResult<()> {
        let messages = std::mem::take(&mut self.messages);
        if messages.is_empty() {
            return Ok(());
        }
        let recipients: BTreeSet<RecordId> = messages.iter().map(|m| m.recipient).collect();
        let mut acquired = Vec::new();
        let delivered = self.deliver_locked(&recipients, messages, &mut acquired, summary);
        for key in acquired.iter().rev() {
            if let Err(e) = self.locks.release(key, &self.owner) {
                warn!(lock = %key, error = %e, "failed to release queue lock");
            }
        }
        delivered
    }

    fn deliver_locked(
        &self,
        recipients: &BTreeSet<RecordId>,
        messages: Vec<QueuedMessage>,
        acquired: &mut Vec<LockKey>,
        summary: &mut CommitSummary,
    ) -> VeloResult<()> {
        let routing = &self.routing;
        let client = self.pool().partition(routing.partition)?;

        // sorted order keeps concurrent committers from deadlocking
        for recipient in recipients {
            let key = LockKey::new(routing.lock_class, *recipient, routing.partition);
            if self.is_locked(&key) {
                continue;
            }
            self.locks.acquire(&key, &self.owner)?;
            acquired.push(key);
        }

        let mut live = BTreeSet::new();
        for recipient in recipients {
            if client.zcard(&routing.liveness_key(*recipient))? > 0 {
                live.insert(*recipient);
            }
        }

        let mut pipeline = Pipeline::new();
        for message in messages {
            if !live.contains(&message.recipient) {
                summary.messages_dropped += 1;
                continue;
            }
            let body = message
                .payload
                .to_json()
                .map_err(|e| VeloError::encode("message", e))?;
            pipeline.rpush(routing.queue_key(message.recipient), body);
            summary.messages_delivered += 1;
        }
        pipeline.execute(client)?;
        Ok(())
    }

    /// Newest first; each lock fires its callbacks before it is released
    fn release_all(&mut self, summary: &mut CommitSummary) -> VeloResult<()> {
        let mut first_error = None;
        while let Some(lock) = self.held.last() {
            lock.fire_callbacks();
            let key = lock.key;
            let released = self.locks.release(&key, &self.owner);
            self.held.pop();
            match released {
                Ok(_) => summary.locks_released += 1,
                Err(e) => {
                    warn!(lock = %key, error = %e, "failed to release lock");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }
        if self.held.is_empty() && self.pending().is_empty() {
            return;
        }
        warn!(owner = %self.owner, "unit of work dropped while open, rolling back");
        if let Err(e) = self.rollback() {
            warn!(error = %e, "rollback on drop failed");
        }
    }
}
