//! Leased record locks
//!
//! A lock is a string key `dbshadow_lock:{class}:{id}` set with NX and a
//! lease, holding the owner's identity. Release is a server-side
//! compare-and-delete, so a holder whose lease already expired can never
//! clear somebody else's lock.
//!
//! ## Acquire protocol
//!
//! ```text
//! loop until deadline:
//!     SET key owner NX PX lease   → claimed? done
//!     sleep uniform(poll_min, poll_max)
//! LockTimeout
//! ```

use once_cell::sync::Lazy;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;
use velostore_core::{RecordId, ShadowRecord, VeloError, VeloResult};
use velostore_primitives::keys;
use velostore_storage::{KvClient, StorePool};

/// Identity of this process instance, `{pid}:{uuid}`
static PROCESS_TAG: Lazy<String> =
    Lazy::new(|| format!("{}:{}", std::process::id(), Uuid::new_v4().simple()));

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// A lockable resource: one record of one class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    /// Partition the lock key lives in
    pub partition: usize,
    /// Class name
    pub class: &'static str,
    /// Record id
    pub id: RecordId,
}

impl LockKey {
    /// Lock on an arbitrary class
    pub const fn new(class: &'static str, id: RecordId, partition: usize) -> Self {
        Self {
            partition,
            class,
            id,
        }
    }

    /// Lock on a record of `T`, in `T`'s partition
    pub fn for_record<T: ShadowRecord>(id: RecordId) -> Self {
        let schema = T::schema();
        Self::new(schema.class, id, schema.partition)
    }

    /// Store key
    pub fn store_key(&self) -> String {
        keys::lock_key(self.class, self.id)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.id)
    }
}

/// Value written into a held lock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockOwner(String);

impl LockOwner {
    /// The identity shared by everything in this process
    pub fn process() -> Self {
        LockOwner(PROCESS_TAG.clone())
    }

    /// A fresh identity, distinct from every other owner in any process
    pub fn new_unique() -> Self {
        let n = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        LockOwner(format!("{}:{}", *PROCESS_TAG, n))
    }

    /// Owner string as stored
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Timing of lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Give up acquiring after this long
    pub wait: Duration,
    /// Lease on a claimed lock
    pub lease: Duration,
    /// Shortest sleep between attempts
    pub poll_min: Duration,
    /// Longest sleep between attempts
    pub poll_max: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(5),
            lease: Duration::from_secs(30),
            poll_min: Duration::from_millis(75),
            poll_max: Duration::from_millis(125),
        }
    }
}

impl LockConfig {
    fn jitter(&self) -> Duration {
        if self.poll_max <= self.poll_min {
            return self.poll_min;
        }
        rand::thread_rng().gen_range(self.poll_min..=self.poll_max)
    }
}

/// Lock primitives over a store pool
#[derive(Debug, Clone)]
pub struct LockManager {
    pool: StorePool,
    config: LockConfig,
}

impl LockManager {
    /// Create a manager
    pub fn new(pool: StorePool, config: LockConfig) -> Self {
        Self { pool, config }
    }

    /// Store pool
    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    /// Timing configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn client(&self, key: &LockKey) -> VeloResult<&KvClient> {
        self.pool.partition(key.partition)
    }

    /// One attempt; true when claimed
    pub fn try_acquire(&self, key: &LockKey, owner: &LockOwner) -> VeloResult<bool> {
        self.client(key)?
            .set_nx_with_ttl(&key.store_key(), owner.as_str(), self.config.lease)
    }

    /// Poll with jitter until claimed or the deadline passes
    ///
    /// # Errors
    ///
    /// `LockTimeout` when the deadline passes first.
    pub fn acquire(&self, key: &LockKey, owner: &LockOwner) -> VeloResult<()> {
        let started = Instant::now();
        let deadline = started + self.config.wait;
        debug!(lock = %key, owner = %owner, "acquiring lock");
        loop {
            if self.try_acquire(key, owner)? {
                debug!(lock = %key, waited_ms = started.elapsed().as_millis() as u64, "lock acquired");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                let waited = now - started;
                warn!(lock = %key, waited_ms = waited.as_millis() as u64, "lock timeout");
                return Err(VeloError::LockTimeout {
                    key: key.store_key(),
                    waited,
                });
            }
            std::thread::sleep(self.config.jitter().min(deadline - now));
        }
    }

    /// Release if still held by `owner`
    ///
    /// False means the lease had expired or someone else holds the lock;
    /// that is not an error.
    pub fn release(&self, key: &LockKey, owner: &LockOwner) -> VeloResult<bool> {
        let released = self
            .client(key)?
            .compare_and_delete(&key.store_key(), owner.as_str())?;
        if released {
            debug!(lock = %key, "lock released");
        } else {
            debug!(lock = %key, "lock already expired or taken over");
        }
        Ok(released)
    }
}

/// Named hook fired when a lock is released
#[derive(Clone)]
pub struct LockCallback {
    name: String,
    callback: Arc<dyn Fn(&LockKey) + Send + Sync>,
}

impl LockCallback {
    /// Create a callback; registering the same name twice on one lock keeps
    /// only the first
    pub fn new(name: impl Into<String>, callback: impl Fn(&LockKey) + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// Callback name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn fire(&self, key: &LockKey) {
        (self.callback)(key)
    }
}

impl fmt::Debug for LockCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCallback").field("name", &self.name).finish()
    }
}
