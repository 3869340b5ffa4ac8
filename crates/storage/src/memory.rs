//! MemoryBackend: in-process key-value backend
//!
//! Implements the full command model of [`KvBackend`] against a single
//! keyspace guarded by a `parking_lot::RwLock`:
//! - Strings, hashes, sets, sorted sets and lists, one kind per key
//! - Leased keys (SET with TTL) expire logically at read time and are swept
//!   from the [`ExpiryIndex`] on `purge_expired`
//! - Batches run under one write-lock acquisition, so no reader ever sees a
//!   partially applied batch
//!
//! # Redis Compatibility
//!
//! Semantics follow the Redis commands the model is named after: DECR of a
//! missing key yields -1, emptied containers disappear, sorted-set ties are
//! ordered by member, and touching a key of another kind is a `WrongType`
//! error.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use velostore_core::{Command, KvBackend, Reply, ScoreBound, Timestamp, VeloError, VeloResult};

use crate::ttl::ExpiryIndex;

#[derive(Debug, Clone)]
enum Data {
    Str(String),
    Hash(FxHashMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(SortedSet),
    List(Vec<String>),
}

impl Data {
    fn is_empty_container(&self) -> bool {
        match self {
            Data::Str(_) => false,
            Data::Hash(h) => h.is_empty(),
            Data::Set(s) => s.is_empty(),
            Data::ZSet(z) => z.scores.is_empty(),
            Data::List(l) => l.is_empty(),
        }
    }
}

/// Sorted set: member → score plus (score, member) ordering
#[derive(Debug, Clone, Default)]
struct SortedSet {
    scores: FxHashMap<String, i64>,
    order: BTreeSet<(i64, String)>,
}

impl SortedSet {
    /// Returns true when the member is new
    fn insert(&mut self, member: String, score: i64) -> bool {
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.order.remove(&(old, member.clone()));
                self.order.insert((score, member));
                false
            }
            None => {
                self.order.insert((score, member));
                true
            }
        }
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.order.remove(&(old, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn range(&self, min: ScoreBound, max: ScoreBound) -> Vec<String> {
        let start = match min {
            ScoreBound::Inclusive(b) | ScoreBound::Exclusive(b) => (b, String::new()),
            ScoreBound::Unbounded => (i64::MIN, String::new()),
        };
        self.order
            .range(start..)
            .skip_while(|(score, _)| !min.admits_from_below(*score))
            .take_while(|(score, _)| max.admits_from_above(*score))
            .map(|(_, member)| member.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: Data,
    expires_at: Option<Timestamp>,
}

impl Entry {
    fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: FxHashMap<String, Entry>,
    expiry: ExpiryIndex,
}

impl Keyspace {
    fn live(&self, key: &str, now: Timestamp) -> Option<&Entry> {
        self.entries.get(key).filter(|e| !e.is_expired(now))
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if let Some(at) = entry.expires_at {
            self.expiry.remove(at, key);
        }
        Some(entry)
    }

    fn purge_if_expired(&mut self, key: &str, now: Timestamp) {
        if self.entries.get(key).map_or(false, |e| e.is_expired(now)) {
            self.remove(key);
        }
    }

    /// Live entry for writing, created empty via `empty` when absent
    fn slot(&mut self, key: &str, now: Timestamp, empty: fn() -> Data) -> &mut Entry {
        self.purge_if_expired(key, now);
        self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            data: empty(),
            expires_at: None,
        })
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).map_or(false, |e| e.data.is_empty_container()) {
            self.remove(key);
        }
    }

    // ---------------------------------------------------------------------
    // Typed read access
    // ---------------------------------------------------------------------

    fn string(&self, key: &str, now: Timestamp) -> VeloResult<Option<&String>> {
        match self.live(key, now).map(|e| &e.data) {
            None => Ok(None),
            Some(Data::Str(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hash(&self, key: &str, now: Timestamp) -> VeloResult<Option<&FxHashMap<String, String>>> {
        match self.live(key, now).map(|e| &e.data) {
            None => Ok(None),
            Some(Data::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set(&self, key: &str, now: Timestamp) -> VeloResult<Option<&BTreeSet<String>>> {
        match self.live(key, now).map(|e| &e.data) {
            None => Ok(None),
            Some(Data::Set(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn zset(&self, key: &str, now: Timestamp) -> VeloResult<Option<&SortedSet>> {
        match self.live(key, now).map(|e| &e.data) {
            None => Ok(None),
            Some(Data::ZSet(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn list(&self, key: &str, now: Timestamp) -> VeloResult<Option<&Vec<String>>> {
        match self.live(key, now).map(|e| &e.data) {
            None => Ok(None),
            Some(Data::List(l)) => Ok(Some(l)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    // ---------------------------------------------------------------------
    // Command execution
    // ---------------------------------------------------------------------

    fn read(&self, command: &Command, now: Timestamp) -> VeloResult<Reply> {
        let reply = match command {
            Command::Get { key } => opt_text(self.string(key, now)?.cloned()),
            Command::MGet { keys } => Reply::Array(
                keys.iter()
                    .map(|k| match self.live(k, now).map(|e| &e.data) {
                        Some(Data::Str(s)) => Reply::Text(s.clone()),
                        _ => Reply::Nil,
                    })
                    .collect(),
            ),
            Command::Exists { key } => Reply::Int(i64::from(self.live(key, now).is_some())),
            Command::HGet { key, field } => {
                opt_text(self.hash(key, now)?.and_then(|h| h.get(field).cloned()))
            }
            Command::SMembers { key } => texts(
                self.set(key, now)?
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default(),
            ),
            Command::SInter { keys } => texts(self.intersect(keys, now)?),
            Command::ZRange { key } => texts(
                self.zset(key, now)?
                    .map(|z| z.range(ScoreBound::Unbounded, ScoreBound::Unbounded))
                    .unwrap_or_default(),
            ),
            Command::ZRangeByScore { key, min, max } => texts(
                self.zset(key, now)?
                    .map(|z| z.range(*min, *max))
                    .unwrap_or_default(),
            ),
            Command::ZCard { key } => Reply::Int(
                self.zset(key, now)?
                    .map_or(0, |z| z.scores.len() as i64),
            ),
            Command::LRange { key } => {
                texts(self.list(key, now)?.cloned().unwrap_or_default())
            }
            Command::Keys { prefix } => {
                let mut keys: Vec<String> = self
                    .entries
                    .iter()
                    .filter(|(k, e)| k.starts_with(prefix.as_str()) && !e.is_expired(now))
                    .map(|(k, _)| k.clone())
                    .collect();
                keys.sort();
                texts(keys)
            }
            other => {
                return Err(VeloError::storage(format!(
                    "{} is not a read command",
                    other.name()
                )))
            }
        };
        Ok(reply)
    }

    fn intersect(&self, keys: &[String], now: Timestamp) -> VeloResult<Vec<String>> {
        let mut sets = Vec::with_capacity(keys.len());
        for key in keys {
            match self.set(key, now)? {
                Some(s) => sets.push(s),
                None => return Ok(Vec::new()),
            }
        }
        sets.sort_by_key(|s| s.len());
        let Some((smallest, rest)) = sets.split_first() else {
            return Ok(Vec::new());
        };
        Ok(smallest
            .iter()
            .filter(|m| rest.iter().all(|s| s.contains(*m)))
            .cloned()
            .collect())
    }

    fn write(&mut self, command: Command, now: Timestamp) -> VeloResult<Reply> {
        let reply = match command {
            Command::Set {
                key,
                value,
                ttl,
                only_if_absent,
            } => {
                if only_if_absent && self.live(&key, now).is_some() {
                    return Ok(Reply::Nil);
                }
                self.remove(&key);
                let expires_at = ttl.map(|d| now.saturating_add(d));
                if let Some(at) = expires_at {
                    self.expiry.insert(at, key.clone());
                }
                self.entries.insert(
                    key,
                    Entry {
                        data: Data::Str(value),
                        expires_at,
                    },
                );
                Reply::Ok
            }
            Command::Del { keys } => {
                let mut removed = 0;
                for key in keys {
                    self.purge_if_expired(&key, now);
                    if self.remove(&key).is_some() {
                        removed += 1;
                    }
                }
                Reply::Int(removed)
            }
            Command::Decr { key } => {
                let current = match self.string(&key, now)? {
                    None => 0,
                    Some(s) => s.parse::<i64>().map_err(|_| {
                        VeloError::storage(format!("value at {} is not an integer", key))
                    })?,
                };
                let next = current
                    .checked_sub(1)
                    .ok_or_else(|| VeloError::storage(format!("decrement would overflow {}", key)))?;
                let entry = self.slot(&key, now, || Data::Str(String::new()));
                entry.data = Data::Str(next.to_string());
                Reply::Int(next)
            }
            Command::HSet { key, field, value } => {
                self.hash(&key, now)?;
                match &mut self.slot(&key, now, || Data::Hash(FxHashMap::default())).data {
                    Data::Hash(h) => Reply::Int(i64::from(h.insert(field, value).is_none())),
                    _ => return Err(wrong_type(&key)),
                }
            }
            Command::HDel { key, field } => {
                let present = self.hash(&key, now)?.is_some();
                let removed = present
                    && match self.entries.get_mut(&key).map(|e| &mut e.data) {
                        Some(Data::Hash(h)) => h.remove(&field).is_some(),
                        _ => false,
                    };
                self.drop_if_empty(&key);
                Reply::Int(i64::from(removed))
            }
            Command::SAdd { key, member } => {
                self.set(&key, now)?;
                match &mut self.slot(&key, now, || Data::Set(BTreeSet::new())).data {
                    Data::Set(s) => Reply::Int(i64::from(s.insert(member))),
                    _ => return Err(wrong_type(&key)),
                }
            }
            Command::SRem { key, member } => {
                let present = self.set(&key, now)?.is_some();
                let removed = present
                    && match self.entries.get_mut(&key).map(|e| &mut e.data) {
                        Some(Data::Set(s)) => s.remove(&member),
                        _ => false,
                    };
                self.drop_if_empty(&key);
                Reply::Int(i64::from(removed))
            }
            Command::ZAdd { key, score, member } => {
                self.zset(&key, now)?;
                match &mut self.slot(&key, now, || Data::ZSet(SortedSet::default())).data {
                    Data::ZSet(z) => Reply::Int(i64::from(z.insert(member, score))),
                    _ => return Err(wrong_type(&key)),
                }
            }
            Command::ZRem { key, member } => {
                let present = self.zset(&key, now)?.is_some();
                let removed = present
                    && match self.entries.get_mut(&key).map(|e| &mut e.data) {
                        Some(Data::ZSet(z)) => z.remove(&member),
                        _ => false,
                    };
                self.drop_if_empty(&key);
                Reply::Int(i64::from(removed))
            }
            Command::RPush { key, value } => {
                self.list(&key, now)?;
                match &mut self.slot(&key, now, || Data::List(Vec::new())).data {
                    Data::List(l) => {
                        l.push(value);
                        Reply::Int(l.len() as i64)
                    }
                    _ => return Err(wrong_type(&key)),
                }
            }
            Command::CompareAndDelete { key, expected } => {
                let matches = self.string(&key, now)?.map_or(false, |v| *v == expected);
                if matches {
                    self.remove(&key);
                }
                Reply::Int(i64::from(matches))
            }
            read_only => self.read(&read_only, now)?,
        };
        Ok(reply)
    }

    fn purge_expired(&mut self, now: Timestamp) -> usize {
        let mut purged = 0;
        for (at, key) in self.expiry.drain_due(now) {
            let still_due = self
                .entries
                .get(&key)
                .map_or(false, |e| e.expires_at == Some(at));
            if still_due {
                self.entries.remove(&key);
                purged += 1;
            }
        }
        purged
    }
}

fn wrong_type(key: &str) -> VeloError {
    VeloError::WrongType {
        key: key.to_string(),
    }
}

fn opt_text(value: Option<String>) -> Reply {
    match value {
        Some(s) => Reply::Text(s),
        None => Reply::Nil,
    }
}

fn texts(values: Vec<String>) -> Reply {
    Reply::Array(values.into_iter().map(Reply::Text).collect())
}

/// In-process backend
///
/// # Example
///
/// ```
/// use velostore_core::{Command, KvBackend, Reply};
/// use velostore_storage::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// let reply = backend.execute(Command::Decr { key: "ids".into() }).unwrap();
/// assert_eq!(reply, Reply::Int(-1));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    keyspace: RwLock<Keyspace>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Timestamp::now();
        self.keyspace
            .read()
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physically remove every expired key; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.keyspace.write().purge_expired(Timestamp::now())
    }
}

impl KvBackend for MemoryBackend {
    fn execute(&self, command: Command) -> VeloResult<Reply> {
        let now = Timestamp::now();
        if command.is_write() {
            self.keyspace.write().write(command, now)
        } else {
            self.keyspace.read().read(&command, now)
        }
    }

    fn execute_batch(&self, commands: Vec<Command>) -> VeloResult<Vec<Reply>> {
        let now = Timestamp::now();
        let mut keyspace = self.keyspace.write();
        commands
            .into_iter()
            .map(|command| keyspace.write(command, now))
            .collect()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
