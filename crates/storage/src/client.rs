//! Typed client over a [`KvBackend`]
//!
//! [`KvClient`] is a cheap, cloneable handle that turns raw [`Reply`] values
//! into the Rust types callers want. [`Pipeline`] collects commands and ships
//! them to the backend as one atomic batch.

use std::sync::Arc;
use std::time::Duration;
use velostore_core::{Command, KvBackend, Reply, ScoreBound, VeloResult};

/// Handle to one store partition
#[derive(Clone)]
pub struct KvClient {
    backend: Arc<dyn KvBackend>,
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl KvClient {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Underlying backend
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Execute a raw command
    pub fn execute(&self, command: Command) -> VeloResult<Reply> {
        self.backend.execute(command)
    }

    /// Start an empty pipeline bound to this client
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new()
    }

    /// GET
    pub fn get(&self, key: &str) -> VeloResult<Option<String>> {
        self.execute(Command::Get { key: key.to_string() })?
            .into_opt_text()
    }

    /// SET without lease
    pub fn set(&self, key: &str, value: impl Into<String>) -> VeloResult<()> {
        self.execute(Command::Set {
            key: key.to_string(),
            value: value.into(),
            ttl: None,
            only_if_absent: false,
        })?;
        Ok(())
    }

    /// SET NX with a lease; true when the key was claimed
    pub fn set_nx_with_ttl(
        &self,
        key: &str,
        value: impl Into<String>,
        ttl: Duration,
    ) -> VeloResult<bool> {
        self.execute(Command::Set {
            key: key.to_string(),
            value: value.into(),
            ttl: Some(ttl),
            only_if_absent: true,
        })?
        .into_bool()
    }

    /// MGET; positions of missing keys are `None`
    pub fn mget(&self, keys: &[String]) -> VeloResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.execute(Command::MGet {
            keys: keys.to_vec(),
        })?
        .into_opt_texts()
    }

    /// DEL; returns the number of keys removed
    pub fn del(&self, keys: &[String]) -> VeloResult<i64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.execute(Command::Del {
            keys: keys.to_vec(),
        })?
        .into_int()
    }

    /// EXISTS
    pub fn exists(&self, key: &str) -> VeloResult<bool> {
        self.execute(Command::Exists { key: key.to_string() })?
            .into_bool()
    }

    /// DECR
    pub fn decr(&self, key: &str) -> VeloResult<i64> {
        self.execute(Command::Decr { key: key.to_string() })?
            .into_int()
    }

    /// HGET
    pub fn hget(&self, key: &str, field: &str) -> VeloResult<Option<String>> {
        self.execute(Command::HGet {
            key: key.to_string(),
            field: field.to_string(),
        })?
        .into_opt_text()
    }

    /// SMEMBERS
    pub fn smembers(&self, key: &str) -> VeloResult<Vec<String>> {
        self.execute(Command::SMembers { key: key.to_string() })?
            .into_texts()
    }

    /// SINTER
    pub fn sinter(&self, keys: &[String]) -> VeloResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.execute(Command::SInter {
            keys: keys.to_vec(),
        })?
        .into_texts()
    }

    /// ZRANGE 0 -1
    pub fn zrange(&self, key: &str) -> VeloResult<Vec<String>> {
        self.execute(Command::ZRange { key: key.to_string() })?
            .into_texts()
    }

    /// ZRANGEBYSCORE
    pub fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> VeloResult<Vec<String>> {
        self.execute(Command::ZRangeByScore {
            key: key.to_string(),
            min,
            max,
        })?
        .into_texts()
    }

    /// ZCARD
    pub fn zcard(&self, key: &str) -> VeloResult<i64> {
        self.execute(Command::ZCard { key: key.to_string() })?
            .into_int()
    }

    /// RPUSH; returns the new list length
    pub fn rpush(&self, key: &str, value: impl Into<String>) -> VeloResult<i64> {
        self.execute(Command::RPush {
            key: key.to_string(),
            value: value.into(),
        })?
        .into_int()
    }

    /// LRANGE 0 -1
    pub fn lrange(&self, key: &str) -> VeloResult<Vec<String>> {
        self.execute(Command::LRange { key: key.to_string() })?
            .into_texts()
    }

    /// KEYS prefix*
    pub fn keys(&self, prefix: &str) -> VeloResult<Vec<String>> {
        self.execute(Command::Keys {
            prefix: prefix.to_string(),
        })?
        .into_texts()
    }

    /// Delete `key` only if it holds `expected`; true when deleted
    pub fn compare_and_delete(&self, key: &str, expected: &str) -> VeloResult<bool> {
        self.execute(Command::CompareAndDelete {
            key: key.to_string(),
            expected: expected.to_string(),
        })?
        .into_bool()
    }
}

/// Ordered batch of write commands
#[derive(Debug, Default, Clone)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append any command
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Queue SET
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
            ttl: None,
            only_if_absent: false,
        })
    }

    /// Queue DEL of one key
    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Del {
            keys: vec![key.into()],
        })
    }

    /// Queue HSET
    pub fn hset(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Command::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    /// Queue HDEL
    pub fn hdel(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut Self {
        self.push(Command::HDel {
            key: key.into(),
            field: field.into(),
        })
    }

    /// Queue SADD
    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Queue SREM
    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SRem {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Queue ZADD
    pub fn zadd(
        &mut self,
        key: impl Into<String>,
        score: i64,
        member: impl Into<String>,
    ) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        })
    }

    /// Queue ZREM
    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::ZRem {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Queue RPUSH
    pub fn rpush(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::RPush {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Append every command of another pipeline
    pub fn extend(&mut self, other: Pipeline) -> &mut Self {
        self.commands.extend(other.commands);
        self
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queued commands, in order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Send the batch; an empty pipeline never reaches the backend
    pub fn execute(self, client: &KvClient) -> VeloResult<Vec<Reply>> {
        if self.commands.is_empty() {
            return Ok(Vec::new());
        }
        client.backend.execute_batch(self.commands)
    }
}
