//! Key-value command model
//!
//! The shadow layer talks to its backing store through this small, closed
//! command set (a subset of the Redis command surface plus one server-side
//! script). Backends execute a single [`Command`] or an atomic batch of them
//! and answer with [`Reply`] values.

use std::time::Duration;

use crate::error::{VeloError, VeloResult};

/// Bound of a sorted-set score range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    /// Include scores equal to the bound
    Inclusive(i64),
    /// Exclude scores equal to the bound
    Exclusive(i64),
    /// No bound on this side
    Unbounded,
}

impl ScoreBound {
    /// Whether `score` lies on the permitted side of this lower bound
    pub fn admits_from_below(&self, score: i64) -> bool {
        match *self {
            ScoreBound::Inclusive(b) => score >= b,
            ScoreBound::Exclusive(b) => score > b,
            ScoreBound::Unbounded => true,
        }
    }

    /// Whether `score` lies on the permitted side of this upper bound
    pub fn admits_from_above(&self, score: i64) -> bool {
        match *self {
            ScoreBound::Inclusive(b) => score <= b,
            ScoreBound::Exclusive(b) => score < b,
            ScoreBound::Unbounded => true,
        }
    }
}

/// One store command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read a string value
    Get { key: String },
    /// Write a string value, optionally only when absent and with a lease
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
        only_if_absent: bool,
    },
    /// Read several string values; missing keys answer `Nil` in position
    MGet { keys: Vec<String> },
    /// Remove keys of any type; answers the number removed
    Del { keys: Vec<String> },
    /// Key existence
    Exists { key: String },
    /// Atomically decrement an integer counter (missing counts as 0)
    Decr { key: String },
    /// Set a hash field
    HSet { key: String, field: String, value: String },
    /// Read a hash field
    HGet { key: String, field: String },
    /// Remove a hash field
    HDel { key: String, field: String },
    /// Add a set member
    SAdd { key: String, member: String },
    /// Remove a set member
    SRem { key: String, member: String },
    /// All members of a set
    SMembers { key: String },
    /// Intersection of several sets
    SInter { keys: Vec<String> },
    /// Add or re-score a sorted-set member
    ZAdd { key: String, score: i64, member: String },
    /// Remove a sorted-set member
    ZRem { key: String, member: String },
    /// Every sorted-set member in ascending score order
    ZRange { key: String },
    /// Sorted-set members within a score range, ascending
    ZRangeByScore {
        key: String,
        min: ScoreBound,
        max: ScoreBound,
    },
    /// Sorted-set cardinality
    ZCard { key: String },
    /// Append to a list
    RPush { key: String, value: String },
    /// Every list element
    LRange { key: String },
    /// Keys starting with a prefix (slow; maintenance only)
    Keys { prefix: String },
    /// Server-side script: delete `key` only if it currently holds `expected`
    CompareAndDelete { key: String, expected: String },
}

impl Command {
    /// Upper-case command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::MGet { .. } => "MGET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Decr { .. } => "DECR",
            Command::HSet { .. } => "HSET",
            Command::HGet { .. } => "HGET",
            Command::HDel { .. } => "HDEL",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMembers { .. } => "SMEMBERS",
            Command::SInter { .. } => "SINTER",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZRange { .. } => "ZRANGE",
            Command::ZRangeByScore { .. } => "ZRANGEBYSCORE",
            Command::ZCard { .. } => "ZCARD",
            Command::RPush { .. } => "RPUSH",
            Command::LRange { .. } => "LRANGE",
            Command::Keys { .. } => "KEYS",
            Command::CompareAndDelete { .. } => "EVAL(compare_and_delete)",
        }
    }

    /// Whether the command can modify the store
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. }
                | Command::Del { .. }
                | Command::Decr { .. }
                | Command::HSet { .. }
                | Command::HDel { .. }
                | Command::SAdd { .. }
                | Command::SRem { .. }
                | Command::ZAdd { .. }
                | Command::ZRem { .. }
                | Command::RPush { .. }
                | Command::CompareAndDelete { .. }
        )
    }
}

/// Answer to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// No value
    Nil,
    /// Status acknowledgement
    Ok,
    /// Integer
    Int(i64),
    /// String value
    Text(String),
    /// Multiple values
    Array(Vec<Reply>),
}

impl Reply {
    /// Optional string (`Nil` → `None`)
    pub fn into_opt_text(self) -> VeloResult<Option<String>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Text(s) => Ok(Some(s)),
            other => Err(unexpected("text", &other)),
        }
    }

    /// Integer reply
    pub fn into_int(self) -> VeloResult<i64> {
        match self {
            Reply::Int(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Non-zero integer or `Ok` as true, `Nil`/0 as false
    pub fn into_bool(self) -> VeloResult<bool> {
        match self {
            Reply::Ok => Ok(true),
            Reply::Nil => Ok(false),
            Reply::Int(n) => Ok(n != 0),
            other => Err(unexpected("boolean", &other)),
        }
    }

    /// Array of optional strings (MGET)
    pub fn into_opt_texts(self) -> VeloResult<Vec<Option<String>>> {
        match self {
            Reply::Array(items) => items.into_iter().map(Reply::into_opt_text).collect(),
            other => Err(unexpected("array", &other)),
        }
    }

    /// Array of strings (SMEMBERS, ZRANGE, ...)
    pub fn into_texts(self) -> VeloResult<Vec<String>> {
        match self {
            Reply::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Reply::Text(s) => Ok(s),
                    other => Err(unexpected("text", &other)),
                })
                .collect(),
            other => Err(unexpected("array", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Reply) -> VeloError {
    VeloError::storage(format!("expected {} reply, got {:?}", wanted, got))
}
