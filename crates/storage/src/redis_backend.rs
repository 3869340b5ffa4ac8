//! Redis backend
//!
//! Speaks to a real Redis server over pooled synchronous connections.
//! Batches run inside `MULTI`/`EXEC`; lock release is the Lua
//! compare-and-delete script evaluated server-side.

use parking_lot::Mutex;
use redis::{Client, Connection, RedisError, Value};
use tracing::warn;
use velostore_core::{Command, KvBackend, Reply, ScoreBound, VeloError, VeloResult};

const COMPARE_AND_DELETE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Connections kept idle in the pool
const MAX_IDLE: usize = 16;

/// Pooled Redis connections
pub struct RedisBackend {
    client: Client,
    idle: Mutex<Vec<Connection>>,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

impl RedisBackend {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`)
    ///
    /// Opens one connection eagerly so a bad URL fails here.
    pub fn open(url: &str) -> VeloResult<Self> {
        let client = Client::open(url).map_err(|e| storage_error(e, None))?;
        let first = client.get_connection().map_err(|e| storage_error(e, None))?;
        Ok(Self {
            client,
            idle: Mutex::new(vec![first]),
        })
    }

    fn checkout(&self) -> VeloResult<Connection> {
        if let Some(conn) = self.idle.lock().pop() {
            return Ok(conn);
        }
        self.client
            .get_connection()
            .map_err(|e| storage_error(e, None))
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE {
            idle.push(conn);
        }
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, RedisError>,
        key: Option<&str>,
    ) -> VeloResult<T> {
        let mut conn = self.checkout()?;
        match f(&mut conn) {
            Ok(value) => {
                self.checkin(conn);
                Ok(value)
            }
            Err(e) => {
                // broken connections are dropped rather than returned
                if e.is_connection_dropped() || e.is_io_error() {
                    warn!(error = %e, "dropping redis connection");
                } else {
                    self.checkin(conn);
                }
                Err(storage_error(e, key))
            }
        }
    }
}

impl KvBackend for RedisBackend {
    fn execute(&self, command: Command) -> VeloResult<Reply> {
        let key = first_key(&command).map(str::to_string);
        let cmd = to_redis(&command);
        let value: Value = self.with_connection(|conn| cmd.query(conn), key.as_deref())?;
        from_redis(value)
    }

    fn execute_batch(&self, commands: Vec<Command>) -> VeloResult<Vec<Reply>> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            pipe.add_command(to_redis(command));
        }
        let values: Vec<Value> = self.with_connection(|conn| pipe.query(conn), None)?;
        values.into_iter().map(from_redis).collect()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

fn to_redis(command: &Command) -> redis::Cmd {
    match command {
        Command::Get { key } => redis::cmd("GET").arg(key).clone(),
        Command::Set {
            key,
            value,
            ttl,
            only_if_absent,
        } => {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
            }
            if *only_if_absent {
                cmd.arg("NX");
            }
            cmd
        }
        Command::MGet { keys } => redis::cmd("MGET").arg(keys).clone(),
        Command::Del { keys } => redis::cmd("DEL").arg(keys).clone(),
        Command::Exists { key } => redis::cmd("EXISTS").arg(key).clone(),
        Command::Decr { key } => redis::cmd("DECR").arg(key).clone(),
        Command::HSet { key, field, value } => {
            redis::cmd("HSET").arg(key).arg(field).arg(value).clone()
        }
        Command::HGet { key, field } => redis::cmd("HGET").arg(key).arg(field).clone(),
        Command::HDel { key, field } => redis::cmd("HDEL").arg(key).arg(field).clone(),
        Command::SAdd { key, member } => redis::cmd("SADD").arg(key).arg(member).clone(),
        Command::SRem { key, member } => redis::cmd("SREM").arg(key).arg(member).clone(),
        Command::SMembers { key } => redis::cmd("SMEMBERS").arg(key).clone(),
        Command::SInter { keys } => redis::cmd("SINTER").arg(keys).clone(),
        Command::ZAdd { key, score, member } => {
            redis::cmd("ZADD").arg(key).arg(*score).arg(member).clone()
        }
        Command::ZRem { key, member } => redis::cmd("ZREM").arg(key).arg(member).clone(),
        Command::ZRange { key } => redis::cmd("ZRANGE").arg(key).arg(0).arg(-1).clone(),
        Command::ZRangeByScore { key, min, max } => redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(render_bound(*min, "-inf"))
            .arg(render_bound(*max, "+inf"))
            .clone(),
        Command::ZCard { key } => redis::cmd("ZCARD").arg(key).clone(),
        Command::RPush { key, value } => redis::cmd("RPUSH").arg(key).arg(value).clone(),
        Command::LRange { key } => redis::cmd("LRANGE").arg(key).arg(0).arg(-1).clone(),
        Command::Keys { prefix } => redis::cmd("KEYS")
            .arg(format!("{}*", escape_glob(prefix)))
            .clone(),
        Command::CompareAndDelete { key, expected } => redis::cmd("EVAL")
            .arg(COMPARE_AND_DELETE)
            .arg(1)
            .arg(key)
            .arg(expected)
            .clone(),
    }
}

fn render_bound(bound: ScoreBound, unbounded: &str) -> String {
    match bound {
        ScoreBound::Inclusive(n) => n.to_string(),
        ScoreBound::Exclusive(n) => format!("({}", n),
        ScoreBound::Unbounded => unbounded.to_string(),
    }
}

fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn first_key(command: &Command) -> Option<&str> {
    match command {
        Command::MGet { keys } | Command::Del { keys } | Command::SInter { keys } => {
            keys.first().map(String::as_str)
        }
        Command::Keys { .. } => None,
        Command::Get { key }
        | Command::Set { key, .. }
        | Command::Exists { key }
        | Command::Decr { key }
        | Command::HSet { key, .. }
        | Command::HGet { key, .. }
        | Command::HDel { key, .. }
        | Command::SAdd { key, .. }
        | Command::SRem { key, .. }
        | Command::SMembers { key }
        | Command::ZAdd { key, .. }
        | Command::ZRem { key, .. }
        | Command::ZRange { key }
        | Command::ZRangeByScore { key, .. }
        | Command::ZCard { key }
        | Command::RPush { key, .. }
        | Command::LRange { key }
        | Command::CompareAndDelete { key, .. } => Some(key),
    }
}

fn from_redis(value: Value) -> VeloResult<Reply> {
    Ok(match value {
        Value::Nil => Reply::Nil,
        Value::Okay => Reply::Ok,
        Value::Int(n) => Reply::Int(n),
        Value::SimpleString(s) => Reply::Text(s),
        Value::BulkString(bytes) => Reply::Text(
            String::from_utf8(bytes)
                .map_err(|e| VeloError::storage(format!("non-utf8 reply: {}", e)))?,
        ),
        Value::Array(items) | Value::Set(items) => {
            Reply::Array(items.into_iter().map(from_redis).collect::<VeloResult<_>>()?)
        }
        other => {
            return Err(VeloError::storage(format!(
                "unsupported redis reply: {:?}",
                other
            )))
        }
    })
}

fn storage_error(error: RedisError, key: Option<&str>) -> VeloError {
    match (error.code(), key) {
        (Some("WRONGTYPE"), Some(key)) => VeloError::WrongType {
            key: key.to_string(),
        },
        _ => VeloError::storage(error.to_string()),
    }
}
