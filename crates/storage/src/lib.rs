//! Key-value store adapter for velostore
//!
//! This crate implements the store side of the shadow layer:
//! - MemoryBackend: in-process keyspace under a parking_lot RwLock
//! - RedisBackend: pooled connections to a Redis server (feature `redis`)
//! - TracedBackend: request-dump decorator
//! - KvClient / Pipeline: typed commands and atomic batches
//! - StorePool: one client per partition
//! - ExpiryIndex: lease expiry bookkeeping

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod memory;
pub mod pool;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod traced;
pub mod ttl;

pub use client::{KvClient, Pipeline};
pub use memory::MemoryBackend;
pub use pool::StorePool;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use traced::TracedBackend;
pub use ttl::ExpiryIndex;
