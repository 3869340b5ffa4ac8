//! Partitioned store pool
//!
//! A deployment spreads record classes over a small fixed number of store
//! partitions (each record schema names its partition). `StorePool` owns one
//! [`KvClient`] per partition.

use std::sync::Arc;
use velostore_core::{KvBackend, VeloError, VeloResult};

use crate::client::KvClient;
use crate::memory::MemoryBackend;
use crate::traced::TracedBackend;

/// Fixed set of store partitions
#[derive(Debug, Clone)]
pub struct StorePool {
    partitions: Arc<[KvClient]>,
}

impl StorePool {
    /// Build from one backend per partition
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no backend is given.
    pub fn new(backends: Vec<Arc<dyn KvBackend>>) -> VeloResult<Self> {
        if backends.is_empty() {
            return Err(VeloError::invalid_input("a store pool needs at least one partition"));
        }
        Ok(Self {
            partitions: backends.into_iter().map(KvClient::new).collect(),
        })
    }

    /// `n` independent in-memory partitions (at least one)
    pub fn in_memory(n: usize) -> Self {
        Self::from_backends((0..n.max(1)).map(|_| MemoryBackend::new()))
    }

    /// `n` in-memory partitions with request dumping
    pub fn in_memory_traced(n: usize) -> Self {
        Self::from_backends((0..n.max(1)).map(|_| TracedBackend::new(MemoryBackend::new())))
    }

    fn from_backends<B: KvBackend + 'static>(backends: impl Iterator<Item = B>) -> Self {
        Self {
            partitions: backends
                .map(|b| KvClient::new(Arc::new(b) as Arc<dyn KvBackend>))
                .collect(),
        }
    }

    /// Client for partition `index`
    ///
    /// # Errors
    ///
    /// `Config` when the index is out of range.
    pub fn partition(&self, index: usize) -> VeloResult<&KvClient> {
        self.partitions.get(index).ok_or_else(|| {
            VeloError::config(format!(
                "partition {} requested but the pool has {}",
                index,
                self.partitions.len()
            ))
        })
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Always false; a pool has at least one partition
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}
