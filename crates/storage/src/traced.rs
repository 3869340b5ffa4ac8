//! Request-dump decorator
//!
//! Wraps any backend and logs each command and batch at `trace` level with
//! its outcome and latency. Enabled by `dump_requests` in the engine config.

use std::time::Instant;
use tracing::trace;
use velostore_core::{Command, KvBackend, Reply, VeloResult};

/// Logging wrapper around another backend
#[derive(Debug)]
pub struct TracedBackend<B> {
    inner: B,
}

impl<B: KvBackend> TracedBackend<B> {
    /// Wrap `inner`
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    /// Wrapped backend
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: KvBackend> KvBackend for TracedBackend<B> {
    fn execute(&self, command: Command) -> VeloResult<Reply> {
        let started = Instant::now();
        let name = command.name();
        trace!(backend = self.inner.name(), command = ?command, "request");
        let result = self.inner.execute(command);
        trace!(
            backend = self.inner.name(),
            command = name,
            ok = result.is_ok(),
            elapsed_us = started.elapsed().as_micros() as u64,
            reply = ?result,
            "response"
        );
        result
    }

    fn execute_batch(&self, commands: Vec<Command>) -> VeloResult<Vec<Reply>> {
        let started = Instant::now();
        let count = commands.len();
        for (position, command) in commands.iter().enumerate() {
            trace!(backend = self.inner.name(), position, command = ?command, "batched request");
        }
        let result = self.inner.execute_batch(commands);
        trace!(
            backend = self.inner.name(),
            commands = count,
            ok = result.is_ok(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "batch response"
        );
        result
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
