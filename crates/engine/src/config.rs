//! Engine configuration via `velostore.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Values are validated on load; a bad file fails fast with a `Config`
//! error instead of surfacing later as a lock or partition error.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use velostore_concurrency::LockConfig;
use velostore_core::{VeloError, VeloResult};
use velostore_storage::StorePool;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "velostore.toml";

const DEFAULT_CANCEL_SECRET: &str = "change-this-cancellation-secret";

/// Engine configuration loaded from `velostore.toml`
///
/// # Example
///
/// ```toml
/// partitions = 2
/// event_partition = 1
/// lock_wait_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Number of store partitions
    pub partitions: usize,
    /// Partition holding event types
    pub type_partition: usize,
    /// Partition holding events
    pub event_partition: usize,
    /// Partition holding audit entries
    pub audit_partition: usize,
    /// Give up acquiring a lock after this many milliseconds
    pub lock_wait_ms: u64,
    /// Lease on a held lock
    pub lock_lease_ms: u64,
    /// Shortest sleep between lock attempts
    pub lock_poll_min_ms: u64,
    /// Longest sleep between lock attempts
    pub lock_poll_max_ms: u64,
    /// Key for cancellation tokens
    pub cancel_secret: String,
    /// Cache resolved event types by tag
    pub cache_event_types: bool,
    /// Log every store command at trace level
    pub dump_requests: bool,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            partitions: 2,
            type_partition: 0,
            event_partition: 1,
            audit_partition: 0,
            lock_wait_ms: 5000,
            lock_lease_ms: 30_000,
            lock_poll_min_ms: 75,
            lock_poll_max_ms: 125,
            cancel_secret: DEFAULT_CANCEL_SECRET.to_string(),
            cache_event_types: true,
            dump_requests: false,
        }
    }
}

impl VelocityConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Velostore configuration

# Number of store partitions; record classes are spread across them
partitions = 2

# Which partition each record class lives in
type_partition = 0
event_partition = 1
audit_partition = 0

# Lock acquisition: deadline, lease and jittered poll interval (milliseconds)
lock_wait_ms = 5000
lock_lease_ms = 30000
lock_poll_min_ms = 75
lock_poll_max_ms = 125

# Key for event cancellation tokens. Change this in production.
cancel_secret = "change-this-cancellation-secret"

# Cache event types by tag after the first lookup
cache_event_types = true

# Log every store command at trace level
dump_requests = false
"#
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> VeloResult<Self> {
        let config: VelocityConfig = toml::from_str(content)
            .map_err(|e| VeloError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: &Path) -> VeloResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VeloError::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> VeloResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                VeloError::config(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> VeloResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VeloError::config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            VeloError::config(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> VeloResult<()> {
        if self.partitions == 0 {
            return Err(VeloError::config("partitions must be at least 1"));
        }
        for (name, index) in [
            ("type_partition", self.type_partition),
            ("event_partition", self.event_partition),
            ("audit_partition", self.audit_partition),
        ] {
            if index >= self.partitions {
                return Err(VeloError::config(format!(
                    "{} = {} is out of range for {} partitions",
                    name, index, self.partitions
                )));
            }
        }
        if self.lock_lease_ms == 0 {
            return Err(VeloError::config("lock_lease_ms must be positive"));
        }
        if self.lock_poll_min_ms > self.lock_poll_max_ms {
            return Err(VeloError::config(format!(
                "lock_poll_min_ms ({}) exceeds lock_poll_max_ms ({})",
                self.lock_poll_min_ms, self.lock_poll_max_ms
            )));
        }
        if self.cancel_secret.is_empty() {
            return Err(VeloError::config("cancel_secret must not be empty"));
        }
        Ok(())
    }

    /// Whether the cancellation secret is still the shipped default
    pub fn uses_default_secret(&self) -> bool {
        self.cancel_secret == DEFAULT_CANCEL_SECRET
    }

    /// Lock timing
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            wait: Duration::from_millis(self.lock_wait_ms),
            lease: Duration::from_millis(self.lock_lease_ms),
            poll_min: Duration::from_millis(self.lock_poll_min_ms),
            poll_max: Duration::from_millis(self.lock_poll_max_ms),
        }
    }

    /// In-process pool with the configured number of partitions
    pub fn memory_pool(&self) -> StorePool {
        if self.dump_requests {
            StorePool::in_memory_traced(self.partitions)
        } else {
            StorePool::in_memory(self.partitions)
        }
    }
}
