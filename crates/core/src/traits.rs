//! Core traits for storage and record abstraction
//!
//! - [`KvBackend`]: the store adapter seam; the in-memory and Redis backends
//!   both implement it, and every upper layer only sees this trait.
//! - [`ShadowRecord`]: the entity-serialization contract a type signs up to
//!   before it can be mirrored into the shadow store.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::command::{Command, Reply};
use crate::error::VeloResult;
use crate::id::RecordId;
use crate::schema::RecordSchema;
use crate::value::FieldValue;

/// Key-value store backend
///
/// Thread safety: all methods may be called concurrently from multiple
/// threads (requires Send + Sync).
pub trait KvBackend: Send + Sync {
    /// Execute one command
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the command targets a key
    /// holding the wrong kind of value.
    fn execute(&self, command: Command) -> VeloResult<Reply>;

    /// Execute a batch atomically, answering one reply per command
    ///
    /// No other client observes a partially applied batch.
    ///
    /// # Errors
    ///
    /// Returns an error if any command in the batch fails. What was already
    /// applied is backend-specific; the shadow layer tolerates the resulting
    /// index staleness.
    fn execute_batch(&self, commands: Vec<Command>) -> VeloResult<Vec<Reply>>;

    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;
}

/// A structured entity that can be mirrored into the shadow store
///
/// Implementors derive `Serialize`/`Deserialize` and `Default`, mark the
/// struct `#[serde(default)]` so fields missing from an older stored body
/// decode to their type's null, and expose index fields through
/// [`field_value`](ShadowRecord::field_value) rather than reflection.
pub trait ShadowRecord: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    /// Static storage description
    fn schema() -> &'static RecordSchema;

    /// Current identity, `None` until first stored
    fn id(&self) -> Option<RecordId>;

    /// Assign identity
    fn set_id(&mut self, id: RecordId);

    /// Value of a field referenced by an index definition
    ///
    /// # Errors
    ///
    /// `UnknownField` if the record has no such field.
    fn field_value(&self, field: &str) -> VeloResult<FieldValue>;

    /// Whether the record has been soft-removed
    ///
    /// Retired records keep their range-index entries under the retired
    /// keys instead of the live ones, so range lookups skip them unless
    /// asked otherwise.
    fn retired(&self) -> bool {
        false
    }
}
