//! Error types for velostore
//!
//! One error enum covers every layer: the key-value adapter, the shadow
//! record codec, the lock manager and the velocity engine. We use `thiserror`
//! for the `Display` and `Error` implementations.
//!
//! Stale index entries (an id found in an index whose record body is gone)
//! are deliberately NOT an error anywhere in the system; lookups treat them
//! as "not found".

use std::time::Duration;
use thiserror::Error;

use crate::id::RecordId;

/// Result type alias for velostore operations
pub type VeloResult<T> = std::result::Result<T, VeloError>;

/// Entity parameter that an event type may require
///
/// Kept in core so the error taxonomy can name the missing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequiredField {
    /// The acting principal (user)
    Principal,
    /// The primary context entity (e.g. a game)
    PrimaryContext,
    /// The secondary context entity (e.g. one play-through of a game)
    SecondaryContext,
    /// A caller-chosen free-form identifier
    UniqueId,
}

impl RequiredField {
    /// All fields in declaration order
    pub const ALL: [RequiredField; 4] = [
        RequiredField::Principal,
        RequiredField::PrimaryContext,
        RequiredField::SecondaryContext,
        RequiredField::UniqueId,
    ];

    /// Stable snake_case name
    pub fn name(&self) -> &'static str {
        match self {
            RequiredField::Principal => "principal",
            RequiredField::PrimaryContext => "primary_context",
            RequiredField::SecondaryContext => "secondary_context",
            RequiredField::UniqueId => "unique_id",
        }
    }
}

impl std::fmt::Display for RequiredField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error types for velostore
#[derive(Debug, Error)]
pub enum VeloError {
    /// No event type is registered under this tag
    #[error("unknown event type tag: {tag}")]
    UnknownEventType {
        /// The tag that was looked up
        tag: String,
    },

    /// The event type requires an entity parameter the caller did not supply
    #[error("event type requires {field}")]
    MissingRequiredField {
        /// Which parameter was missing
        field: RequiredField,
    },

    /// A lock could not be acquired before the poll deadline
    #[error("timed out after {waited:?} trying to gain lock {key}")]
    LockTimeout {
        /// Store key of the lock
        key: String,
        /// How long we polled before giving up
        waited: Duration,
    },

    /// A stored record body could not be decoded
    #[error("cannot decode {class} record: {message}")]
    Decode {
        /// Record class
        class: String,
        /// Codec error
        message: String,
    },

    /// A record could not be encoded for storage
    #[error("cannot encode {class} record: {message}")]
    Encode {
        /// Record class
        class: String,
        /// Codec error
        message: String,
    },

    /// Key-value backend failure
    #[error("storage error: {message}")]
    Storage {
        /// Backend error description
        message: String,
    },

    /// A command was applied to a key holding a different data type
    #[error("operation against a key holding the wrong kind of value: {key}")]
    WrongType {
        /// The offending key
        key: String,
    },

    /// A schema named a field the record does not expose
    #[error("unknown field {field} on {class}")]
    UnknownField {
        /// Record class
        class: String,
        /// Field name
        field: String,
    },

    /// An index slot that the schema does not declare
    #[error("{class} has no {kind} index in slot {slot}")]
    UnknownIndex {
        /// Record class
        class: String,
        /// Index flavor ("hash", "set", "range")
        kind: &'static str,
        /// Requested slot
        slot: usize,
    },

    /// A rule names an action that has not been registered
    #[error("unknown rule action: {name}")]
    UnknownAction {
        /// Action name
        name: String,
    },

    /// A cancellation token did not match the event
    #[error("invalid cancellation token for event {id}")]
    InvalidCancellationToken {
        /// Event the token was presented for
        id: RecordId,
    },

    /// Configuration could not be loaded or failed validation
    #[error("configuration error: {message}")]
    Config {
        /// Description
        message: String,
    },

    /// Operation attempted on a unit of work that already finished
    #[error("unit of work is {state}")]
    UnitOfWorkClosed {
        /// Terminal state it is in
        state: String,
    },

    /// Invalid argument
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description
        message: String,
    },
}

impl VeloError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        VeloError::Storage {
            message: message.into(),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        VeloError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        VeloError::Config {
            message: message.into(),
        }
    }

    /// Create a decode error for a record class
    pub fn decode(class: &str, message: impl std::fmt::Display) -> Self {
        VeloError::Decode {
            class: class.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an encode error for a record class
    pub fn encode(class: &str, message: impl std::fmt::Display) -> Self {
        VeloError::Encode {
            class: class.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the whole unit of work could succeed
    ///
    /// Only lock timeouts and backend failures qualify; validation errors are
    /// programmer errors and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VeloError::LockTimeout { .. } | VeloError::Storage { .. })
    }
}
