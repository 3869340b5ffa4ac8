//! Core types and traits for velostore
//!
//! This crate defines the foundational types used throughout the system:
//! - RecordId: Tagged identity (relational primary key vs shadow surrogate)
//! - Timestamp: Microsecond timestamps and range-index scores
//! - FieldValue / IndexValue: Raw field values and their canonical index form
//! - RecordSchema: Static field and index declarations per record type
//! - Command / Reply: The key-value command model
//! - Traits: KvBackend, ShadowRecord
//! - Error: VeloError taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod id;
pub mod schema;
pub mod timestamp;
pub mod traits;
pub mod value;

pub use command::{Command, Reply, ScoreBound};
pub use error::{RequiredField, VeloError, VeloResult};
pub use id::RecordId;
pub use schema::{
    FieldTransform, HashIndexDef, IndexField, IndexKind, RangeIndexDef, RecordSchema, SetIndexDef,
};
pub use timestamp::{Timestamp, INDEX_EPOCH_MICROS};
pub use traits::{KvBackend, ShadowRecord};
pub use value::{FieldValue, IndexTuple, IndexValue};
