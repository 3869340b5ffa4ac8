//! Shadow-record layer for velostore
//!
//! Mirrors structured records into the key-value store:
//! - **ShadowStore**: typed put/get/delete per record class
//! - **Surrogate ids**: negative ids drawn from a per-class counter for
//!   records the relational store has not seen
//! - **Indexes**: unique hash, multi-value set and sorted range indexes kept
//!   in the same atomic batch as the body
//!
//! ## Consistency
//!
//! Body and index writes share one batch. If a batch fails part way the
//! index may disagree with the bodies; readers treat dangling ids as "not
//! found" and `reindex` rebuilds from the bodies on demand.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod index;
pub mod keys;
pub mod shadow;

pub use index::{IndexEntries, RangeEntry};
pub use shadow::{ScoreRange, ShadowStore};
