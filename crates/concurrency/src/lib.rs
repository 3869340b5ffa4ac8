//! Concurrency layer for velostore
//!
//! The shadow store has no transactions of its own. This crate supplies the
//! two things request code needs instead:
//! - [`LockManager`]: leased, owner-tagged record locks with jittered polling
//! - [`UnitOfWork`]: a request-scoped buffer of saves, deletes and messages,
//!   flushed in one pass at commit and released on every exit path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock;
pub mod message;
pub mod unit_of_work;

pub use lock::{LockCallback, LockConfig, LockKey, LockManager, LockOwner};
pub use message::{MessagePayload, MessageRouting};
pub use unit_of_work::{CommitSummary, PendingOperations, UnitOfWork, UnitOfWorkStatus};
