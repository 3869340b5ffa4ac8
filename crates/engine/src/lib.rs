//! Velocity engine for velostore
//!
//! This crate sits on top of the shadow store and the unit of work:
//! - [`EventType`] / [`Rule`]: what is tracked and which thresholds apply
//! - [`VelocityEngine`]: records events, reads sliding windows, evaluates
//!   rules, runs actions, cancels and expunges
//! - [`ActionRegistry`]: named handlers for rules that act when they fire
//! - [`RelatedLocks`]: which entity locks serialize an evaluation
//! - [`AuditTrail`]: buffered who-did-what records
//! - [`VelocityConfig`]: `velostore.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actions;
pub mod audit;
pub mod config;
pub mod event;
pub mod event_type;
pub mod related;
pub mod token;
pub mod velocity;

pub use actions::{ActionCall, ActionRegistry, RuleAction};
pub use audit::{AuditEntry, AuditTrail};
pub use config::{VelocityConfig, CONFIG_FILE_NAME};
pub use event::{Evaluation, EvaluationMode, Event, EventKey, EventQuery, EventRequest, TypeRef};
pub use event_type::{EventType, Rule, SyncMode, Trigger};
pub use related::{NoRelatedLocks, RelatedLocks, StandardRelatedLocks};
pub use token::CancellationTokens;
pub use velocity::VelocityEngine;
