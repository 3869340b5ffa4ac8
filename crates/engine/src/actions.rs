//! Rule actions
//!
//! A rule with an `action` name runs the handler registered under that name
//! when it fires. Handlers are registered up front; registering an event
//! type that names an unknown action fails then, not at evaluation time.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use velostore_concurrency::UnitOfWork;
use velostore_core::{VeloError, VeloResult};

use crate::event::Event;
use crate::event_type::EventType;

/// Everything a handler learns about the rule that fired
#[derive(Debug, Clone, Copy)]
pub struct ActionCall<'a> {
    /// Type being evaluated
    pub event_type: &'a EventType,
    /// The event that tripped the rule
    pub event: &'a Event,
    /// Window weight sum that tripped it
    pub weight: i64,
    /// The rule's params
    pub params: &'a Map<String, Value>,
}

/// Side-effecting handler for a fired rule
///
/// Handlers run inside the caller's unit of work while the related locks
/// are held, so buffered writes they make commit or roll back with it.
pub trait RuleAction: Send + Sync {
    /// Run the action
    fn invoke(&self, uow: &mut UnitOfWork, call: &ActionCall<'_>) -> VeloResult<()>;
}

struct FnAction<F>(F);

impl<F> RuleAction for FnAction<F>
where
    F: Fn(&mut UnitOfWork, &ActionCall<'_>) -> VeloResult<()> + Send + Sync,
{
    fn invoke(&self, uow: &mut UnitOfWork, call: &ActionCall<'_>) -> VeloResult<()> {
        (self.0)(uow, call)
    }
}

/// Name → handler table
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: FxHashMap<String, Arc<dyn RuleAction>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

impl ActionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one under `name`
    pub fn register(&mut self, name: impl Into<String>, action: impl RuleAction + 'static) -> &mut Self {
        let name = name.into();
        debug!(action = %name, "registered rule action");
        self.actions.insert(name, Arc::new(action));
        self
    }

    /// Register a closure
    pub fn register_fn(
        &mut self,
        name: impl Into<String>,
        action: impl Fn(&mut UnitOfWork, &ActionCall<'_>) -> VeloResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.register(name, FnAction(action))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Handler under `name`
    ///
    /// # Errors
    ///
    /// `UnknownAction` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> VeloResult<Arc<dyn RuleAction>> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| VeloError::UnknownAction {
                name: name.to_string(),
            })
    }

    /// Check that every rule of `event_type` names a registered action
    pub fn validate(&self, event_type: &EventType) -> VeloResult<()> {
        for name in event_type.rules.iter().filter_map(|r| r.action.as_deref()) {
            self.get(name)?;
        }
        Ok(())
    }
}
