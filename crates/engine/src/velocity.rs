//! Velocity engine
//!
//! Records weighted events against composite entity keys and evaluates
//! threshold rules over sliding windows of them.
//!
//! ## Evaluation protocol
//!
//! ```text
//! resolve type ─▶ validate key ─▶ normalize time ─▶ lock related entities
//!      │
//!      ▼
//! build event ─▶ [Normal: store now] ─▶ fetch window (start, end]
//!      │
//!      ▼
//! evaluate rules in order ─▶ [TestAndSave: store if no check fired]
//! ```
//!
//! The related locks are taken in the caller's unit of work and held until
//! it commits or rolls back, covering everything from the window read to
//! the store. Events themselves are written straight to the store rather
//! than buffered, so a later evaluation in the same unit already sees them;
//! a Normal-mode event therefore survives a rollback.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use velostore_concurrency::{LockManager, UnitOfWork};
use velostore_core::{RecordId, ScoreBound, Timestamp, VeloError, VeloResult};
use velostore_primitives::{ScoreRange, ShadowStore};
use velostore_storage::{Pipeline, StorePool};

use crate::actions::{ActionCall, ActionRegistry};
use crate::audit::AuditTrail;
use crate::config::VelocityConfig;
use crate::event::{Evaluation, EvaluationMode, Event, EventKey, EventQuery, EventRequest, TypeRef, WINDOW_INDEX};
use crate::event_type::{EventType, SyncMode, TAG_INDEX};
use crate::related::{RelatedLocks, StandardRelatedLocks};
use crate::token::CancellationTokens;

/// Rule evaluation over a store pool
pub struct VelocityEngine {
    pool: StorePool,
    config: VelocityConfig,
    locks: LockManager,
    actions: ActionRegistry,
    related: Arc<dyn RelatedLocks>,
    tokens: CancellationTokens,
    type_cache: DashMap<String, EventType>,
    types: ShadowStore<EventType>,
    events: ShadowStore<Event>,
    audit: AuditTrail,
}

impl std::fmt::Debug for VelocityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelocityEngine")
            .field("config", &self.config)
            .field("actions", &self.actions)
            .field("cached_types", &self.type_cache.len())
            .finish()
    }
}

impl VelocityEngine {
    /// Engine over `pool`
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid or names partitions the
    /// pool does not have.
    pub fn new(pool: StorePool, config: VelocityConfig) -> VeloResult<Self> {
        config.validate()?;
        if pool.len() < config.partitions {
            return Err(VeloError::config(format!(
                "configuration needs {} partitions, pool has {}",
                config.partitions,
                pool.len()
            )));
        }
        if config.uses_default_secret() {
            warn!("cancellation tokens use the default secret");
        }
        let types = ShadowStore::new(pool.partition(config.type_partition)?.clone());
        let events = ShadowStore::new(pool.partition(config.event_partition)?.clone());
        let audit = AuditTrail::new(&pool, config.audit_partition)?;
        Ok(Self {
            locks: LockManager::new(pool.clone(), config.lock_config()),
            tokens: CancellationTokens::new(&config.cancel_secret),
            actions: ActionRegistry::new(),
            related: Arc::new(StandardRelatedLocks::default()),
            type_cache: DashMap::new(),
            types,
            events,
            audit,
            pool,
            config,
        })
    }

    /// Engine over a fresh in-process pool
    pub fn in_memory(config: VelocityConfig) -> VeloResult<Self> {
        let pool = config.memory_pool();
        Self::new(pool, config)
    }

    /// Use these rule actions
    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    /// Use this related-lock policy
    pub fn with_related_locks(mut self, related: impl RelatedLocks + 'static) -> Self {
        self.related = Arc::new(related);
        self
    }

    // ========== Accessors ==========

    /// Store pool
    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    /// Configuration
    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    /// Lock primitives
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Registered rule actions
    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Audit trail
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Event store
    pub fn event_store(&self) -> &ShadowStore<Event> {
        &self.events
    }

    /// Start a unit of work against this engine's locks
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::new(self.locks.clone())
    }

    // ========== Event types ==========

    /// Store an event type, replacing any type under the same tag
    ///
    /// # Errors
    ///
    /// `UnknownAction` if a rule names an unregistered action;
    /// `InvalidInput` for an empty tag or a zero-length rule window.
    pub fn register_type(&self, mut event_type: EventType) -> VeloResult<EventType> {
        if event_type.tag.is_empty() {
            return Err(VeloError::invalid_input("event type tag must not be empty"));
        }
        if event_type.rules.iter().any(|r| r.window_secs == 0) {
            return Err(VeloError::invalid_input(format!(
                "event type {:?} has a rule with an empty window",
                event_type.tag
            )));
        }
        self.actions.validate(&event_type)?;
        if event_type.id.is_none() {
            if let Some(existing) = self
                .types
                .get_by_hash_index(TAG_INDEX, vec![event_type.tag.as_str().into()])?
            {
                event_type.id = existing.id;
            }
        }
        self.types.put(&mut event_type)?;
        self.type_cache.remove(&event_type.tag);
        info!(tag = %event_type.tag, id = ?event_type.id, rules = event_type.rules.len(), "registered event type");
        Ok(event_type)
    }

    /// Event type registered under `tag`
    ///
    /// # Errors
    ///
    /// `UnknownEventType` if no type has that tag.
    pub fn resolve_type(&self, tag: &str) -> VeloResult<EventType> {
        if self.config.cache_event_types {
            if let Some(cached) = self.type_cache.get(tag) {
                return Ok(cached.clone());
            }
        }
        let found = self
            .types
            .get_by_hash_index(TAG_INDEX, vec![tag.into()])?
            .ok_or_else(|| VeloError::UnknownEventType {
                tag: tag.to_string(),
            })?;
        if self.config.cache_event_types {
            self.type_cache.insert(tag.to_string(), found.clone());
        }
        Ok(found)
    }

    /// Drop a cached type; true if one was cached
    pub fn invalidate_type(&self, tag: &str) -> bool {
        self.type_cache.remove(tag).is_some()
    }

    // ========== Evaluation ==========

    /// Record and evaluate one event
    ///
    /// Locks on the related entities are taken in `uow` and stay held until
    /// it ends. Returns the event and the params of the last check rule
    /// that fired.
    ///
    /// # Errors
    ///
    /// `UnknownEventType`, `MissingRequiredField`, `LockTimeout`, or any
    /// error raised by a rule action.
    pub fn create_event(&self, uow: &mut UnitOfWork, request: EventRequest) -> VeloResult<Evaluation> {
        let event_type = match request.event_type {
            TypeRef::Tag(ref tag) => self.resolve_type(tag)?,
            TypeRef::Resolved(ref resolved) => resolved.clone(),
        };
        let type_id = event_type.registered_id()?;
        event_type.validate(&request.key)?;

        let mut created_at = request.created_at.unwrap_or_else(Timestamp::now);
        if event_type.sync_mode == SyncMode::LocalDaySynced {
            created_at = created_at.align_to_local_midnight(request.timezone_offset_minutes);
        }

        self.related.lock_related(uow, &event_type, &request.key)?;

        let mode = request.mode;
        let mut event = Event::new(type_id, &request.key, request.weight, created_at);
        let mut persisted = false;
        if mode == EvaluationMode::Normal {
            self.events.put(&mut event)?;
            persisted = true;
            debug!(tag = %event_type.tag, event = %event, "event recorded");
        }

        let mut window = self.get_events(&event_type, &request.key, EventQuery::ending_at(created_at))?;
        if mode != EvaluationMode::Normal {
            // not in the index yet
            window.push(event.clone());
        }

        let violation = self.apply_rules(uow, &event_type, &event, &window, None, mode.runs_actions())?;

        if mode == EvaluationMode::TestAndSave && violation.is_none() {
            self.events.put(&mut event)?;
            persisted = true;
            debug!(tag = %event_type.tag, event = %event, "tested event recorded");
        }
        if let Some(params) = &violation {
            let params = serde_json::Value::Object(params.clone());
            info!(tag = %event_type.tag, ?mode, violation = %params, "velocity rule violated");
        }
        Ok(Evaluation {
            event,
            violation,
            persisted,
        })
    }

    /// Evaluate without storing anything or running actions
    pub fn test_event(&self, uow: &mut UnitOfWork, request: EventRequest) -> VeloResult<Evaluation> {
        self.create_event(uow, request.mode(EvaluationMode::Test))
    }

    /// Stored events of `key` in the query window, oldest first
    ///
    /// The window is `(start, end]`: an event exactly at `start` is out, one
    /// exactly at `end` is in.
    pub fn get_events(&self, event_type: &EventType, key: &EventKey, query: EventQuery) -> VeloResult<Vec<Event>> {
        let type_id = event_type.registered_id()?;
        event_type.validate(key)?;

        let end = query.end.unwrap_or_else(Timestamp::now);
        let start = query
            .start
            .unwrap_or_else(|| end.saturating_sub(event_type.retention()));
        let range: ScoreRange = (
            ScoreBound::Exclusive(start.index_score()),
            ScoreBound::Inclusive(end.index_score()),
        );
        let values = key.index_values(type_id);

        let mut ids = self.events.ids_by_range_index(WINDOW_INDEX, values.clone(), Some(range))?;
        if !query.include_removed {
            let events = self.events.get_many(&ids)?;
            return Ok(events.into_iter().filter(|e| !e.is_removed()).collect());
        }
        ids.extend(self.events.retired_ids_by_range_index(WINDOW_INDEX, values, Some(range))?);
        let mut events: Vec<Event> = self.events.get_map(ids)?.into_values().collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        Ok(events)
    }

    /// Evaluate `event_type`'s rules over `events`
    ///
    /// Each rule sums the weights of events in `(end - window, end]`
    /// (saturating at the `i64` bounds), where
    /// `end` defaults to the event's own time. A firing check rule (no
    /// action) records its params and evaluation continues, so the last
    /// one wins. A firing action rule runs its action when `do_actions` is
    /// set.
    pub fn apply_rules(
        &self,
        uow: &mut UnitOfWork,
        event_type: &EventType,
        event: &Event,
        events: &[Event],
        end: Option<Timestamp>,
        do_actions: bool,
    ) -> VeloResult<Option<Map<String, Value>>> {
        let end = end.unwrap_or(event.created_at);
        let mut violation = None;
        for (position, rule) in event_type.rules.iter().enumerate() {
            let start = end.saturating_sub(rule.window());
            let weight: i64 = events
                .iter()
                .filter(|e| e.created_at > start && e.created_at <= end)
                .map(|e| e.weight)
                .fold(0i64, i64::saturating_add);
            if !rule.trigger.fires(weight, rule.limit) {
                continue;
            }
            match rule.action.as_deref() {
                None => {
                    debug!(tag = %event_type.tag, rule = position, weight, limit = rule.limit, "check rule fired");
                    violation = Some(rule.params.clone());
                }
                Some(name) if do_actions => {
                    debug!(tag = %event_type.tag, rule = position, action = name, weight, "running rule action");
                    let action = self.actions.get(name)?;
                    action.invoke(
                        uow,
                        &ActionCall {
                            event_type,
                            event,
                            weight,
                            params: &rule.params,
                        },
                    )?;
                }
                Some(name) => {
                    debug!(tag = %event_type.tag, rule = position, action = name, "action rule fired, actions disabled");
                }
            }
        }
        Ok(violation)
    }

    // ========== Cancellation ==========

    /// Cancel a stored event, immediately and irreversibly
    ///
    /// The event leaves the live window index and is stamped removed; its
    /// body is kept. Cancelling an already-cancelled event is a no-op.
    pub fn cancel(&self, event: &mut Event, removed_at: Option<Timestamp>) -> VeloResult<()> {
        let id = event
            .id
            .ok_or_else(|| VeloError::invalid_input("cannot cancel an unsaved event"))?;
        if event.is_removed() {
            debug!(id = %id, "event already cancelled");
            return Ok(());
        }
        let mut pipeline = Pipeline::new();
        self.events.stage_remove_from_range_index(event, &mut pipeline)?;
        event.removed_at = Some(removed_at.unwrap_or_else(Timestamp::now));
        self.events.stage_put(event, &mut pipeline)?;
        pipeline.execute(self.events.client())?;
        info!(id = %id, "event cancelled");
        Ok(())
    }

    /// Token authorizing cancellation of a stored event
    pub fn cancellation_token(&self, event: &Event) -> VeloResult<String> {
        self.tokens.issue(event)
    }

    /// Cancel the event `id` if `token` was issued for it
    ///
    /// # Errors
    ///
    /// `InvalidInput` if no such event exists; `InvalidCancellationToken`
    /// if the token does not match.
    pub fn cancel_with_token(&self, id: RecordId, token: &str, removed_at: Option<Timestamp>) -> VeloResult<Event> {
        let mut event = self
            .events
            .get(id)?
            .ok_or_else(|| VeloError::invalid_input(format!("no event {}", id)))?;
        if !self.tokens.verify(&event, token)? {
            warn!(id = %id, "rejected cancellation token");
            return Err(VeloError::InvalidCancellationToken { id });
        }
        self.cancel(&mut event, removed_at)?;
        Ok(event)
    }

    // ========== Maintenance ==========

    /// Delete events of `key` older than the type's expunge age
    ///
    /// Bodies and index entries of live and cancelled events alike go in
    /// one batch. Returns the number of events deleted.
    pub fn expunge(&self, event_type: &EventType, key: &EventKey, now: Option<Timestamp>) -> VeloResult<usize> {
        let type_id = event_type.registered_id()?;
        let cutoff = now
            .unwrap_or_else(Timestamp::now)
            .saturating_sub(event_type.expunge_age());
        let range: ScoreRange = (ScoreBound::Unbounded, ScoreBound::Exclusive(cutoff.index_score()));
        let values = key.index_values(type_id);

        let mut ids = self.events.ids_by_range_index(WINDOW_INDEX, values.clone(), Some(range))?;
        ids.extend(self.events.retired_ids_by_range_index(WINDOW_INDEX, values, Some(range))?);
        let doomed = self.events.get_map(ids)?;

        let mut pipeline = Pipeline::new();
        for event in doomed.values() {
            self.events.stage_delete(event, &mut pipeline)?;
        }
        pipeline.execute(self.events.client())?;
        debug!(tag = %event_type.tag, count = doomed.len(), cutoff = %cutoff, "expunged events");
        Ok(doomed.len())
    }
}
