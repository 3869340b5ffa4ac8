//! Events and evaluation requests

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use velostore_core::{
    FieldValue, IndexField, RangeIndexDef, RecordId, RecordSchema, RequiredField, ShadowRecord,
    Timestamp, VeloError, VeloResult,
};

use crate::event_type::EventType;

static EVENT_SCHEMA: RecordSchema = RecordSchema {
    class: "Event",
    partition: 1,
    fields: &[
        "id",
        "type_id",
        "principal_id",
        "primary_context_id",
        "secondary_context_id",
        "unique_id",
        "weight",
        "created_at",
        "removed_at",
    ],
    hash_indexes: &[],
    set_indexes: &[],
    range_indexes: &[RangeIndexDef {
        score: "created_at",
        fields: &[
            IndexField::new("type_id"),
            IndexField::new("principal_id"),
            IndexField::new("primary_context_id"),
            IndexField::new("secondary_context_id"),
            IndexField::new("unique_id"),
        ],
    }],
};

/// Range-index slot grouping events by composite key
pub const WINDOW_INDEX: usize = 0;

/// Entity parameters identifying which aggregate an event belongs to
///
/// Absent components still take part in the key, as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// Acting principal
    pub principal: Option<RecordId>,
    /// Primary context entity
    pub primary_context: Option<RecordId>,
    /// Secondary context entity
    pub secondary_context: Option<RecordId>,
    /// Caller-chosen identifier
    pub unique_id: Option<String>,
}

impl EventKey {
    /// Key with every component absent
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the principal
    pub fn principal(mut self, id: RecordId) -> Self {
        self.principal = Some(id);
        self
    }

    /// Set the primary context
    pub fn primary_context(mut self, id: RecordId) -> Self {
        self.primary_context = Some(id);
        self
    }

    /// Set the secondary context
    pub fn secondary_context(mut self, id: RecordId) -> Self {
        self.secondary_context = Some(id);
        self
    }

    /// Set the free-form id
    pub fn unique_id(mut self, id: impl Into<String>) -> Self {
        self.unique_id = Some(id.into());
        self
    }

    /// Whether the component for `field` is present
    pub fn has(&self, field: RequiredField) -> bool {
        match field {
            RequiredField::Principal => self.principal.is_some(),
            RequiredField::PrimaryContext => self.primary_context.is_some(),
            RequiredField::SecondaryContext => self.secondary_context.is_some(),
            RequiredField::UniqueId => self.unique_id.is_some(),
        }
    }

    /// Range-index lookup values for events of `type_id`
    pub(crate) fn index_values(&self, type_id: RecordId) -> Vec<FieldValue> {
        vec![
            type_id.into(),
            self.principal.into(),
            self.primary_context.into(),
            self.secondary_context.into(),
            self.unique_id.clone().into(),
        ]
    }
}

/// One weighted occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// Identity, `None` for an event that was only tested
    pub id: Option<RecordId>,
    /// Event type
    pub type_id: Option<RecordId>,
    /// Acting principal
    pub principal_id: Option<RecordId>,
    /// Primary context entity
    pub primary_context_id: Option<RecordId>,
    /// Secondary context entity
    pub secondary_context_id: Option<RecordId>,
    /// Caller-chosen identifier
    pub unique_id: Option<String>,
    /// Contribution to window sums
    pub weight: i64,
    /// When it happened (after sync adjustment)
    pub created_at: Timestamp,
    /// Set once cancelled
    pub removed_at: Option<Timestamp>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: None,
            type_id: None,
            principal_id: None,
            primary_context_id: None,
            secondary_context_id: None,
            unique_id: None,
            weight: 1,
            created_at: Timestamp::EPOCH,
            removed_at: None,
        }
    }
}

impl Event {
    /// Unsaved event of `type_id` for `key`
    pub fn new(type_id: RecordId, key: &EventKey, weight: i64, created_at: Timestamp) -> Self {
        Self {
            type_id: Some(type_id),
            principal_id: key.principal,
            primary_context_id: key.primary_context,
            secondary_context_id: key.secondary_context,
            unique_id: key.unique_id.clone(),
            weight,
            created_at,
            ..Self::default()
        }
    }

    /// Composite key the event is grouped under
    pub fn key(&self) -> EventKey {
        EventKey {
            principal: self.principal_id,
            primary_context: self.primary_context_id,
            secondary_context: self.secondary_context_id,
            unique_id: self.unique_id.clone(),
        }
    }

    /// Whether the event has been cancelled
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

impl ShadowRecord for Event {
    fn schema() -> &'static RecordSchema {
        &EVENT_SCHEMA
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn field_value(&self, field: &str) -> VeloResult<FieldValue> {
        Ok(match field {
            "type_id" => self.type_id.into(),
            "principal_id" => self.principal_id.into(),
            "primary_context_id" => self.primary_context_id.into(),
            "secondary_context_id" => self.secondary_context_id.into(),
            "unique_id" => self.unique_id.clone().into(),
            "created_at" => self.created_at.into(),
            other => {
                return Err(VeloError::UnknownField {
                    class: EVENT_SCHEMA.class.to_string(),
                    field: other.to_string(),
                })
            }
        })
    }

    fn retired(&self) -> bool {
        self.is_removed()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.map_or_else(|| "None".to_string(), |id| id.to_string());
        write!(f, "[Event:{}] weight {} at {}", id, self.weight, self.created_at)?;
        if self.is_removed() {
            f.write_str(" (removed)")?;
        }
        Ok(())
    }
}

/// Whether and when an evaluated event is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Store first, then evaluate and run actions
    #[default]
    Normal,
    /// Evaluate only; nothing is stored and no action runs
    Test,
    /// Evaluate without actions; store only if no check rule fires
    TestAndSave,
}

impl EvaluationMode {
    /// Whether rule actions run
    pub fn runs_actions(&self) -> bool {
        matches!(self, EvaluationMode::Normal)
    }
}

/// Which event type a request is for
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// Look up by tag
    Tag(String),
    /// Already resolved
    Resolved(EventType),
}

/// Parameters of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    /// Event type
    pub event_type: TypeRef,
    /// Composite key
    pub key: EventKey,
    /// Weight, default 1
    pub weight: i64,
    /// Event time, default now
    pub created_at: Option<Timestamp>,
    /// Storage mode
    pub mode: EvaluationMode,
    /// Caller's timezone offset for day-synced types
    pub timezone_offset_minutes: i32,
}

impl EventRequest {
    /// Request for the type registered under `tag`
    pub fn new(tag: impl Into<String>) -> Self {
        Self::with_type_ref(TypeRef::Tag(tag.into()))
    }

    /// Request for an already-resolved type
    pub fn for_type(event_type: EventType) -> Self {
        Self::with_type_ref(TypeRef::Resolved(event_type))
    }

    fn with_type_ref(event_type: TypeRef) -> Self {
        Self {
            event_type,
            key: EventKey::default(),
            weight: 1,
            created_at: None,
            mode: EvaluationMode::Normal,
            timezone_offset_minutes: 0,
        }
    }

    /// Set the whole composite key
    pub fn key(mut self, key: EventKey) -> Self {
        self.key = key;
        self
    }

    /// Set the principal
    pub fn principal(mut self, id: RecordId) -> Self {
        self.key.principal = Some(id);
        self
    }

    /// Set the primary context
    pub fn primary_context(mut self, id: RecordId) -> Self {
        self.key.primary_context = Some(id);
        self
    }

    /// Set the secondary context
    pub fn secondary_context(mut self, id: RecordId) -> Self {
        self.key.secondary_context = Some(id);
        self
    }

    /// Set the free-form id
    pub fn unique_id(mut self, id: impl Into<String>) -> Self {
        self.key.unique_id = Some(id.into());
        self
    }

    /// Set the weight
    pub fn weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the event time
    pub fn at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set the storage mode
    pub fn mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the caller's timezone offset
    pub fn timezone_offset(mut self, minutes: i32) -> Self {
        self.timezone_offset_minutes = minutes;
        self
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The evaluated event, with an id if it was stored
    pub event: Event,
    /// Params of the last check rule that fired
    pub violation: Option<Map<String, Value>>,
    /// Whether the event was stored
    pub persisted: bool,
}

impl Evaluation {
    /// Whether a check rule fired
    pub fn is_violation(&self) -> bool {
        self.violation.is_some()
    }
}

/// Window of a `get_events` query
///
/// Bounds are `(start, end]`. Without an explicit start the window reaches
/// back one retention span from `end`; without an end it closes now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventQuery {
    /// Exclusive lower bound
    pub start: Option<Timestamp>,
    /// Inclusive upper bound
    pub end: Option<Timestamp>,
    /// Also return cancelled events
    pub include_removed: bool,
}

impl EventQuery {
    /// Window closing now
    pub fn new() -> Self {
        Self::default()
    }

    /// Window closing at `end`
    pub fn ending_at(end: Timestamp) -> Self {
        Self {
            end: Some(end),
            ..Self::default()
        }
    }

    /// Set the exclusive lower bound
    pub fn starting_after(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    /// Include cancelled events
    pub fn include_removed(mut self) -> Self {
        self.include_removed = true;
        self
    }
}
