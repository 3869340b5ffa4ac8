//! Event types and their rules
//!
//! An [`EventType`] names a class of trackable event, says which entity
//! parameters an occurrence must carry, and lists the threshold [`Rule`]s
//! evaluated whenever one is recorded. Types are administered out of band
//! and read-only during evaluation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use velostore_core::{
    FieldValue, HashIndexDef, IndexField, RecordId, RecordSchema, RequiredField, ShadowRecord,
    VeloError, VeloResult,
};

use crate::event::EventKey;

/// Comparison between a window's weight sum and a rule's limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Fires when the sum equals the limit
    Equal,
    /// Fires when the sum exceeds the limit
    Above,
}

impl Trigger {
    /// Whether `sum` trips this trigger against `limit`
    pub fn fires(&self, sum: i64, limit: i64) -> bool {
        match self {
            Trigger::Equal => sum == limit,
            Trigger::Above => sum > limit,
        }
    }
}

/// How event timestamps are adjusted before evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SyncMode {
    /// Timestamps are used as given
    #[default]
    Unsynced,
    /// Timestamps snap to the caller's local midnight
    LocalDaySynced,
}

/// Stored code, constant name and human label of every sync mode
static SYNC_MODE_TABLE: [(SyncMode, u8, &str, &str); 2] = [
    (SyncMode::Unsynced, 0, "UNSYNCED", "Unsynced"),
    (SyncMode::LocalDaySynced, 1, "LOCAL_DAY_SYNCED", "Synced to local day"),
];

impl SyncMode {
    /// Every mode, in code order
    pub const ALL: [SyncMode; 2] = [SyncMode::Unsynced, SyncMode::LocalDaySynced];

    fn row(self) -> &'static (SyncMode, u8, &'static str, &'static str) {
        &SYNC_MODE_TABLE[self as usize]
    }

    /// Integer code as stored
    pub fn code(self) -> u8 {
        self.row().1
    }

    /// Constant-style name
    pub fn name(self) -> &'static str {
        self.row().2
    }

    /// Display label
    pub fn label(self) -> &'static str {
        self.row().3
    }

    /// Mode for a stored code
    pub fn from_code(code: u8) -> VeloResult<Self> {
        SYNC_MODE_TABLE
            .iter()
            .find(|row| row.1 == code)
            .map(|row| row.0)
            .ok_or_else(|| VeloError::invalid_input(format!("unknown sync mode code {}", code)))
    }
}

impl From<SyncMode> for u8 {
    fn from(mode: SyncMode) -> u8 {
        mode.code()
    }
}

impl TryFrom<u8> for SyncMode {
    type Error = VeloError;

    fn try_from(code: u8) -> VeloResult<Self> {
        SyncMode::from_code(code)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One threshold rule
///
/// Serialized with the field names of stored rule lists: `timespan`,
/// `limit`, `trigger`, `action`, `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Window length in seconds
    #[serde(rename = "timespan")]
    pub window_secs: u64,
    /// Weight the trigger compares against
    pub limit: i64,
    /// Comparison
    pub trigger: Trigger,
    /// Registered action to invoke; `None` makes the rule a plain check
    #[serde(default)]
    pub action: Option<String>,
    /// Passed to the action, or returned as the violation
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Rule {
    /// Plain check rule with no params
    pub fn new(window_secs: u64, limit: i64, trigger: Trigger) -> Self {
        Self {
            window_secs,
            limit,
            trigger,
            action: None,
            params: Map::new(),
        }
    }

    /// Invoke `action` when the rule fires
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Set one param
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Window length
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

static EVENT_TYPE_SCHEMA: RecordSchema = RecordSchema {
    class: "EventType",
    partition: 0,
    fields: &[
        "id",
        "tag",
        "requires_principal",
        "requires_primary_context",
        "requires_secondary_context",
        "requires_unique_id",
        "external",
        "sync_mode",
        "expunge_after_secs",
        "rules",
    ],
    hash_indexes: &[HashIndexDef {
        fields: &[IndexField::new("tag")],
    }],
    set_indexes: &[],
    range_indexes: &[],
};

/// Hash-index slot of [`EventType::tag`]
pub const TAG_INDEX: usize = 0;

/// A class of trackable event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventType {
    /// Identity, `None` until registered
    pub id: Option<RecordId>,
    /// Unique lookup tag
    pub tag: String,
    /// Occurrences must name a principal
    pub requires_principal: bool,
    /// Occurrences must name a primary context
    pub requires_primary_context: bool,
    /// Occurrences must name a secondary context
    pub requires_secondary_context: bool,
    /// Occurrences must carry a free-form id
    pub requires_unique_id: bool,
    /// May be triggered by outside callers
    pub external: bool,
    /// Timestamp adjustment
    pub sync_mode: SyncMode,
    /// Age after which events may be expunged; defaults to the retention
    pub expunge_after_secs: Option<u64>,
    /// Rules in evaluation order
    pub rules: Vec<Rule>,
}

impl EventType {
    /// Unregistered type with no requirements and no rules
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Require an entity parameter
    pub fn requiring(mut self, field: RequiredField) -> Self {
        match field {
            RequiredField::Principal => self.requires_principal = true,
            RequiredField::PrimaryContext => self.requires_primary_context = true,
            RequiredField::SecondaryContext => self.requires_secondary_context = true,
            RequiredField::UniqueId => self.requires_unique_id = true,
        }
        self
    }

    /// Append a rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the sync mode
    pub fn synced(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Set the expunge age
    pub fn expunge_after(mut self, secs: u64) -> Self {
        self.expunge_after_secs = Some(secs);
        self
    }

    /// Mark as externally triggerable
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    /// Whether occurrences must carry `field`
    pub fn requires(&self, field: RequiredField) -> bool {
        match field {
            RequiredField::Principal => self.requires_principal,
            RequiredField::PrimaryContext => self.requires_primary_context,
            RequiredField::SecondaryContext => self.requires_secondary_context,
            RequiredField::UniqueId => self.requires_unique_id,
        }
    }

    /// Longest rule window; the span any evaluation needs to look back
    pub fn retention(&self) -> Duration {
        self.rules
            .iter()
            .map(Rule::window)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Age after which events may be dropped
    pub fn expunge_age(&self) -> Duration {
        self.expunge_after_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.retention())
    }

    /// Check that `key` carries every required parameter
    ///
    /// # Errors
    ///
    /// `MissingRequiredField` naming the first missing one, in
    /// [`RequiredField::ALL`] order.
    pub fn validate(&self, key: &EventKey) -> VeloResult<()> {
        for field in RequiredField::ALL {
            if self.requires(field) && !key.has(field) {
                return Err(VeloError::MissingRequiredField { field });
            }
        }
        Ok(())
    }

    /// Identity, or an error for a type that was never registered
    pub fn registered_id(&self) -> VeloResult<RecordId> {
        self.id.ok_or_else(|| {
            VeloError::invalid_input(format!("event type {:?} is not registered", self.tag))
        })
    }
}

impl ShadowRecord for EventType {
    fn schema() -> &'static RecordSchema {
        &EVENT_TYPE_SCHEMA
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn field_value(&self, field: &str) -> VeloResult<FieldValue> {
        match field {
            "tag" => Ok(self.tag.as_str().into()),
            other => Err(VeloError::UnknownField {
                class: EVENT_TYPE_SCHEMA.class.to_string(),
                field: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "[EventType:{}] {}", id, self.tag),
            None => write!(f, "[EventType:None] {}", self.tag),
        }
    }
}
