//! Field values and their canonical index form
//!
//! Index keys are built from record fields. A raw [`FieldValue`] pulled off a
//! record is normalized into an [`IndexValue`] before it becomes part of any
//! key, and the exact same normalization runs on lookup arguments. If the two
//! sides disagree (an `i32` vs an `i64`, a timestamp vs its score) lookups
//! silently miss, so this module is the only place where that conversion
//! happens.
//!
//! ## Normalization
//!
//! | raw                | canonical                         |
//! |--------------------|-----------------------------------|
//! | `Null`             | `Null` (rendered `None`)          |
//! | `Bool(b)`          | `Int(0 / 1)`                      |
//! | `Int(n)`           | `Int(n)`                          |
//! | `Text(s)`          | `Text(s)` then field transforms   |
//! | `Time(t)`          | `Int(t.index_score())`            |

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::id::RecordId;
use crate::schema::{FieldTransform, IndexField};
use crate::timestamp::Timestamp;

/// Raw value of a record field, as exposed for indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Absent / null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Text
    Text(String),
    /// Point in time
    Time(Timestamp),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(v: Timestamp) -> Self {
        FieldValue::Time(v)
    }
}

/// Out-of-range ids fall back to their decimal text instead of wrapping
impl From<RecordId> for FieldValue {
    fn from(v: RecordId) -> Self {
        match v.to_raw() {
            Ok(raw) => FieldValue::Int(raw),
            Err(_) => FieldValue::Text(v.to_string()),
        }
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => FieldValue::Null,
        }
    }
}

/// Canonical component of an index key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexValue {
    /// Absent component; participates in keys as `None`
    Null,
    /// Integer component (also booleans and timestamps)
    Int(i64),
    /// Text component
    Text(String),
}

impl IndexValue {
    /// Normalize a raw value, without transforms
    pub fn normalize(value: FieldValue) -> Self {
        match value {
            FieldValue::Null => IndexValue::Null,
            FieldValue::Bool(b) => IndexValue::Int(i64::from(b)),
            FieldValue::Int(n) => IndexValue::Int(n),
            FieldValue::Text(s) => IndexValue::Text(s),
            FieldValue::Time(t) => IndexValue::Int(t.index_score()),
        }
    }

    /// Normalize and apply a field's transforms
    pub fn normalize_for(field: &IndexField, value: FieldValue) -> Self {
        let mut normalized = Self::normalize(value);
        for transform in field.transforms {
            normalized = normalized.apply(*transform);
        }
        normalized
    }

    fn apply(self, transform: FieldTransform) -> Self {
        match (transform, self) {
            (FieldTransform::Lower, IndexValue::Text(s)) => IndexValue::Text(s.to_lowercase()),
            (_, other) => other,
        }
    }

    /// Score form for range indexes
    ///
    /// Only integer components are orderable; anything else has no score.
    pub fn as_score(&self) -> Option<i64> {
        match self {
            IndexValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Key-component rendering
    ///
    /// `%` and `:` inside text are percent-escaped so a component can never
    /// masquerade as a separator. `Null` renders as `None`, so the text
    /// `"None"` gets its first letter escaped (`%4Eone`) to stay distinct.
    pub fn render(&self) -> String {
        match self {
            IndexValue::Null => NULL_COMPONENT.to_string(),
            IndexValue::Int(n) => n.to_string(),
            IndexValue::Text(s) => escape_component(s),
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

const NULL_COMPONENT: &str = "None";

fn escape_component(s: &str) -> String {
    if s == NULL_COMPONENT {
        return "%4Eone".to_string();
    }
    if !s.contains(['%', ':']) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 6);
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

/// Normalized composite key of one index entry
pub type IndexTuple = SmallVec<[IndexValue; 5]>;

/// Normalize a list of raw lookup values against an index definition
///
/// Extra values beyond the definition are normalized without transforms.
pub fn normalize_tuple(fields: &[IndexField], values: Vec<FieldValue>) -> IndexTuple {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match fields.get(i) {
            Some(field) => IndexValue::normalize_for(field, v),
            None => IndexValue::normalize(v),
        })
        .collect()
}

/// Render a tuple as `:a:b:c` suffix for set/range index keys
pub fn render_suffix(tuple: &[IndexValue]) -> String {
    let mut out = String::new();
    for v in tuple {
        out.push(':');
        out.push_str(&v.render());
    }
    out
}

/// Render a tuple as a hash-index field (canonical JSON array)
pub fn render_hash_field(tuple: &[IndexValue]) -> String {
    let parts: Vec<serde_json::Value> = tuple
        .iter()
        .map(|v| match v {
            IndexValue::Null => serde_json::Value::Null,
            IndexValue::Int(n) => serde_json::Value::from(*n),
            IndexValue::Text(s) => serde_json::Value::from(s.as_str()),
        })
        .collect();
    serde_json::Value::Array(parts).to_string()
}
