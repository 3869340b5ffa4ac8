//! Record identifiers
//!
//! Records mirrored from the relational store keep their positive primary key.
//! Records that only ever live in the shadow store get a surrogate id from a
//! per-class counter that counts downwards from -1. On the wire both are a
//! single signed integer; in memory the distinction is an explicit variant so
//! code cannot mix the two up by accident.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::{VeloError, VeloResult};

/// Identity of a shadowed record
///
/// Both spaces share the signed wire form, so a payload must lie in
/// `1..=RecordId::MAX`. The checked constructors enforce that; an id built
/// directly from a variant outside the range cannot be encoded or stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "i64")]
pub enum RecordId {
    /// Primary key assigned by the relational store (stored as +n)
    Persisted(u64),
    /// Surrogate key for a shadow-only record (stored as -n)
    Shadow(u64),
}

impl RecordId {
    /// Largest payload in either space
    pub const MAX: u64 = i64::MAX as u64;

    /// Checked relational id
    ///
    /// # Errors
    ///
    /// `InvalidInput` for 0 or anything above [`RecordId::MAX`].
    pub fn persisted(n: u64) -> VeloResult<Self> {
        RecordId::Persisted(n).validate()
    }

    /// Checked surrogate id
    ///
    /// # Errors
    ///
    /// `InvalidInput` for 0 or anything above [`RecordId::MAX`].
    pub fn shadow(n: u64) -> VeloResult<Self> {
        RecordId::Shadow(n).validate()
    }

    /// Payload without its space
    pub fn value(self) -> u64 {
        match self {
            RecordId::Persisted(n) | RecordId::Shadow(n) => n,
        }
    }

    /// Whether the payload fits the signed wire form
    pub fn is_valid(self) -> bool {
        (1..=Self::MAX).contains(&self.value())
    }

    /// The id itself, or an error if its payload is out of range
    pub fn validate(self) -> VeloResult<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(VeloError::invalid_input(format!(
                "record id payload {} outside 1..={}",
                self.value(),
                Self::MAX
            )))
        }
    }

    /// Decode the signed wire form
    ///
    /// # Errors
    ///
    /// Zero is not a valid id in either space, and `i64::MIN` has no
    /// positive counterpart.
    pub fn from_raw(raw: i64) -> VeloResult<Self> {
        match raw {
            0 => Err(VeloError::invalid_input("record id 0 is not valid")),
            n if n > 0 => Ok(RecordId::Persisted(n.unsigned_abs())),
            n => RecordId::shadow(n.unsigned_abs()),
        }
    }

    /// Signed wire form (shadow ids are negative)
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the payload is out of range.
    pub fn to_raw(self) -> VeloResult<i64> {
        let n = self.validate()?.value() as i64;
        Ok(match self {
            RecordId::Persisted(_) => n,
            RecordId::Shadow(_) => -n,
        })
    }

    /// True when the record exists only in the shadow store
    pub fn is_shadow(&self) -> bool {
        matches!(self, RecordId::Shadow(_))
    }

    /// Parse the decimal wire form used for index members
    pub fn parse(text: &str) -> VeloResult<Self> {
        let raw: i64 = text
            .parse()
            .map_err(|_| VeloError::invalid_input(format!("not a record id: {:?}", text)))?;
        Self::from_raw(raw)
    }
}

/// Signed decimal form; the sign comes from the variant, never from overflow
impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Persisted(n) => write!(f, "{}", n),
            RecordId::Shadow(n) => write!(f, "-{}", n),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = self.to_raw().map_err(serde::ser::Error::custom)?;
        serializer.serialize_i64(raw)
    }
}

impl TryFrom<RecordId> for i64 {
    type Error = VeloError;

    fn try_from(id: RecordId) -> VeloResult<i64> {
        id.to_raw()
    }
}

impl TryFrom<i64> for RecordId {
    type Error = VeloError;

    fn try_from(raw: i64) -> VeloResult<Self> {
        RecordId::from_raw(raw)
    }
}
