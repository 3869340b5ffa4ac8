//! Static record schemas
//!
//! Every record type placed in the shadow store declares, once and at compile
//! time, which fields make up its body and which indexes are maintained over
//! it. Index slots are positions in the respective list and appear in store
//! keys, so appending is safe and reordering is a data migration.

/// Transformation applied to a text component before it is indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransform {
    /// Lower-case the text (case-insensitive lookups)
    Lower,
}

/// One component of an index definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexField {
    /// Field name passed to `ShadowRecord::field_value`
    pub name: &'static str,
    /// Transforms applied after normalization, in order
    pub transforms: &'static [FieldTransform],
}

impl IndexField {
    /// Plain field
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            transforms: &[],
        }
    }

    /// Field with transforms
    pub const fn with_transforms(name: &'static str, transforms: &'static [FieldTransform]) -> Self {
        Self { name, transforms }
    }
}

/// Unique index: composite key → one id (last write wins)
#[derive(Debug, Clone, Copy)]
pub struct HashIndexDef {
    /// Key components
    pub fields: &'static [IndexField],
}

/// Multi-value index: composite key → set of ids
#[derive(Debug, Clone, Copy)]
pub struct SetIndexDef {
    /// Key components
    pub fields: &'static [IndexField],
}

/// Sorted index: composite key → ids ordered by a numeric score
#[derive(Debug, Clone, Copy)]
pub struct RangeIndexDef {
    /// Field providing the score (integer or timestamp)
    pub score: &'static str,
    /// Key components
    pub fields: &'static [IndexField],
}

/// Index flavor, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// [`HashIndexDef`]
    Hash,
    /// [`SetIndexDef`]
    Set,
    /// [`RangeIndexDef`]
    Range,
}

impl IndexKind {
    /// Lower-case name
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Hash => "hash",
            IndexKind::Set => "set",
            IndexKind::Range => "range",
        }
    }
}

/// Complete storage description of a record type
#[derive(Debug, Clone, Copy)]
pub struct RecordSchema {
    /// Class name used in every store key
    pub class: &'static str,
    /// Store partition the class lives in
    pub partition: usize,
    /// Fields serialized into the record body (must include `id`)
    pub fields: &'static [&'static str],
    /// Unique indexes
    pub hash_indexes: &'static [HashIndexDef],
    /// Multi-value indexes
    pub set_indexes: &'static [SetIndexDef],
    /// Sorted indexes
    pub range_indexes: &'static [RangeIndexDef],
}

impl RecordSchema {
    /// Schema with no indexes
    pub const fn plain(class: &'static str, partition: usize, fields: &'static [&'static str]) -> Self {
        Self {
            class,
            partition,
            fields,
            hash_indexes: &[],
            set_indexes: &[],
            range_indexes: &[],
        }
    }

    /// Total number of index definitions
    pub fn index_count(&self) -> usize {
        self.hash_indexes.len() + self.set_indexes.len() + self.range_indexes.len()
    }

    /// Whether `name` is a declared body field
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| *f == name)
    }
}
