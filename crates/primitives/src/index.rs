//! Index entries derived from a record
//!
//! Every index entry is a pure function of the record's current field
//! values, so the same computation serves add (on put) and remove (on
//! delete). Lookup arguments pass through the same normalization in
//! [`lookup_tuple`].

use velostore_core::{
    value::render_hash_field, FieldValue, IndexField, IndexKind, IndexTuple, IndexValue,
    RecordId, RecordSchema, ShadowRecord, VeloError, VeloResult,
};
use velostore_storage::Pipeline;

use crate::keys;

/// One record's entries across every declared index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntries {
    /// (hash key, hash field) per hash index
    pub hash: Vec<(String, String)>,
    /// Set bucket key per set index
    pub set: Vec<String>,
    /// Per range index
    pub range: Vec<RangeEntry>,
}

/// A record's place in one range index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEntry {
    /// Slot in the schema
    pub slot: usize,
    /// Normalized key tuple
    pub tuple: IndexTuple,
    /// Score, `None` when the score field is null or not numeric
    pub score: Option<i64>,
}

impl RangeEntry {
    /// Live bucket key
    pub fn live_key(&self, class: &str) -> String {
        keys::range_index_key(class, self.slot, &self.tuple)
    }

    /// Retired bucket key
    pub fn retired_key(&self, class: &str) -> String {
        keys::retired_index_key(class, self.slot, &self.tuple)
    }
}

impl IndexEntries {
    /// Compute every index entry of `record`
    pub fn of<T: ShadowRecord>(record: &T) -> VeloResult<Self> {
        let schema = T::schema();
        let class = schema.class;

        let mut hash = Vec::with_capacity(schema.hash_indexes.len());
        for (slot, def) in schema.hash_indexes.iter().enumerate() {
            let tuple = record_tuple(record, def.fields)?;
            hash.push((keys::hash_index_key(class, slot), render_hash_field(&tuple)));
        }

        let mut set = Vec::with_capacity(schema.set_indexes.len());
        for (slot, def) in schema.set_indexes.iter().enumerate() {
            let tuple = record_tuple(record, def.fields)?;
            set.push(keys::set_index_key(class, slot, &tuple));
        }

        let mut range = Vec::with_capacity(schema.range_indexes.len());
        for (slot, def) in schema.range_indexes.iter().enumerate() {
            let tuple = record_tuple(record, def.fields)?;
            let score = IndexValue::normalize(record.field_value(def.score)?).as_score();
            range.push(RangeEntry { slot, tuple, score });
        }

        Ok(Self { hash, set, range })
    }

    /// Queue additions for record `id`
    ///
    /// Range entries of a retired record land in the retired buckets.
    pub fn stage_add(
        &self,
        class: &str,
        id: RecordId,
        retired: bool,
        pipeline: &mut Pipeline,
    ) -> VeloResult<()> {
        let member = id.to_raw()?.to_string();
        for (key, field) in &self.hash {
            pipeline.hset(key.as_str(), field.as_str(), member.as_str());
        }
        for key in &self.set {
            pipeline.sadd(key.as_str(), member.as_str());
        }
        for entry in &self.range {
            let score = entry.score.ok_or_else(|| {
                VeloError::invalid_input(format!(
                    "{} {} has no numeric score for range index {}",
                    class, id, entry.slot
                ))
            })?;
            let key = if retired {
                entry.retired_key(class)
            } else {
                entry.live_key(class)
            };
            pipeline.zadd(key, score, member.as_str());
        }
        Ok(())
    }

    /// Queue removals for record `id`, from live and retired range buckets
    pub fn stage_remove(&self, class: &str, id: RecordId, pipeline: &mut Pipeline) {
        let member = id.to_string();
        for (key, field) in &self.hash {
            pipeline.hdel(key.as_str(), field.as_str());
        }
        for key in &self.set {
            pipeline.srem(key.as_str(), member.as_str());
        }
        for entry in &self.range {
            pipeline.zrem(entry.live_key(class), member.as_str());
            pipeline.zrem(entry.retired_key(class), member.as_str());
        }
    }
}

fn record_tuple<T: ShadowRecord>(record: &T, fields: &[IndexField]) -> VeloResult<IndexTuple> {
    fields
        .iter()
        .map(|field| Ok(IndexValue::normalize_for(field, record.field_value(field.name)?)))
        .collect()
}

/// Normalize lookup values for index `slot` of `kind`
///
/// # Errors
///
/// `UnknownIndex` for an undeclared slot, `InvalidInput` when the number of
/// values differs from the index arity.
pub fn lookup_tuple(
    schema: &RecordSchema,
    kind: IndexKind,
    slot: usize,
    values: Vec<FieldValue>,
) -> VeloResult<IndexTuple> {
    let fields = index_fields(schema, kind, slot)?;
    if fields.len() != values.len() {
        return Err(VeloError::invalid_input(format!(
            "{} {} index {} takes {} values, got {}",
            schema.class,
            kind.name(),
            slot,
            fields.len(),
            values.len()
        )));
    }
    Ok(velostore_core::value::normalize_tuple(fields, values))
}

/// Declared fields of one index
pub fn index_fields(
    schema: &RecordSchema,
    kind: IndexKind,
    slot: usize,
) -> VeloResult<&'static [IndexField]> {
    let fields = match kind {
        IndexKind::Hash => schema.hash_indexes.get(slot).map(|d| d.fields),
        IndexKind::Set => schema.set_indexes.get(slot).map(|d| d.fields),
        IndexKind::Range => schema.range_indexes.get(slot).map(|d| d.fields),
    };
    fields.ok_or_else(|| VeloError::UnknownIndex {
        class: schema.class.to_string(),
        kind: kind.name(),
        slot,
    })
}
