//! ShadowStore: typed facade over one record class
//!
//! ## Design
//!
//! `ShadowStore<T>` holds nothing but a [`KvClient`] for the partition the
//! class lives in; all state is in the store. Cloning is cheap and any
//! number of stores over the same client are safe.
//!
//! ## Writes
//!
//! A put writes the body and every index entry in one atomic batch. A
//! record without identity first draws a surrogate id from the class's
//! decrementing counter, so shadow-only ids are negative. Updates add the
//! record's current index entries but do not chase entries for values the
//! record no longer has; use [`ShadowStore::reindex`] to repair.
//!
//! ## Reads
//!
//! Index lookups resolve to ids and then batch-fetch bodies. An id whose
//! body is gone (a lookup racing a delete, or a stale index entry) is
//! skipped, never reported as an error.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use tracing::debug;
use velostore_core::{
    value::render_hash_field, FieldValue, IndexKind, RecordId, ScoreBound, ShadowRecord,
    VeloResult,
};
use velostore_storage::{KvClient, Pipeline, StorePool};

use crate::codec;
use crate::index::{lookup_tuple, IndexEntries};
use crate::keys;

/// Score range of a range-index query, bounds in index-score units
pub type ScoreRange = (ScoreBound, ScoreBound);

/// Typed shadow-store access for record class `T`
pub struct ShadowStore<T> {
    client: KvClient,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for ShadowStore<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ShadowStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowStore")
            .field("client", &self.client)
            .finish()
    }
}

impl<T: ShadowRecord> ShadowStore<T> {
    /// Store over an explicit partition client
    pub fn new(client: KvClient) -> Self {
        Self {
            client,
            _record: PhantomData,
        }
    }

    /// Store over the partition named by `T`'s schema
    pub fn for_pool(pool: &StorePool) -> VeloResult<Self> {
        Ok(Self::new(pool.partition(T::schema().partition)?.clone()))
    }

    /// Partition client
    pub fn client(&self) -> &KvClient {
        &self.client
    }

    fn class() -> &'static str {
        T::schema().class
    }

    // ========== Identity ==========

    /// Draw the next surrogate id
    pub fn allocate_id(&self) -> VeloResult<RecordId> {
        let raw = self.client.decr(&keys::id_counter_key(Self::class()))?;
        RecordId::from_raw(raw)
    }

    fn ensure_id(&self, record: &mut T) -> VeloResult<RecordId> {
        match record.id() {
            Some(id) => id.validate(),
            None => {
                let id = self.allocate_id()?;
                record.set_id(id);
                Ok(id)
            }
        }
    }

    // ========== Codec ==========

    /// Serialize a body
    pub fn encode(record: &T) -> VeloResult<String> {
        codec::encode(record)
    }

    /// Deserialize a body
    pub fn decode(body: &str) -> VeloResult<T> {
        codec::decode(body)
    }

    // ========== Writes ==========

    /// Write body and index entries atomically; assigns an id if missing
    pub fn put(&self, record: &mut T) -> VeloResult<RecordId> {
        let mut pipeline = Pipeline::new();
        let id = self.stage_put(record, &mut pipeline)?;
        pipeline.execute(&self.client)?;
        debug!(class = Self::class(), id = %id, "put");
        Ok(id)
    }

    /// Write the body only, leaving every index untouched
    pub fn put_without_indexes(&self, record: &mut T) -> VeloResult<RecordId> {
        let id = self.ensure_id(record)?;
        self.client
            .set(&keys::body_key(Self::class(), id), Self::encode(record)?)?;
        debug!(class = Self::class(), id = %id, "put without indexes");
        Ok(id)
    }

    /// Queue a put into a caller-owned pipeline
    ///
    /// The id is allocated immediately; only the writes are deferred.
    pub fn stage_put(&self, record: &mut T, pipeline: &mut Pipeline) -> VeloResult<RecordId> {
        let id = self.ensure_id(record)?;
        let entries = IndexEntries::of(record)?;
        pipeline.set(keys::body_key(Self::class(), id), Self::encode(record)?);
        entries.stage_add(Self::class(), id, record.retired(), pipeline)?;
        Ok(id)
    }

    /// Queue a delete into a caller-owned pipeline
    ///
    /// Returns false (and queues nothing) for a record with no identity.
    pub fn stage_delete(&self, record: &T, pipeline: &mut Pipeline) -> VeloResult<bool> {
        let Some(id) = record.id() else {
            return Ok(false);
        };
        IndexEntries::of(record)?.stage_remove(Self::class(), id, pipeline);
        pipeline.del(keys::body_key(Self::class(), id));
        Ok(true)
    }

    /// Remove body and every index entry atomically
    ///
    /// A record that was never stored has nothing to delete.
    pub fn delete(&self, record: &T) -> VeloResult<()> {
        let mut pipeline = Pipeline::new();
        if !self.stage_delete(record, &mut pipeline)? {
            debug!(class = Self::class(), "delete skipped, record has no id");
            return Ok(());
        }
        pipeline.execute(&self.client)?;
        debug!(class = Self::class(), id = ?record.id(), "deleted");
        Ok(())
    }

    /// Queue removal of the record's live range-index entries
    pub fn stage_remove_from_range_index(&self, record: &T, pipeline: &mut Pipeline) -> VeloResult<()> {
        let Some(id) = record.id() else {
            return Ok(());
        };
        let member = id.to_string();
        for entry in IndexEntries::of(record)?.range {
            pipeline.zrem(entry.live_key(Self::class()), member.as_str());
        }
        Ok(())
    }

    /// Remove the record's live range-index entries now
    pub fn remove_from_range_index(&self, record: &T) -> VeloResult<()> {
        let mut pipeline = Pipeline::new();
        self.stage_remove_from_range_index(record, &mut pipeline)?;
        pipeline.execute(&self.client)?;
        Ok(())
    }

    // ========== Reads ==========

    /// Fetch one record
    pub fn get(&self, id: RecordId) -> VeloResult<Option<T>> {
        match self.client.get(&keys::body_key(Self::class(), id))? {
            Some(body) => Ok(Some(Self::decode(&body)?)),
            None => Ok(None),
        }
    }

    /// Fetch several records in one round trip, skipping missing ones
    pub fn get_many(&self, ids: &[RecordId]) -> VeloResult<Vec<T>> {
        let keys: Vec<String> = ids
            .iter()
            .map(|id| keys::body_key(Self::class(), *id))
            .collect();
        self.client
            .mget(&keys)?
            .into_iter()
            .flatten()
            .map(|body| Self::decode(&body))
            .collect()
    }

    /// Fetch distinct records keyed by id
    ///
    /// Duplicate ids cost nothing extra; missing records are absent from the
    /// map.
    pub fn get_map(&self, ids: impl IntoIterator<Item = RecordId>) -> VeloResult<BTreeMap<RecordId, T>> {
        let unique: Vec<RecordId> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut out = BTreeMap::new();
        for record in self.get_many(&unique)? {
            if let Some(id) = record.id() {
                out.insert(id, record);
            }
        }
        Ok(out)
    }

    /// Record under a hash index tuple
    pub fn get_by_hash_index(&self, slot: usize, values: Vec<FieldValue>) -> VeloResult<Option<T>> {
        let tuple = lookup_tuple(T::schema(), IndexKind::Hash, slot, values)?;
        let found = self.client.hget(
            &keys::hash_index_key(Self::class(), slot),
            &render_hash_field(&tuple),
        )?;
        match found {
            Some(raw) => self.get(RecordId::parse(&raw)?),
            None => Ok(None),
        }
    }

    /// Ids under a set index tuple, ascending
    pub fn ids_by_set_index(&self, slot: usize, values: Vec<FieldValue>) -> VeloResult<Vec<RecordId>> {
        let tuple = lookup_tuple(T::schema(), IndexKind::Set, slot, values)?;
        parse_ids(self.client.smembers(&keys::set_index_key(Self::class(), slot, &tuple))?)
    }

    /// Records under a set index tuple
    pub fn get_by_set_index(&self, slot: usize, values: Vec<FieldValue>) -> VeloResult<Vec<T>> {
        let ids = self.ids_by_set_index(slot, values)?;
        self.get_many(&ids)
    }

    /// Records present in every listed set index bucket
    ///
    /// The intersection runs inside the store.
    pub fn intersect_set_indexes(&self, lookups: Vec<(usize, Vec<FieldValue>)>) -> VeloResult<Vec<T>> {
        let mut bucket_keys = Vec::with_capacity(lookups.len());
        for (slot, values) in lookups {
            let tuple = lookup_tuple(T::schema(), IndexKind::Set, slot, values)?;
            bucket_keys.push(keys::set_index_key(Self::class(), slot, &tuple));
        }
        let ids = parse_ids(self.client.sinter(&bucket_keys)?)?;
        self.get_many(&ids)
    }

    /// Ids under a range index tuple, ascending by score
    pub fn ids_by_range_index(
        &self,
        slot: usize,
        values: Vec<FieldValue>,
        score_range: Option<ScoreRange>,
    ) -> VeloResult<Vec<RecordId>> {
        let tuple = lookup_tuple(T::schema(), IndexKind::Range, slot, values)?;
        let key = keys::range_index_key(Self::class(), slot, &tuple);
        self.range_ids(&key, score_range)
    }

    /// Ids of retired records under a range index tuple, ascending by score
    pub fn retired_ids_by_range_index(
        &self,
        slot: usize,
        values: Vec<FieldValue>,
        score_range: Option<ScoreRange>,
    ) -> VeloResult<Vec<RecordId>> {
        let tuple = lookup_tuple(T::schema(), IndexKind::Range, slot, values)?;
        let key = keys::retired_index_key(Self::class(), slot, &tuple);
        self.range_ids(&key, score_range)
    }

    fn range_ids(&self, key: &str, score_range: Option<ScoreRange>) -> VeloResult<Vec<RecordId>> {
        let members = match score_range {
            Some((min, max)) => self.client.zrange_by_score(key, min, max)?,
            None => self.client.zrange(key)?,
        };
        parse_ids(members)
    }

    /// Records under a range index tuple, ascending by score
    pub fn get_by_range_index(
        &self,
        slot: usize,
        values: Vec<FieldValue>,
        score_range: Option<ScoreRange>,
    ) -> VeloResult<Vec<T>> {
        let ids = self.ids_by_range_index(slot, values, score_range)?;
        self.get_many(&ids)
    }

    // ========== Maintenance ==========

    /// Delete every index of the class
    ///
    /// Scans the keyspace for bucket keys, so this is slow on a large store.
    pub fn flush_indexes(&self) -> VeloResult<usize> {
        let schema = T::schema();
        let class = schema.class;
        let mut doomed: Vec<String> = (0..schema.hash_indexes.len())
            .map(|slot| keys::hash_index_key(class, slot))
            .collect();
        for slot in 0..schema.set_indexes.len() {
            doomed.extend(self.client.keys(&keys::set_index_prefix(class, slot))?);
        }
        for slot in 0..schema.range_indexes.len() {
            doomed.extend(self.client.keys(&keys::range_index_prefix(class, slot))?);
            doomed.extend(self.client.keys(&keys::retired_index_prefix(class, slot))?);
        }
        let removed = self.client.del(&doomed)?;
        debug!(class, removed, "flushed indexes");
        Ok(removed as usize)
    }

    /// Rebuild every index from the stored bodies
    ///
    /// Returns the number of records indexed.
    pub fn reindex(&self) -> VeloResult<usize> {
        self.flush_indexes()?;
        let body_keys = self.client.keys(&keys::body_prefix(Self::class()))?;
        let bodies = self.client.mget(&body_keys)?;
        let mut pipeline = Pipeline::new();
        let mut count = 0;
        for body in bodies.into_iter().flatten() {
            let record = Self::decode(&body)?;
            let Some(id) = record.id() else {
                continue;
            };
            IndexEntries::of(&record)?.stage_add(Self::class(), id, record.retired(), &mut pipeline)?;
            count += 1;
        }
        pipeline.execute(&self.client)?;
        debug!(class = Self::class(), count, "reindexed");
        Ok(count)
    }
}

fn parse_ids(members: Vec<String>) -> VeloResult<Vec<RecordId>> {
    members.iter().map(|m| RecordId::parse(m)).collect()
}
