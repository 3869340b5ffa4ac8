//! Audit trail
//!
//! Free-form records of who did what, from where. Entries are written
//! through the caller's unit of work, so an audit entry for a request that
//! fails is discarded along with the request's other writes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use velostore_concurrency::UnitOfWork;
use velostore_core::{
    FieldValue, IndexField, RangeIndexDef, RecordId, RecordSchema, ScoreBound, SetIndexDef,
    ShadowRecord, Timestamp, VeloError, VeloResult,
};
use velostore_primitives::ShadowStore;
use velostore_storage::StorePool;

static AUDIT_SCHEMA: RecordSchema = RecordSchema {
    class: "AuditEntry",
    partition: 0,
    fields: &[
        "id",
        "principal_id",
        "source_ip",
        "created_at",
        "kind",
        "unique_id",
        "details",
    ],
    hash_indexes: &[],
    set_indexes: &[SetIndexDef {
        fields: &[IndexField::new("kind")],
    }],
    range_indexes: &[RangeIndexDef {
        score: "created_at",
        fields: &[IndexField::new("principal_id")],
    }],
};

const KIND_INDEX: usize = 0;
const PRINCIPAL_INDEX: usize = 0;

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditEntry {
    /// Identity
    pub id: Option<RecordId>,
    /// Who acted, if anyone
    pub principal_id: Option<RecordId>,
    /// Where the request came from
    pub source_ip: Option<IpAddr>,
    /// When
    pub created_at: Timestamp,
    /// What happened
    pub kind: String,
    /// Caller-chosen correlation id
    pub unique_id: String,
    /// Anything else worth keeping
    pub details: Value,
}

impl Default for AuditEntry {
    fn default() -> Self {
        Self {
            id: None,
            principal_id: None,
            source_ip: None,
            created_at: Timestamp::EPOCH,
            kind: String::new(),
            unique_id: String::new(),
            details: Value::Null,
        }
    }
}

impl AuditEntry {
    /// Entry of `kind` stamped now
    pub fn new(kind: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            unique_id: unique_id.into(),
            created_at: Timestamp::now(),
            ..Self::default()
        }
    }

    /// Set the acting principal
    pub fn principal(mut self, id: RecordId) -> Self {
        self.principal_id = Some(id);
        self
    }

    /// Set the source address
    pub fn source_ip(mut self, ip: IpAddr) -> Self {
        self.source_ip = Some(ip);
        self
    }

    /// Set the timestamp
    pub fn at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set the details
    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

impl ShadowRecord for AuditEntry {
    fn schema() -> &'static RecordSchema {
        &AUDIT_SCHEMA
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn field_value(&self, field: &str) -> VeloResult<FieldValue> {
        match field {
            "kind" => Ok(self.kind.as_str().into()),
            "principal_id" => Ok(self.principal_id.into()),
            "created_at" => Ok(self.created_at.into()),
            other => Err(VeloError::UnknownField {
                class: AUDIT_SCHEMA.class.to_string(),
                field: other.to_string(),
            }),
        }
    }
}

/// Audit entries in one partition
#[derive(Debug, Clone)]
pub struct AuditTrail {
    partition: usize,
    store: ShadowStore<AuditEntry>,
}

impl AuditTrail {
    /// Trail stored in `partition` of `pool`
    pub fn new(pool: &StorePool, partition: usize) -> VeloResult<Self> {
        Ok(Self {
            partition,
            store: ShadowStore::new(pool.partition(partition)?.clone()),
        })
    }

    /// Buffer an entry in `uow`; it is written when the unit commits
    pub fn record(&self, uow: &mut UnitOfWork, mut entry: AuditEntry) -> VeloResult<RecordId> {
        uow.save_in(self.partition, &mut entry)
    }

    /// Fetch one entry
    pub fn get(&self, id: RecordId) -> VeloResult<Option<AuditEntry>> {
        self.store.get(id)
    }

    /// Entries of `principal` (or of no principal) in `[start, end]`, oldest first
    pub fn by_principal(
        &self,
        principal: Option<RecordId>,
        start: Timestamp,
        end: Timestamp,
    ) -> VeloResult<Vec<AuditEntry>> {
        self.store.get_by_range_index(
            PRINCIPAL_INDEX,
            vec![principal.into()],
            Some((
                ScoreBound::Inclusive(start.index_score()),
                ScoreBound::Inclusive(end.index_score()),
            )),
        )
    }

    /// Every entry of `kind`, oldest first
    pub fn by_kind(&self, kind: &str) -> VeloResult<Vec<AuditEntry>> {
        let mut entries = self.store.get_by_set_index(KIND_INDEX, vec![kind.into()])?;
        entries.sort_by_key(|e| (e.created_at, e.id));
        Ok(entries)
    }
}
