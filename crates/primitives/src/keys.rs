//! Store key layout
//!
//! | key                                          | type   | holds                     |
//! |----------------------------------------------|--------|---------------------------|
//! | `dbshadow:{class}:{id}`                      | string | JSON record body          |
//! | `dbshadow_id:{class}`                        | string | surrogate id counter      |
//! | `dbshadow_lock:{class}:{id}`                 | string | lock holder (leased)      |
//! | `dbshadow_index:{class}:{slot}`              | hash   | tuple → id                |
//! | `dbshadow_mindex:{class}:{slot}:{v}..`       | set    | ids                       |
//! | `dbshadow_zindex:{class}:{slot}:{v}..`       | zset   | ids by score              |
//! | `dbshadow_zretired:{class}:{slot}:{v}..`     | zset   | soft-removed ids by score |
//!
//! Ids appear in their signed wire form, so shadow-only records show up as
//! negative numbers.

use velostore_core::{IndexValue, RecordId};

/// Record body
pub fn body_key(class: &str, id: RecordId) -> String {
    format!("dbshadow:{}:{}", class, id)
}

/// Prefix shared by every body of `class`
pub fn body_prefix(class: &str) -> String {
    format!("dbshadow:{}:", class)
}

/// Surrogate id counter
pub fn id_counter_key(class: &str) -> String {
    format!("dbshadow_id:{}", class)
}

/// Lock on one record
pub fn lock_key(class: &str, id: RecordId) -> String {
    format!("dbshadow_lock:{}:{}", class, id)
}

/// Hash index of `slot`
pub fn hash_index_key(class: &str, slot: usize) -> String {
    format!("dbshadow_index:{}:{}", class, slot)
}

/// Set index bucket for `tuple`
pub fn set_index_key(class: &str, slot: usize, tuple: &[IndexValue]) -> String {
    format!("{}{}", set_index_prefix(class, slot), join(tuple))
}

/// Prefix of every set index bucket in `slot`
pub fn set_index_prefix(class: &str, slot: usize) -> String {
    format!("dbshadow_mindex:{}:{}:", class, slot)
}

/// Live range index bucket for `tuple`
pub fn range_index_key(class: &str, slot: usize, tuple: &[IndexValue]) -> String {
    format!("{}{}", range_index_prefix(class, slot), join(tuple))
}

/// Prefix of every live range index bucket in `slot`
pub fn range_index_prefix(class: &str, slot: usize) -> String {
    format!("dbshadow_zindex:{}:{}:", class, slot)
}

/// Retired range index bucket for `tuple`
pub fn retired_index_key(class: &str, slot: usize, tuple: &[IndexValue]) -> String {
    format!("{}{}", retired_index_prefix(class, slot), join(tuple))
}

/// Prefix of every retired range index bucket in `slot`
pub fn retired_index_prefix(class: &str, slot: usize) -> String {
    format!("dbshadow_zretired:{}:{}:", class, slot)
}

fn join(tuple: &[IndexValue]) -> String {
    tuple
        .iter()
        .map(IndexValue::render)
        .collect::<Vec<_>>()
        .join(":")
}
