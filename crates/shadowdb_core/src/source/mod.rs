//! The authoritative EAV store the shadow tables mirror.
//!
//! The engine only ever reads from the source of truth. Two adapters ship
//! with the crate: [`SqlSource`] reads a records table and an attribute
//! table over any [`SqlBackend`](shadowdb_storage::SqlBackend), and
//! [`MemorySource`] keeps everything in process.

mod memory;
mod php;
mod sql;

pub use memory::MemorySource;
pub use sql::{SourceLayout, SqlSource};

use crate::entity::{Attributes, EntityId};
use crate::error::CoreResult;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One record as stored in the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Record id.
    pub id: EntityId,
    /// Record type tag.
    pub entity_type: String,
    /// Content blob.
    pub content: String,
}

/// Raw attribute values, every key mapping to all of its stored strings.
pub type RawAttributes = BTreeMap<String, Vec<String>>;

/// Read access to the authoritative store.
pub trait SourceOfTruth: Send + Sync + fmt::Debug {
    /// Loads a record regardless of its status.
    fn get_record(&self, id: EntityId) -> CoreResult<Option<SourceRecord>>;

    /// Loads every raw attribute value of a record.
    fn get_attributes(&self, id: EntityId) -> CoreResult<RawAttributes>;

    /// Lists ids of one type in ascending order.
    fn list_ids(&self, entity_type: &str, limit: usize, offset: usize) -> CoreResult<Vec<EntityId>>;

    /// Counts records of one type.
    fn count(&self, entity_type: &str) -> CoreResult<u64>;

    /// Turns one stored string into a JSON value.
    ///
    /// The default reads JSON arrays and objects and keeps everything else
    /// as a string.
    fn deserialize(&self, raw: &str) -> Value {
        json_or_text(raw)
    }
}

/// Parses JSON arrays and objects, keeping anything else as a string.
pub(crate) fn json_or_text(raw: &str) -> Value {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str(raw) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

/// Builds the attribute map a shadow row stores for a record.
///
/// Internal keys are dropped. A key with one stored value maps to that
/// value deserialized; a key with several maps to an array of them.
pub fn canonical_attributes(source: &dyn SourceOfTruth, raw: RawAttributes, internal_keys: &[String]) -> Attributes {
    let mut attributes = Attributes::new();
    for (key, values) in raw {
        if internal_keys.iter().any(|k| *k == key) {
            continue;
        }
        let value = match values.as_slice() {
            [] => continue,
            [single] => source.deserialize(single),
            many => Value::Array(many.iter().map(|v| source.deserialize(v)).collect()),
        };
        attributes.insert(key, value);
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, &[&str])]) -> RawAttributes {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn deserialize_keeps_plain_text() {
        let source = MemorySource::new();
        assert_eq!(source.deserialize("19.99"), json!("19.99"));
        assert_eq!(source.deserialize("[1,2]"), json!([1, 2]));
        assert_eq!(source.deserialize("{\"a\":true}"), json!({"a": true}));
        assert_eq!(source.deserialize("[not json"), json!("[not json"));
    }

    #[test]
    fn canonicalization() {
        let source = MemorySource::new();
        let internal = vec!["_edit_lock".to_string()];
        let attributes = canonical_attributes(
            &source,
            raw(&[
                ("_edit_lock", &["123:1"]),
                ("_price", &["10"]),
                ("color", &["red", "blue"]),
                ("empty", &[]),
            ]),
            &internal,
        );
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["_price"], json!("10"));
        assert_eq!(attributes["color"], json!(["red", "blue"]));
    }
}
