//! In-process source of truth.

use super::{RawAttributes, SourceOfTruth, SourceRecord};
use crate::entity::EntityId;
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug)]
struct StoredRecord {
    record: SourceRecord,
    attributes: RawAttributes,
}

/// A [`SourceOfTruth`] held in memory.
///
/// Used by tests and by tooling that feeds records from elsewhere.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: RwLock<BTreeMap<EntityId, StoredRecord>>,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, keeping its attributes.
    pub fn insert_record(&self, id: EntityId, entity_type: impl Into<String>, content: impl Into<String>) {
        let record = SourceRecord {
            id,
            entity_type: entity_type.into(),
            content: content.into(),
        };
        let mut records = self.records.write();
        match records.get_mut(&id) {
            Some(stored) => stored.record = record,
            None => {
                records.insert(
                    id,
                    StoredRecord {
                        record,
                        attributes: RawAttributes::new(),
                    },
                );
            }
        }
    }

    /// Removes a record and its attributes.
    pub fn remove_record(&self, id: EntityId) -> bool {
        self.records.write().remove(&id).is_some()
    }

    /// Replaces all values of `key` with one value.
    ///
    /// Does nothing if the record does not exist.
    pub fn set_attribute(&self, id: EntityId, key: impl Into<String>, value: impl Into<String>) {
        if let Some(stored) = self.records.write().get_mut(&id) {
            stored.attributes.insert(key.into(), vec![value.into()]);
        }
    }

    /// Appends one more value to `key`.
    pub fn add_attribute(&self, id: EntityId, key: impl Into<String>, value: impl Into<String>) {
        if let Some(stored) = self.records.write().get_mut(&id) {
            stored.attributes.entry(key.into()).or_default().push(value.into());
        }
    }

    /// Removes every value of `key`.
    pub fn remove_attribute(&self, id: EntityId, key: &str) {
        if let Some(stored) = self.records.write().get_mut(&id) {
            stored.attributes.remove(key);
        }
    }

    /// Returns the number of records of any type.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl SourceOfTruth for MemorySource {
    fn get_record(&self, id: EntityId) -> CoreResult<Option<SourceRecord>> {
        Ok(self.records.read().get(&id).map(|s| s.record.clone()))
    }

    fn get_attributes(&self, id: EntityId) -> CoreResult<RawAttributes> {
        Ok(self
            .records
            .read()
            .get(&id)
            .map(|s| s.attributes.clone())
            .unwrap_or_default())
    }

    fn list_ids(&self, entity_type: &str, limit: usize, offset: usize) -> CoreResult<Vec<EntityId>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|s| s.record.entity_type == entity_type)
            .skip(offset)
            .take(limit)
            .map(|s| s.record.id)
            .collect())
    }

    fn count(&self, entity_type: &str) -> CoreResult<u64> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|s| s.record.entity_type == entity_type)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> EntityId {
        EntityId::new(n)
    }

    #[test]
    fn pages_are_ascending_and_typed() {
        let source = MemorySource::new();
        for n in [5, 1, 3, 2, 4] {
            source.insert_record(id(n), if n == 3 { "page" } else { "post" }, "");
        }
        assert_eq!(source.count("post").unwrap(), 4);
        assert_eq!(source.list_ids("post", 2, 0).unwrap(), vec![id(1), id(2)]);
        assert_eq!(source.list_ids("post", 2, 2).unwrap(), vec![id(4), id(5)]);
        assert!(source.list_ids("post", 2, 4).unwrap().is_empty());
    }

    #[test]
    fn attribute_editing() {
        let source = MemorySource::new();
        source.insert_record(id(1), "post", "body");
        source.set_attribute(id(1), "color", "red");
        source.add_attribute(id(1), "color", "blue");
        source.set_attribute(id(1), "size", "L");
        source.remove_attribute(id(1), "size");
        let attributes = source.get_attributes(id(1)).unwrap();
        assert_eq!(attributes["color"], vec!["red".to_string(), "blue".to_string()]);
        assert!(!attributes.contains_key("size"));

        source.set_attribute(id(2), "ignored", "x");
        assert!(source.get_attributes(id(2)).unwrap().is_empty());
    }

    #[test]
    fn replacing_a_record_keeps_attributes() {
        let source = MemorySource::new();
        source.insert_record(id(1), "post", "old");
        source.set_attribute(id(1), "a", "1");
        source.insert_record(id(1), "post", "new");
        assert_eq!(source.get_record(id(1)).unwrap().unwrap().content, "new");
        assert_eq!(source.get_attributes(id(1)).unwrap().len(), 1);
        assert!(source.remove_record(id(1)));
        assert!(source.is_empty());
    }
}
