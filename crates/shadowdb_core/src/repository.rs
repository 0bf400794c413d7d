//! Shadow repository.

use crate::driver::Driver;
use crate::entity::{Entity, EntityId};
use crate::error::CoreResult;
use crate::predicate::{MetaPredicate, MetaQuery};
use crate::schema::Schema;
use serde_json::Value;
use std::collections::BTreeMap;

/// Entity access for one shadow table.
///
/// The table name is derived from the schema once, at construction.
#[derive(Debug, Clone)]
pub struct ShadowRepository {
    driver: Driver,
    schema: Schema,
    table: String,
}

impl ShadowRepository {
    /// Creates a repository over `<prefix>shadow_<type>`.
    #[must_use]
    pub fn new(driver: Driver, schema: Schema, prefix: &str) -> Self {
        let table = schema.table_name(prefix);
        Self {
            driver,
            schema,
            table,
        }
    }

    /// Returns the physical table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the driver.
    #[must_use]
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Inserts or updates an entity.
    ///
    /// This is an existence check followed by a write, not an atomic upsert:
    /// two concurrent first saves of the same id can race, and the loser
    /// fails on the primary key.
    pub fn save(&self, entity: &Entity) -> CoreResult<()> {
        if self.driver.exists(&self.table, entity.id())? {
            self.driver.update(&self.table, entity)?;
        } else {
            self.driver.insert(&self.table, entity)?;
        }
        Ok(())
    }

    /// Loads an entity.
    pub fn find(&self, id: EntityId) -> CoreResult<Option<Entity>> {
        self.driver.find_by_entity_id(&self.table, id)
    }

    /// Deletes an entity. Returns `false` when it was not stored.
    pub fn remove(&self, id: EntityId) -> CoreResult<bool> {
        self.driver.delete(&self.table, id)
    }

    /// Returns true if the entity is stored.
    pub fn exists(&self, id: EntityId) -> CoreResult<bool> {
        self.driver.exists(&self.table, id)
    }

    /// Returns the entities whose attribute `key` equals `value`.
    pub fn find_by_meta(&self, key: &str, value: impl Into<Value>) -> CoreResult<Vec<Entity>> {
        let query = MetaQuery::new().with(MetaPredicate::eq(key, value));
        self.find_by_query(&query)
    }

    /// Returns the entities matching a predicate query.
    pub fn find_by_query(&self, query: &MetaQuery) -> CoreResult<Vec<Entity>> {
        self.driver.find_by_predicate_query(&self.table, query)
    }

    /// Loads every stored entity among `ids`.
    pub fn find_many(&self, ids: &[EntityId]) -> CoreResult<BTreeMap<EntityId, Entity>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        self.driver.find_many(&self.table, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::backend_with_tables;
    use crate::entity::Attributes;
    use serde_json::json;

    fn repository() -> ShadowRepository {
        let driver = Driver::native_json(backend_with_tables("wp_shadow_product"));
        ShadowRepository::new(driver, Schema::new("product"), "wp_")
    }

    fn product(id: u64, sku: &str) -> Entity {
        let attributes: Attributes = serde_json::from_value(json!({"_sku": sku})).unwrap();
        Entity::new(EntityId::new(id), "product", "", attributes)
    }

    #[test]
    fn table_comes_from_schema() {
        assert_eq!(repository().table(), "wp_shadow_product");
    }

    #[test]
    fn save_inserts_then_updates() {
        let repo = repository();
        repo.save(&product(1, "A")).unwrap();
        repo.save(&product(1, "B")).unwrap();
        let found = repo.find(EntityId::new(1)).unwrap().unwrap();
        assert_eq!(found.attribute("_sku"), Some(&json!("B")));
    }

    #[test]
    fn round_trip_preserves_entity() {
        let repo = repository();
        let entity = product(7, "X").with_attribute("nested", json!({"a": [1, 2]}));
        repo.save(&entity).unwrap();
        assert_eq!(repo.find(EntityId::new(7)).unwrap(), Some(entity));
    }

    #[test]
    fn find_by_meta_is_equality() {
        let repo = repository();
        repo.save(&product(1, "A")).unwrap();
        repo.save(&product(2, "B")).unwrap();
        let found = repo.find_by_meta("_sku", "B").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), EntityId::new(2));
    }

    #[test]
    fn find_many_skips_missing_ids() {
        let repo = repository();
        repo.save(&product(2, "B")).unwrap();
        let found = repo
            .find_many(&[EntityId::new(1), EntityId::new(2), EntityId::new(3)])
            .unwrap();
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![EntityId::new(2)]);
        assert!(repo.find_many(&[]).unwrap().is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let repo = repository();
        repo.save(&product(1, "A")).unwrap();
        assert!(repo.remove(EntityId::new(1)).unwrap());
        assert!(!repo.remove(EntityId::new(1)).unwrap());
        assert!(!repo.exists(EntityId::new(1)).unwrap());
    }
}
