//! Storage drivers.
//!
//! A [`Driver`] executes entity CRUD and predicate queries against one shadow
//! table. There are exactly two physical layouts:
//!
//! - [`NativeJsonDriver`] queries the JSON document directly with `->>`
//! - [`LookupTableDriver`] keeps a `<table>_lookup` row per scalar attribute
//!   leaf and answers predicates with joins against it
//!
//! Both store the same shadow row:
//!
//! ```text
//! entity_id | entity_type | content | attributes (JSON) | created_at | updated_at
//! ```

mod flatten;
mod lookup;
mod native;
mod selector;

pub use flatten::{flatten_leaves, Leaf};
pub use lookup::LookupTableDriver;
pub use native::NativeJsonDriver;
pub use selector::{DriverPreference, DriverSelector, ServerVersion, VersionPolicy};

use crate::entity::{Attributes, Entity, EntityId};
use crate::error::CoreResult;
use crate::predicate::{CompiledQuery, MetaQuery};
use shadowdb_storage::{Row, SqlBackend, SqlValue, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Columns selected when hydrating entities.
pub(crate) const ENTITY_COLUMNS: &str = "entity_id, entity_type, content, attributes";

/// Maximum number of ids bound in one `IN` list.
const FIND_MANY_CHUNK: usize = 500;

/// The active storage driver.
///
/// Call sites match exhaustively over both variants; there is no third
/// layout.
#[derive(Debug, Clone)]
pub enum Driver {
    /// JSON document queried in place.
    NativeJson(NativeJsonDriver),
    /// JSON document plus an EAV lookup table.
    LookupTable(LookupTableDriver),
}

impl Driver {
    /// Creates a native JSON driver.
    #[must_use]
    pub fn native_json(backend: Arc<dyn SqlBackend>) -> Self {
        Self::NativeJson(NativeJsonDriver::new(backend))
    }

    /// Creates a lookup table driver.
    #[must_use]
    pub fn lookup_table(backend: Arc<dyn SqlBackend>) -> Self {
        Self::LookupTable(LookupTableDriver::new(backend))
    }

    /// Returns the backend this driver executes against.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        match self {
            Self::NativeJson(d) => d.backend(),
            Self::LookupTable(d) => d.backend(),
        }
    }

    /// Inserts a shadow row and returns the generated row id.
    ///
    /// # Errors
    ///
    /// Any backend failure, including a duplicate id, is an error.
    pub fn insert(&self, table: &str, entity: &Entity) -> CoreResult<i64> {
        match self {
            Self::NativeJson(d) => d.insert(table, entity),
            Self::LookupTable(d) => d.insert(table, entity),
        }
    }

    /// Replaces content and attributes of an existing row.
    ///
    /// Returns `false` when no row was affected.
    pub fn update(&self, table: &str, entity: &Entity) -> CoreResult<bool> {
        match self {
            Self::NativeJson(d) => d.update(table, entity),
            Self::LookupTable(d) => d.update(table, entity),
        }
    }

    /// Deletes a row. Returns `false` when nothing was deleted.
    pub fn delete(&self, table: &str, entity_id: EntityId) -> CoreResult<bool> {
        match self {
            Self::NativeJson(d) => d.delete(table, entity_id),
            Self::LookupTable(d) => d.delete(table, entity_id),
        }
    }

    /// Loads one entity.
    pub fn find_by_entity_id(&self, table: &str, entity_id: EntityId) -> CoreResult<Option<Entity>> {
        find_row(self.backend().as_ref(), table, entity_id)
    }

    /// Loads the entities among `ids` that exist. Missing ids are left out.
    pub fn find_many(&self, table: &str, ids: &[EntityId]) -> CoreResult<BTreeMap<EntityId, Entity>> {
        find_many_rows(self.backend().as_ref(), table, ids)
    }

    /// Returns the entities matching a predicate query.
    ///
    /// A query that compiles to no condition returns no rows.
    pub fn find_by_predicate_query(&self, table: &str, query: &MetaQuery) -> CoreResult<Vec<Entity>> {
        match self {
            Self::NativeJson(d) => d.find_by_predicate_query(table, query),
            Self::LookupTable(d) => d.find_by_predicate_query(table, query),
        }
    }

    /// Returns true if a row exists for the id.
    pub fn exists(&self, table: &str, entity_id: EntityId) -> CoreResult<bool> {
        exists_row(self.backend().as_ref(), table, entity_id)
    }

    /// Creates an index over an attribute path.
    pub fn create_index(&self, table: &str, json_path: &str, index_name: &str) -> CoreResult<()> {
        match self {
            Self::NativeJson(d) => d.create_index(table, json_path, index_name),
            Self::LookupTable(d) => d.create_index(table, json_path, index_name),
        }
    }

    /// Drops an index created by [`Driver::create_index`].
    pub fn drop_index(&self, table: &str, index_name: &str) -> CoreResult<()> {
        match self {
            Self::NativeJson(d) => d.drop_index(table, index_name),
            Self::LookupTable(d) => d.drop_index(table, index_name),
        }
    }

    /// Compiles a predicate query against `table`, whose rows are reachable
    /// under `owner_alias`.
    #[must_use]
    pub fn compile(&self, query: &MetaQuery, table: &str, owner_alias: &str) -> CompiledQuery {
        match self {
            Self::NativeJson(d) => d.compile(query, owner_alias),
            Self::LookupTable(d) => d.compile(query, table, owner_alias),
        }
    }

    /// Returns true if the backend is queried through native JSON functions.
    #[must_use]
    pub const fn supports_native_json(&self) -> bool {
        match self {
            Self::NativeJson(_) => true,
            Self::LookupTable(_) => false,
        }
    }

    /// Returns a diagnostic name for the driver.
    #[must_use]
    pub const fn driver_name(&self) -> &'static str {
        match self {
            Self::NativeJson(_) => "NativeJson",
            Self::LookupTable(_) => "LookupTable",
        }
    }
}

/// Builds an entity from a selected row.
///
/// A row whose attribute document fails to parse hydrates with no attributes.
pub(crate) fn hydrate(row: &Row) -> CoreResult<Entity> {
    let raw_id = row.get_i64("entity_id")?;
    let entity_id =
        EntityId::from_i64(raw_id).ok_or_else(|| StorageError::conversion("entity_id", "unsigned integer"))?;
    let entity_type = row.get_string("entity_type")?;
    let content = row.get_string("content")?;
    let document = row.get_opt_string("attributes")?;

    let attributes = match document.as_deref() {
        None | Some("") => Attributes::new(),
        Some(text) => match serde_json::from_str::<Attributes>(text) {
            Ok(attributes) => attributes,
            Err(err) => {
                tracing::warn!(%entity_id, error = %err, "unreadable attribute document");
                Attributes::new()
            }
        },
    };

    Ok(Entity::new(entity_id, entity_type, content, attributes))
}

pub(crate) fn insert_row(backend: &dyn SqlBackend, table: &str, entity: &Entity) -> CoreResult<i64> {
    let sql = format!("INSERT INTO {table} ({ENTITY_COLUMNS}) VALUES (?, ?, ?, ?)");
    let id = backend.insert(
        &sql,
        &[
            SqlValue::try_from(entity.id())?,
            entity.entity_type().into(),
            entity.content().into(),
            entity.attributes_json()?.into(),
        ],
    )?;
    Ok(id)
}

pub(crate) fn update_row(backend: &dyn SqlBackend, table: &str, entity: &Entity) -> CoreResult<bool> {
    let sql = format!(
        "UPDATE {table} SET content = ?, attributes = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE entity_id = ?"
    );
    let changed = backend.execute(
        &sql,
        &[
            entity.content().into(),
            entity.attributes_json()?.into(),
            SqlValue::try_from(entity.id())?,
        ],
    )?;
    Ok(changed > 0)
}

pub(crate) fn delete_row(backend: &dyn SqlBackend, table: &str, entity_id: EntityId) -> CoreResult<bool> {
    let changed = backend.execute(
        &format!("DELETE FROM {table} WHERE entity_id = ?"),
        &[SqlValue::try_from(entity_id)?],
    )?;
    Ok(changed > 0)
}

fn find_row(backend: &dyn SqlBackend, table: &str, entity_id: EntityId) -> CoreResult<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM {table} WHERE entity_id = ? LIMIT 1");
    backend
        .query_row(&sql, &[SqlValue::try_from(entity_id)?])?
        .map(|row| hydrate(&row))
        .transpose()
}

fn find_many_rows(
    backend: &dyn SqlBackend,
    table: &str,
    ids: &[EntityId],
) -> CoreResult<BTreeMap<EntityId, Entity>> {
    let mut found = BTreeMap::new();
    for chunk in ids.chunks(FIND_MANY_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM {table} WHERE entity_id IN ({placeholders})");
        let params = chunk
            .iter()
            .map(|id| SqlValue::try_from(*id))
            .collect::<CoreResult<Vec<_>>>()?;
        for row in backend.query(&sql, &params)? {
            let entity = hydrate(&row)?;
            found.insert(entity.id(), entity);
        }
    }
    Ok(found)
}

fn exists_row(backend: &dyn SqlBackend, table: &str, entity_id: EntityId) -> CoreResult<bool> {
    let row = backend.query_row(
        &format!("SELECT 1 FROM {table} WHERE entity_id = ? LIMIT 1"),
        &[SqlValue::try_from(entity_id)?],
    )?;
    Ok(row.is_some())
}

pub(crate) fn query_entities(backend: &dyn SqlBackend, sql: &str, params: &[SqlValue]) -> CoreResult<Vec<Entity>> {
    backend.query(sql, params)?.iter().map(hydrate).collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::backend_with_tables;
    use super::*;
    use crate::predicate::MetaPredicate;
    use serde_json::json;

    fn product(id: u64, price: &str, color: &str) -> Entity {
        let attributes: Attributes = serde_json::from_value(json!({
            "_price": price,
            "color": color,
        }))
        .unwrap();
        Entity::new(EntityId::new(id), "product", format!("content {id}"), attributes)
    }

    fn both_drivers() -> Vec<Driver> {
        vec![
            Driver::native_json(backend_with_tables("t")),
            Driver::lookup_table(backend_with_tables("t")),
        ]
    }

    #[test]
    fn names_and_capabilities() {
        let backend = backend_with_tables("t");
        let native = Driver::native_json(backend.clone());
        let lookup = Driver::lookup_table(backend);
        assert_eq!(native.driver_name(), "NativeJson");
        assert!(native.supports_native_json());
        assert_eq!(lookup.driver_name(), "LookupTable");
        assert!(!lookup.supports_native_json());
    }

    #[test]
    fn crud_round_trip() {
        for driver in both_drivers() {
            let entity = product(5, "10", "red");
            driver.insert("t", &entity).unwrap();
            assert!(driver.exists("t", EntityId::new(5)).unwrap());
            assert_eq!(driver.find_by_entity_id("t", EntityId::new(5)).unwrap(), Some(entity.clone()));

            let changed = entity.with_attribute("color", json!("blue"));
            assert!(driver.update("t", &changed).unwrap());
            assert_eq!(driver.find_by_entity_id("t", EntityId::new(5)).unwrap(), Some(changed));

            assert!(driver.delete("t", EntityId::new(5)).unwrap());
            assert!(!driver.exists("t", EntityId::new(5)).unwrap());
            assert!(!driver.delete("t", EntityId::new(5)).unwrap());
        }
    }

    #[test]
    fn update_of_missing_row_is_false() {
        for driver in both_drivers() {
            assert!(!driver.update("t", &product(9, "1", "red")).unwrap());
        }
    }

    #[test]
    fn duplicate_insert_is_an_error() {
        for driver in both_drivers() {
            driver.insert("t", &product(1, "1", "red")).unwrap();
            assert!(driver.insert("t", &product(1, "1", "red")).is_err());
        }
    }

    #[test]
    fn find_many_returns_present_ids_only() {
        for driver in both_drivers() {
            driver.insert("t", &product(2, "5", "red")).unwrap();
            let found = driver
                .find_many("t", &[EntityId::new(1), EntityId::new(2), EntityId::new(3)])
                .unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[&EntityId::new(2)].content(), "content 2");
        }
    }

    #[test]
    fn predicate_queries_agree() {
        for driver in both_drivers() {
            driver.insert("t", &product(1, "5", "red")).unwrap();
            driver.insert("t", &product(2, "15", "blue")).unwrap();
            driver.insert("t", &product(3, "25", "red")).unwrap();

            let ids = |query: MetaQuery| -> Vec<u64> {
                driver
                    .find_by_predicate_query("t", &query)
                    .unwrap()
                    .iter()
                    .map(|e| e.id().as_u64())
                    .collect()
            };

            let red = MetaQuery::new().with(MetaPredicate::eq("color", "red"));
            assert_eq!(ids(red), vec![1, 3], "{}", driver.driver_name());

            let pricey = MetaQuery::new().with(MetaPredicate::new("_price", Some(json!(10)), ">"));
            assert_eq!(ids(pricey), vec![2, 3], "{}", driver.driver_name());

            let red_and_pricey = MetaQuery::new()
                .with(MetaPredicate::eq("color", "red"))
                .with(MetaPredicate::new("_price", Some(json!("20")), ">="));
            assert_eq!(ids(red_and_pricey), vec![3], "{}", driver.driver_name());

            let blue_or_cheap = MetaQuery::new()
                .relation("or")
                .with(MetaPredicate::eq("color", "blue"))
                .with(MetaPredicate::new("_price", Some(json!(6)), "<"));
            assert_eq!(ids(blue_or_cheap), vec![1, 2], "{}", driver.driver_name());

            let between = MetaQuery::new().with(MetaPredicate::new("_price", Some(json!([10, 20])), "BETWEEN"));
            assert_eq!(ids(between), vec![2], "{}", driver.driver_name());

            let within = MetaQuery::new().with(MetaPredicate::new("color", Some(json!(["blue", "green"])), "IN"));
            assert_eq!(ids(within), vec![2], "{}", driver.driver_name());

            let like = MetaQuery::new().with(MetaPredicate::new("color", Some(json!("lu")), "LIKE"));
            assert_eq!(ids(like), vec![2], "{}", driver.driver_name());
        }
    }

    #[test]
    fn oversized_ids_never_alias_the_largest_row() {
        let largest = EntityId::new(i64::MAX as u64);
        let oversized = EntityId::new(u64::MAX);
        for driver in both_drivers() {
            driver
                .insert("t", &Entity::new(largest, "product", "kept", Attributes::new()))
                .unwrap();
            let clash = Entity::new(oversized, "product", "clobber", Attributes::new());

            assert!(driver.insert("t", &clash).is_err());
            assert!(driver.update("t", &clash).is_err());
            assert!(driver.delete("t", oversized).is_err());
            assert!(driver.find_by_entity_id("t", oversized).is_err());
            assert!(driver.find_many("t", &[largest, oversized]).is_err());
            assert_eq!(
                driver.find_by_entity_id("t", largest).unwrap().map(|e| e.content().to_string()),
                Some("kept".to_string()),
                "{}",
                driver.driver_name()
            );
        }
    }

    #[test]
    fn disjunctions_agree_for_bare_entities() {
        for driver in both_drivers() {
            driver
                .insert("t", &Entity::new(EntityId::new(1), "product", "", Attributes::new()))
                .unwrap();
            driver.insert("t", &product(2, "15", "blue")).unwrap();
            driver.insert("t", &product(3, "25", "red")).unwrap();

            let ids = |query: MetaQuery| -> Vec<u64> {
                driver
                    .find_by_predicate_query("t", &query)
                    .unwrap()
                    .iter()
                    .map(|e| e.id().as_u64())
                    .collect()
            };

            let unsold_or_red = MetaQuery::new()
                .relation("OR")
                .with(MetaPredicate::new("_sale", None, "NOT EXISTS"))
                .with(MetaPredicate::eq("color", "red"));
            assert_eq!(ids(unsold_or_red), vec![1, 2, 3], "{}", driver.driver_name());

            let nothing_excluded_or_red = MetaQuery::new()
                .relation("OR")
                .with(MetaPredicate::new("color", Some(json!([])), "NOT IN"))
                .with(MetaPredicate::eq("color", "red"));
            assert_eq!(ids(nothing_excluded_or_red), vec![1, 2, 3], "{}", driver.driver_name());

            let nothing_excluded = MetaQuery::new().with(MetaPredicate::new("size", Some(json!([])), "NOT IN"));
            assert_eq!(ids(nothing_excluded), vec![1, 2, 3], "{}", driver.driver_name());

            let blue_or_red = MetaQuery::new()
                .relation("OR")
                .with(MetaPredicate::eq("color", "blue"))
                .with(MetaPredicate::eq("color", "red"));
            assert_eq!(ids(blue_or_red), vec![2, 3], "{}", driver.driver_name());
        }
    }

    #[test]
    fn existence_predicates() {
        for driver in both_drivers() {
            driver.insert("t", &product(1, "5", "red")).unwrap();
            driver
                .insert("t", &product(2, "5", "red").with_attribute("_sale", json!("yes")))
                .unwrap();

            let exists = MetaQuery::new().with(MetaPredicate::exists("_sale"));
            let found = driver.find_by_predicate_query("t", &exists).unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].id(), EntityId::new(2));

            let missing = MetaQuery::new().with(MetaPredicate::new("_sale", None, "NOT EXISTS"));
            let found = driver.find_by_predicate_query("t", &missing).unwrap();
            assert_eq!(found.len(), 1, "{}", driver.driver_name());
            assert_eq!(found[0].id(), EntityId::new(1));
        }
    }

    #[test]
    fn unknown_comparator_yields_nothing() {
        for driver in both_drivers() {
            driver.insert("t", &product(1, "5", "red")).unwrap();
            let query = MetaQuery::new().with(MetaPredicate::new("color", Some(json!("red")), "REGEXP"));
            assert!(driver.find_by_predicate_query("t", &query).unwrap().is_empty());
        }
    }

    #[test]
    fn multi_valued_attributes_do_not_duplicate_rows() {
        for driver in both_drivers() {
            let entity = product(1, "5", "red").with_attribute("tags", json!(["a", "b", "c"]));
            driver.insert("t", &entity).unwrap();
            let query = MetaQuery::new()
                .relation("OR")
                .with(MetaPredicate::new("tags", Some(json!(["a", "b"])), "IN"))
                .with(MetaPredicate::eq("color", "red"));
            let found = driver.find_by_predicate_query("t", &query).unwrap();
            assert_eq!(found.len(), 1, "{}", driver.driver_name());
        }
    }

    #[test]
    fn corrupt_attribute_document_hydrates_empty() {
        let backend = backend_with_tables("t");
        backend
            .execute(
                "INSERT INTO t (entity_id, entity_type, content, attributes) VALUES (1, 'post', '', 'not json')",
                &[],
            )
            .unwrap();
        let driver = Driver::native_json(backend);
        let entity = driver.find_by_entity_id("t", EntityId::new(1)).unwrap().unwrap();
        assert!(entity.attributes().is_empty());
    }
}
