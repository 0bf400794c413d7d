//! Typed index columns over shadow attributes.
//!
//! Each preset adds a generated column `meta_<key>` (or `<key>` for keys
//! without a leading underscore) extracting one attribute with a SQL type,
//! plus a B-tree index `idx_<column>` on it.

use crate::error::CoreResult;
use crate::predicate::{json_path, sql_literal};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use shadowdb_storage::SqlBackend;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One typed index column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPreset {
    /// Attribute key extracted.
    pub attribute_key: String,
    /// SQL column type, e.g. `DECIMAL(20,6)`.
    pub sql_type: String,
}

impl IndexPreset {
    /// Creates a preset.
    #[must_use]
    pub fn new(attribute_key: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            attribute_key: attribute_key.into(),
            sql_type: sql_type.into(),
        }
    }

    /// Returns the generated column name.
    #[must_use]
    pub fn column(&self) -> String {
        match self.attribute_key.strip_prefix('_') {
            Some(rest) => format!("meta_{rest}"),
            None => self.attribute_key.clone(),
        }
    }

    /// Returns the unscoped index name.
    #[must_use]
    pub fn index_name(&self) -> String {
        format!("idx_{}", self.column())
    }

    fn expression(&self) -> String {
        let extract = format!("attributes->>{}", sql_literal(&json_path(&self.attribute_key)));
        let upper = self.sql_type.to_ascii_uppercase();
        if upper.starts_with("DECIMAL") || upper.starts_with("INT") {
            format!("CAST({extract} AS {})", self.sql_type)
        } else {
            extract
        }
    }
}

/// The stock presets for WooCommerce-shaped content.
#[must_use]
pub fn default_presets() -> BTreeMap<String, Vec<IndexPreset>> {
    let product = vec![
        IndexPreset::new("_price", "DECIMAL(20,6)"),
        IndexPreset::new("_sku", "VARCHAR(100)"),
        IndexPreset::new("_stock", "INT"),
        IndexPreset::new("_stock_status", "VARCHAR(20)"),
        IndexPreset::new("_regular_price", "DECIMAL(20,6)"),
    ];
    let variation = product[..4].to_vec();

    let mut presets = BTreeMap::new();
    presets.insert("product".to_string(), product);
    presets.insert("product_variation".to_string(), variation);
    presets.insert("post".to_string(), vec![IndexPreset::new("views_count", "INT")]);
    presets
}

/// State of one preset column, as reported by [`IndexManager::index_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Attribute key.
    pub attribute_key: String,
    /// Generated column name.
    pub column: String,
    /// Whether the column exists.
    pub exists: bool,
    /// Whether the index exists.
    pub indexed: bool,
}

/// Creates and drops preset index columns.
pub struct IndexManager {
    backend: Arc<dyn SqlBackend>,
    prefix: String,
    presets: BTreeMap<String, Vec<IndexPreset>>,
}

impl fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexManager")
            .field("prefix", &self.prefix)
            .field("types", &self.presets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IndexManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        backend: Arc<dyn SqlBackend>,
        prefix: impl Into<String>,
        presets: BTreeMap<String, Vec<IndexPreset>>,
    ) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            presets,
        }
    }

    /// Returns the presets of a type.
    #[must_use]
    pub fn presets(&self, entity_type: &str) -> &[IndexPreset] {
        self.presets.get(entity_type).map_or(&[][..], Vec::as_slice)
    }

    /// Creates every preset column of a type. Returns how many were created.
    ///
    /// A type without a shadow table gets nothing.
    pub fn create_indexes(&self, entity_type: &str) -> CoreResult<usize> {
        let table = self.table(entity_type);
        if !self.backend.table_exists(&table)? {
            tracing::warn!(entity_type, "no shadow table, skipping index creation");
            return Ok(0);
        }
        let mut created = 0;
        for preset in self.presets(entity_type) {
            if self.create_index(&table, preset)? {
                created += 1;
            }
        }
        tracing::info!(entity_type, created, "created preset indexes");
        Ok(created)
    }

    /// Adds one preset column and its index. Returns `false` if both
    /// already existed.
    pub fn create_index(&self, table: &str, preset: &IndexPreset) -> CoreResult<bool> {
        let dialect = self.backend.dialect();
        let column = preset.column();
        let mut changed = false;

        if !self.backend.column_exists(table, &column)? {
            let sql = format!(
                "ALTER TABLE {table} ADD COLUMN {column} {} GENERATED ALWAYS AS ({}) {}",
                preset.sql_type,
                preset.expression(),
                dialect.generated_storage()
            );
            self.backend.execute(&sql, &[])?;
            changed = true;
        }

        let index = dialect.index_name(table, &preset.index_name());
        if !self.backend.index_exists(table, &index)? {
            self.backend
                .execute(&dialect.create_index(table, &index, &column), &[])?;
            changed = true;
        }
        Ok(changed)
    }

    /// Drops every preset column of a type. Returns how many were dropped.
    pub fn drop_indexes(&self, entity_type: &str) -> CoreResult<usize> {
        let table = self.table(entity_type);
        if !self.backend.table_exists(&table)? {
            return Ok(0);
        }
        let mut dropped = 0;
        for preset in self.presets(entity_type) {
            if self.drop_index(&table, preset)? {
                dropped += 1;
            }
        }
        tracing::info!(entity_type, dropped, "dropped preset indexes");
        Ok(dropped)
    }

    /// Drops one preset index and its column. Returns `false` if the column
    /// did not exist.
    pub fn drop_index(&self, table: &str, preset: &IndexPreset) -> CoreResult<bool> {
        let dialect = self.backend.dialect();
        let column = preset.column();
        if !self.backend.column_exists(table, &column)? {
            return Ok(false);
        }
        let index = dialect.index_name(table, &preset.index_name());
        if self.backend.index_exists(table, &index)? {
            self.backend.execute(&dialect.drop_index(table, &index), &[])?;
        }
        self.backend
            .execute(&format!("ALTER TABLE {table} DROP COLUMN {column}"), &[])?;
        Ok(true)
    }

    /// Reports column and index presence for each preset of a type.
    pub fn index_status(&self, entity_type: &str) -> CoreResult<Vec<IndexStatus>> {
        let dialect = self.backend.dialect();
        let table = self.table(entity_type);
        let mut status = Vec::new();
        for preset in self.presets(entity_type) {
            let column = preset.column();
            let index = dialect.index_name(&table, &preset.index_name());
            status.push(IndexStatus {
                attribute_key: preset.attribute_key.clone(),
                exists: self.backend.column_exists(&table, &column)?,
                indexed: self.backend.index_exists(&table, &index)?,
                column,
            });
        }
        Ok(status)
    }

    /// Returns true if the type has presets and all of them are in place.
    pub fn has_indexes(&self, entity_type: &str) -> CoreResult<bool> {
        let status = self.index_status(entity_type)?;
        Ok(!status.is_empty() && status.iter().all(|s| s.exists && s.indexed))
    }

    fn table(&self, entity_type: &str) -> String {
        Schema::new(entity_type).table_name(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::backend_with_tables;

    fn manager() -> (Arc<dyn SqlBackend>, IndexManager) {
        let backend = backend_with_tables("wp_shadow_product");
        let manager = IndexManager::new(backend.clone(), "wp_", default_presets());
        (backend, manager)
    }

    #[test]
    fn preset_names() {
        let price = IndexPreset::new("_price", "DECIMAL(20,6)");
        assert_eq!(price.column(), "meta_price");
        assert_eq!(price.index_name(), "idx_meta_price");
        assert_eq!(
            price.expression(),
            "CAST(attributes->>'$._price' AS DECIMAL(20,6))"
        );
        let views = IndexPreset::new("views_count", "INT");
        assert_eq!(views.column(), "views_count");
        assert_eq!(IndexPreset::new("_sku", "VARCHAR(100)").expression(), "attributes->>'$._sku'");
    }

    #[test]
    fn stock_presets() {
        let presets = default_presets();
        assert_eq!(presets["product"].len(), 5);
        assert_eq!(presets["product_variation"].len(), 4);
        assert_eq!(presets["post"][0].attribute_key, "views_count");
    }

    #[test]
    fn create_status_drop() {
        let (backend, manager) = manager();
        assert!(!manager.has_indexes("product").unwrap());
        assert_eq!(manager.create_indexes("product").unwrap(), 5);
        assert_eq!(manager.create_indexes("product").unwrap(), 0);
        assert!(manager.has_indexes("product").unwrap());

        backend
            .execute(
                "INSERT INTO wp_shadow_product (entity_id, entity_type, content, attributes) \
                 VALUES (1, 'product', '', '{\"_price\":\"12.5\",\"_stock\":\"3\"}')",
                &[],
            )
            .unwrap();
        let price = backend
            .query_scalar("SELECT meta_price FROM wp_shadow_product WHERE meta_stock = 3", &[])
            .unwrap();
        assert!(price.is_some());

        assert_eq!(manager.drop_indexes("product").unwrap(), 5);
        let status = manager.index_status("product").unwrap();
        assert!(status.iter().all(|s| !s.exists && !s.indexed));
    }

    #[test]
    fn types_without_presets_or_tables() {
        let (_, manager) = manager();
        assert_eq!(manager.create_indexes("page").unwrap(), 0);
        assert!(!manager.has_indexes("page").unwrap());
        assert_eq!(manager.create_indexes("post").unwrap(), 0);
    }
}
