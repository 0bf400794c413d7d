//! Shadow schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Describes how one entity type is shadowed.
///
/// Schemas are immutable values. Table names are derived from the entity
/// type alone, so two schemas for the same type always address the same
/// physical table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    entity_type: String,
    #[serde(default)]
    indexed_fields: Vec<String>,
    #[serde(default)]
    virtual_columns: BTreeMap<String, String>,
}

impl Schema {
    /// Creates a schema with no indexed fields or virtual columns.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            indexed_fields: Vec::new(),
            virtual_columns: BTreeMap::new(),
        }
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the indexed attribute keys, in insertion order.
    #[must_use]
    pub fn indexed_fields(&self) -> &[String] {
        &self.indexed_fields
    }

    /// Returns the virtual columns as column name to JSON path.
    #[must_use]
    pub fn virtual_columns(&self) -> &BTreeMap<String, String> {
        &self.virtual_columns
    }

    /// Returns the shadow table name for this schema.
    ///
    /// Every character of the entity type outside `[A-Za-z0-9]` becomes `_`.
    #[must_use]
    pub fn table_name(&self, prefix: &str) -> String {
        format!("{prefix}shadow_{}", normalize_type(&self.entity_type))
    }

    /// Returns the lookup table name for this schema.
    #[must_use]
    pub fn lookup_table_name(&self, prefix: &str) -> String {
        format!("{}_lookup", self.table_name(prefix))
    }

    /// Returns true if `field` is indexed.
    #[must_use]
    pub fn has_indexed_field(&self, field: &str) -> bool {
        self.indexed_fields.iter().any(|f| f == field)
    }

    /// Returns true if a virtual column named `column` is declared.
    #[must_use]
    pub fn has_virtual_column(&self, column: &str) -> bool {
        self.virtual_columns.contains_key(column)
    }

    /// Returns a schema that also indexes `field`.
    ///
    /// Adding a field that is already indexed returns an equal schema.
    #[must_use]
    pub fn with_indexed_field(&self, field: impl Into<String>) -> Self {
        let field = field.into();
        let mut next = self.clone();
        if !next.has_indexed_field(&field) {
            next.indexed_fields.push(field);
        }
        next
    }

    /// Returns a schema with an additional virtual column.
    #[must_use]
    pub fn with_virtual_column(&self, column: impl Into<String>, json_path: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.virtual_columns.insert(column.into(), json_path.into());
        next
    }
}

fn normalize_type(entity_type: &str) -> String {
    entity_type
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn table_names() {
        let schema = Schema::new("product");
        assert_eq!(schema.table_name("wp_"), "wp_shadow_product");
        assert_eq!(schema.lookup_table_name("wp_"), "wp_shadow_product_lookup");
    }

    #[test]
    fn separators_are_normalized() {
        let schema = Schema::new("product-variation");
        assert_eq!(schema.table_name("wp_"), "wp_shadow_product_variation");
        assert_eq!(Schema::new("a.b c").table_name(""), "shadow_a_b_c");
    }

    #[test]
    fn with_indexed_field_is_idempotent() {
        let schema = Schema::new("product").with_indexed_field("_price");
        let again = schema.with_indexed_field("_price");
        assert_eq!(schema, again);
        assert_eq!(again.indexed_fields(), ["_price".to_string()]);
    }

    #[test]
    fn with_virtual_column_leaves_original() {
        let schema = Schema::new("product");
        let next = schema.with_virtual_column("price", "$._price");
        assert!(next.has_virtual_column("price"));
        assert!(!schema.has_virtual_column("price"));
    }

    #[test]
    fn serde_layout() {
        let schema = Schema::new("post").with_indexed_field("views_count");
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["entity_type"], "post");
        assert_eq!(json["indexed_fields"][0], "views_count");

        let back: Schema = serde_json::from_str(r#"{"entity_type":"page"}"#).unwrap();
        assert_eq!(back, Schema::new("page"));
    }

    proptest! {
        #[test]
        fn table_name_is_deterministic_and_safe(entity_type in ".{0,40}", prefix in "[a-z]{0,4}_") {
            let a = Schema::new(entity_type.clone()).table_name(&prefix);
            let b = Schema::new(entity_type).with_indexed_field("x").table_name(&prefix);
            prop_assert_eq!(&a, &b);
            let suffix = &a[prefix.len()..];
            prop_assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }
}
