//! Source of truth read from SQL tables.

use super::{json_or_text, php, RawAttributes, SourceOfTruth, SourceRecord};
use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shadowdb_storage::{SqlBackend, SqlValue};
use std::fmt;
use std::sync::Arc;

/// Table and column names of a records table plus an attribute table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLayout {
    /// Records table.
    pub records_table: String,
    /// Record id column.
    pub id_column: String,
    /// Record type column.
    pub type_column: String,
    /// Record content column.
    pub content_column: String,
    /// Status column, if records carry one.
    pub status_column: Option<String>,
    /// Statuses left out of listing and counting.
    #[serde(default)]
    pub excluded_statuses: Vec<String>,
    /// Attribute table.
    pub attributes_table: String,
    /// Column referencing the record id.
    pub owner_column: String,
    /// Attribute key column.
    pub key_column: String,
    /// Attribute value column.
    pub value_column: String,
    /// Column giving attribute values a stable order.
    pub order_column: String,
    /// Attribute values may be PHP `serialize()` output.
    #[serde(default)]
    pub php_serialized: bool,
}

impl SourceLayout {
    /// The WordPress `posts`/`postmeta` layout.
    ///
    /// Meta values in PHP serialized form are decoded into JSON; serialized
    /// objects stay strings.
    #[must_use]
    pub fn wordpress(prefix: &str) -> Self {
        Self {
            records_table: format!("{prefix}posts"),
            id_column: "ID".to_string(),
            type_column: "post_type".to_string(),
            content_column: "post_content".to_string(),
            status_column: Some("post_status".to_string()),
            excluded_statuses: vec!["auto-draft".to_string()],
            attributes_table: format!("{prefix}postmeta"),
            owner_column: "post_id".to_string(),
            key_column: "meta_key".to_string(),
            value_column: "meta_value".to_string(),
            order_column: "meta_id".to_string(),
            php_serialized: true,
        }
    }

    fn listing_filter(&self) -> (String, Vec<SqlValue>) {
        let mut sql = format!("{} = ?", self.type_column);
        let mut params = Vec::new();
        if let Some(status) = &self.status_column {
            for excluded in &self.excluded_statuses {
                sql.push_str(&format!(" AND {status} != ?"));
                params.push(SqlValue::Text(excluded.clone()));
            }
        }
        (sql, params)
    }
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self::wordpress("wp_")
    }
}

/// A [`SourceOfTruth`] over SQL tables described by a [`SourceLayout`].
pub struct SqlSource {
    backend: Arc<dyn SqlBackend>,
    layout: SourceLayout,
}

impl fmt::Debug for SqlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlSource")
            .field("records_table", &self.layout.records_table)
            .field("attributes_table", &self.layout.attributes_table)
            .finish()
    }
}

impl SqlSource {
    /// Creates a source.
    #[must_use]
    pub fn new(backend: Arc<dyn SqlBackend>, layout: SourceLayout) -> Self {
        Self { backend, layout }
    }

    /// Returns the layout.
    #[must_use]
    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }
}

impl SourceOfTruth for SqlSource {
    fn get_record(&self, id: EntityId) -> CoreResult<Option<SourceRecord>> {
        let l = &self.layout;
        let sql = format!(
            "SELECT {} AS record_type, {} AS record_content FROM {} WHERE {} = ? LIMIT 1",
            l.type_column, l.content_column, l.records_table, l.id_column
        );
        let Some(row) = self.backend.query_row(&sql, &[SqlValue::try_from(id)?])? else {
            return Ok(None);
        };
        Ok(Some(SourceRecord {
            id,
            entity_type: row.get_string("record_type")?,
            content: row.get_opt_string("record_content")?.unwrap_or_default(),
        }))
    }

    fn get_attributes(&self, id: EntityId) -> CoreResult<RawAttributes> {
        let l = &self.layout;
        let sql = format!(
            "SELECT {} AS attr_key, {} AS attr_value FROM {} WHERE {} = ? ORDER BY {}",
            l.key_column, l.value_column, l.attributes_table, l.owner_column, l.order_column
        );
        let mut attributes = RawAttributes::new();
        for row in self.backend.query(&sql, &[SqlValue::try_from(id)?])? {
            let Some(key) = row.get_opt_string("attr_key")? else {
                continue;
            };
            let value = row.get_opt_string("attr_value")?.unwrap_or_default();
            attributes.entry(key).or_default().push(value);
        }
        Ok(attributes)
    }

    fn list_ids(&self, entity_type: &str, limit: usize, offset: usize) -> CoreResult<Vec<EntityId>> {
        let l = &self.layout;
        let (filter, filter_params) = l.listing_filter();
        let sql = format!(
            "SELECT {id} AS record_id FROM {} WHERE {filter} ORDER BY {id} LIMIT ? OFFSET ?",
            l.records_table,
            id = l.id_column
        );
        let mut params = vec![SqlValue::Text(entity_type.to_string())];
        params.extend(filter_params);
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        params.push(SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        self.backend
            .query(&sql, &params)?
            .iter()
            .map(|row| {
                let raw = row.get_i64("record_id")?;
                EntityId::from_i64(raw).ok_or_else(|| CoreError::source(format!("negative record id {raw}")))
            })
            .collect()
    }

    fn count(&self, entity_type: &str) -> CoreResult<u64> {
        let l = &self.layout;
        let (filter, filter_params) = l.listing_filter();
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {filter}", l.records_table);
        let mut params = vec![SqlValue::Text(entity_type.to_string())];
        params.extend(filter_params);
        let count = self
            .backend
            .query_scalar(&sql, &params)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    fn deserialize(&self, raw: &str) -> Value {
        if self.layout.php_serialized {
            if let Some(value) = php::unserialize(raw) {
                return value;
            }
        }
        json_or_text(raw)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use shadowdb_storage::{SqlBackend, SqlValue};

    /// Creates the WordPress source tables with the `wp_` prefix.
    pub fn create_wordpress_tables(backend: &dyn SqlBackend) {
        backend
            .execute(
                "CREATE TABLE wp_posts (ID INTEGER PRIMARY KEY, post_type VARCHAR(20), \
                 post_status VARCHAR(20) DEFAULT 'publish', post_content TEXT)",
                &[],
            )
            .unwrap();
        backend
            .execute(
                "CREATE TABLE wp_postmeta (meta_id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 post_id INTEGER, meta_key VARCHAR(255), meta_value TEXT)",
                &[],
            )
            .unwrap();
    }

    /// Inserts one post.
    pub fn insert_post(backend: &dyn SqlBackend, id: i64, post_type: &str, status: &str, content: &str) {
        backend
            .execute(
                "INSERT INTO wp_posts (ID, post_type, post_status, post_content) VALUES (?, ?, ?, ?)",
                &[SqlValue::Integer(id), post_type.into(), status.into(), content.into()],
            )
            .unwrap();
    }

    /// Inserts one meta row.
    pub fn insert_meta(backend: &dyn SqlBackend, id: i64, key: &str, value: &str) {
        backend
            .execute(
                "INSERT INTO wp_postmeta (post_id, meta_key, meta_value) VALUES (?, ?, ?)",
                &[SqlValue::Integer(id), key.into(), value.into()],
            )
            .unwrap();
    }
}
