//! Shadow table lifecycle.

use crate::context::ShadowContext;
use crate::driver::Driver;
use crate::error::CoreResult;
use crate::predicate::{json_path, sql_literal};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use shadowdb_storage::Dialect;

/// Row count and footprint of one shadow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableStats {
    /// Whether the table exists.
    pub exists: bool,
    /// Number of shadow rows.
    pub count: u64,
    /// Data plus index size, lookup table included.
    pub size_bytes: u64,
}

/// Creates, drops and inspects shadow tables.
#[derive(Debug, Clone, Copy)]
pub struct TableManager<'a> {
    ctx: &'a ShadowContext,
}

impl<'a> TableManager<'a> {
    pub(crate) const fn new(ctx: &'a ShadowContext) -> Self {
        Self { ctx }
    }

    /// Creates the shadow table of a schema, and everything the active
    /// driver needs next to it. Existing objects are left alone.
    pub fn create(&self, schema: &Schema) -> CoreResult<()> {
        let backend = self.ctx.backend();
        let dialect = backend.dialect();
        let driver = self.ctx.driver()?;
        let table = self.table(schema);

        backend.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 entity_id {}, \
                 entity_type VARCHAR(20) NOT NULL, \
                 content {}, \
                 attributes {}, \
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP, \
                 updated_at {})",
                dialect.entity_key(),
                dialect.long_text_type(),
                dialect.json_type(),
                dialect.updated_at_default()
            ),
            &[],
        )?;
        self.ensure_index(&table, "idx_entity_type", "entity_type")?;

        match &driver {
            Driver::LookupTable(_) => self.create_lookup_table(&table, dialect)?,
            Driver::NativeJson(_) => {
                for (column, path) in schema.virtual_columns() {
                    self.add_virtual_column(&table, column, path)?;
                }
            }
        }

        for field in schema.indexed_fields() {
            driver.create_index(&table, &json_path(field), &field_index_name(field))?;
        }

        self.ctx.remember_table(schema.entity_type(), true);
        tracing::info!(table = %table, driver = driver.driver_name(), "created shadow table");
        Ok(())
    }

    /// Drops the shadow table of a type and its lookup table.
    pub fn drop(&self, entity_type: &str) -> CoreResult<()> {
        let backend = self.ctx.backend();
        let schema = self.ctx.schema(entity_type);
        let prefix = &self.ctx.config().table_prefix;

        backend.execute(
            &format!("DROP TABLE IF EXISTS {}", schema.lookup_table_name(prefix)),
            &[],
        )?;
        backend.execute(&format!("DROP TABLE IF EXISTS {}", schema.table_name(prefix)), &[])?;

        self.ctx.remember_table(entity_type, false);
        tracing::info!(entity_type, "dropped shadow table");
        Ok(())
    }

    /// Checks the backend for the shadow table of a type, refreshing the
    /// context's memo.
    pub fn exists(&self, entity_type: &str) -> CoreResult<bool> {
        let table = self.table(&self.ctx.schema(entity_type));
        let exists = self.ctx.backend().table_exists(&table)?;
        self.ctx.remember_table(entity_type, exists);
        Ok(exists)
    }

    /// Returns row count and size of a type's shadow storage.
    pub fn stats(&self, entity_type: &str) -> CoreResult<TableStats> {
        let backend = self.ctx.backend();
        let schema = self.ctx.schema(entity_type);
        let table = self.table(&schema);
        if !backend.table_exists(&table)? {
            return Ok(TableStats::default());
        }

        let count = backend
            .query_scalar(&format!("SELECT COUNT(*) FROM {table}"), &[])?
            .and_then(|v| v.as_i64())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0);

        let mut size_bytes = backend.table_size_bytes(&table)?;
        let lookup = schema.lookup_table_name(&self.ctx.config().table_prefix);
        if backend.table_exists(&lookup)? {
            size_bytes += backend.table_size_bytes(&lookup)?;
        }

        Ok(TableStats {
            exists: true,
            count,
            size_bytes,
        })
    }

    /// Adds a generated column extracting `path` from the attribute
    /// document, with an index on it. Returns `false` when the column
    /// already exists or the active driver has no JSON functions.
    pub fn add_virtual_column(&self, table: &str, column: &str, path: &str) -> CoreResult<bool> {
        let backend = self.ctx.backend();
        if !self.ctx.driver()?.supports_native_json() || backend.column_exists(table, column)? {
            return Ok(false);
        }
        let dialect = backend.dialect();
        backend.execute(
            &format!(
                "ALTER TABLE {table} ADD COLUMN {column} VARCHAR(255) \
                 GENERATED ALWAYS AS (attributes->>{}) {}",
                sql_literal(path),
                dialect.generated_storage()
            ),
            &[],
        )?;
        self.ensure_index(table, &format!("idx_{column}"), column)?;
        tracing::debug!(table, column, path, "added virtual column");
        Ok(true)
    }

    fn create_lookup_table(&self, table: &str, dialect: Dialect) -> CoreResult<()> {
        let lookup = format!("{table}_lookup");
        let entity_column = match dialect {
            Dialect::MySql => "BIGINT UNSIGNED NOT NULL",
            Dialect::Sqlite => "INTEGER NOT NULL",
        };
        self.ctx.backend().execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {lookup} (\
                 id {}, \
                 entity_id {entity_column}, \
                 attribute_key VARCHAR(255) NOT NULL, \
                 attribute_value {})",
                dialect.surrogate_key(),
                dialect.long_text_type()
            ),
            &[],
        )?;

        let (key, key_value) = match dialect {
            Dialect::MySql => ("attribute_key(191)", "attribute_key(191), attribute_value(191)"),
            Dialect::Sqlite => ("attribute_key", "attribute_key, attribute_value"),
        };
        self.ensure_index(&lookup, "idx_entity", "entity_id")?;
        self.ensure_index(&lookup, "idx_key", key)?;
        self.ensure_index(&lookup, "idx_key_value", key_value)?;
        Ok(())
    }

    fn ensure_index(&self, table: &str, name: &str, columns: &str) -> CoreResult<()> {
        let backend = self.ctx.backend();
        let dialect = backend.dialect();
        let index = dialect.index_name(table, name);
        if !backend.index_exists(table, &index)? {
            backend.execute(&dialect.create_index(table, &index, columns), &[])?;
        }
        Ok(())
    }

    fn table(&self, schema: &Schema) -> String {
        schema.table_name(&self.ctx.config().table_prefix)
    }
}

/// Index name for an indexed attribute field.
fn field_index_name(field: &str) -> String {
    let normalized: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("idx_{}", normalized.trim_start_matches('_'))
}
