//! Native JSON driver.

use super::{delete_row, insert_row, query_entities, update_row, ENTITY_COLUMNS};
use crate::entity::{Entity, EntityId};
use crate::error::CoreResult;
use crate::predicate::{
    combine, json_path, sql_literal, value_condition, Comparator, CompiledQuery, MetaQuery, SqlFragment,
};
use shadowdb_storage::SqlBackend;
use std::fmt;
use std::sync::Arc;

/// Driver for backends that can query JSON documents in place.
///
/// Predicates compile to `attributes->>'$.key'` extractions, numeric
/// comparators cast through `DECIMAL(20,6)` and existence checks test the
/// raw `->` extraction for `NULL`. Indexes are generated columns over a
/// JSON path.
#[derive(Clone)]
pub struct NativeJsonDriver {
    backend: Arc<dyn SqlBackend>,
}

impl fmt::Debug for NativeJsonDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeJsonDriver")
            .field("dialect", &self.backend.dialect())
            .finish()
    }
}

impl NativeJsonDriver {
    /// Creates the driver.
    #[must_use]
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }

    pub(crate) fn insert(&self, table: &str, entity: &Entity) -> CoreResult<i64> {
        insert_row(self.backend.as_ref(), table, entity)
    }

    pub(crate) fn update(&self, table: &str, entity: &Entity) -> CoreResult<bool> {
        update_row(self.backend.as_ref(), table, entity)
    }

    pub(crate) fn delete(&self, table: &str, entity_id: EntityId) -> CoreResult<bool> {
        delete_row(self.backend.as_ref(), table, entity_id)
    }

    pub(crate) fn find_by_predicate_query(&self, table: &str, query: &MetaQuery) -> CoreResult<Vec<Entity>> {
        let compiled = self.compile(query, "s");
        if compiled.condition.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM {table} AS s WHERE {} ORDER BY s.entity_id",
            qualified_columns("s"),
            compiled.condition.sql
        );
        query_entities(self.backend.as_ref(), &sql, &compiled.condition.params)
    }

    pub(crate) fn compile(&self, query: &MetaQuery, owner_alias: &str) -> CompiledQuery {
        let dialect = self.backend.dialect();
        let column = format!("{owner_alias}.attributes");
        let mut parts = Vec::new();

        for predicate in &query.predicates {
            let Some(key) = predicate.key.as_deref() else {
                continue;
            };
            let Some(comparator) = predicate.comparator() else {
                tracing::debug!(key, compare = ?predicate.compare, "skipping unknown comparator");
                continue;
            };

            let path = sql_literal(&json_path(key));
            let document = format!("({column}->{path})");
            let raw = format!("{column}->>{path}");

            let part = match comparator {
                Comparator::Exists => exists_fragment(&document, true),
                Comparator::NotExists => exists_fragment(&document, false),
                _ if predicate.value.is_none() => exists_fragment(&document, true),
                _ => match value_condition(
                    comparator,
                    predicate.value.as_ref(),
                    &dialect.as_text(&raw),
                    &raw,
                    dialect.like_escape(),
                ) {
                    Some(fragment) => fragment,
                    None => continue,
                },
            };
            parts.push(part);
        }

        if parts.is_empty() {
            return CompiledQuery::default();
        }

        CompiledQuery {
            joins: Vec::new(),
            condition: combine(parts, query.effective_relation()),
        }
    }

    pub(crate) fn create_index(&self, table: &str, json_path: &str, index_name: &str) -> CoreResult<()> {
        let dialect = self.backend.dialect();
        let column = format!("{index_name}_idx");

        if !self.backend.column_exists(table, &column)? {
            let sql = format!(
                "ALTER TABLE {table} ADD COLUMN {column} VARCHAR(255) \
                 GENERATED ALWAYS AS (attributes->>{}) {}",
                sql_literal(json_path),
                dialect.generated_storage()
            );
            self.backend.execute(&sql, &[])?;
        }

        let index = dialect.index_name(table, index_name);
        if !self.backend.index_exists(table, &index)? {
            self.backend
                .execute(&dialect.create_index(table, &index, &column), &[])?;
        }
        tracing::debug!(table, index = %index, path = json_path, "created json index");
        Ok(())
    }

    pub(crate) fn drop_index(&self, table: &str, index_name: &str) -> CoreResult<()> {
        let dialect = self.backend.dialect();
        let index = dialect.index_name(table, index_name);
        if self.backend.index_exists(table, &index)? {
            self.backend.execute(&dialect.drop_index(table, &index), &[])?;
        }
        Ok(())
    }
}

fn exists_fragment(document: &str, present: bool) -> SqlFragment {
    let test = if present { "IS NOT NULL" } else { "IS NULL" };
    SqlFragment {
        sql: format!("{document} {test}"),
        params: Vec::new(),
    }
}

pub(crate) fn qualified_columns(alias: &str) -> String {
    ENTITY_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}
