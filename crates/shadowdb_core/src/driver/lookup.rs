//! Lookup table driver.

use super::flatten::flatten_leaves;
use super::native::qualified_columns;
use super::{delete_row, insert_row, query_entities, update_row};
use crate::entity::{Entity, EntityId};
use crate::error::CoreResult;
use crate::predicate::{
    combine, value_condition, value_list, Comparator, CompiledQuery, MetaQuery, Relation, SqlFragment,
};
use shadowdb_storage::{Dialect, SqlBackend, SqlValue};
use std::fmt;
use std::sync::Arc;

/// Driver for backends without usable JSON querying.
///
/// Besides the shadow row, every scalar attribute leaf is written to
/// `<table>_lookup` as `(entity_id, attribute_key, attribute_value)`. The
/// lookup rows of an entity are deleted and rewritten in full on every
/// insert and update.
///
/// Each keyed predicate joins its own lookup alias (`l0`, `l1`, ...), so
/// two predicates never constrain the same lookup row. Under `OR` the
/// aliases are left joins, so an entity missing one key can still match
/// another predicate. Multi-valued attributes produce several matching
/// rows, hence `SELECT DISTINCT`.
/// Numeric comparators cast the text value, so coercion of non-numeric text
/// follows the backend's rules.
#[derive(Clone)]
pub struct LookupTableDriver {
    backend: Arc<dyn SqlBackend>,
}

impl fmt::Debug for LookupTableDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupTableDriver")
            .field("dialect", &self.backend.dialect())
            .finish()
    }
}

impl LookupTableDriver {
    /// Creates the driver.
    #[must_use]
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }

    pub(crate) fn insert(&self, table: &str, entity: &Entity) -> CoreResult<i64> {
        let id = insert_row(self.backend.as_ref(), table, entity)?;
        self.rewrite_lookup(table, entity)?;
        Ok(id)
    }

    pub(crate) fn update(&self, table: &str, entity: &Entity) -> CoreResult<bool> {
        let updated = update_row(self.backend.as_ref(), table, entity)?;
        if updated {
            self.rewrite_lookup(table, entity)?;
        }
        Ok(updated)
    }

    pub(crate) fn delete(&self, table: &str, entity_id: EntityId) -> CoreResult<bool> {
        self.backend.execute(
            &format!("DELETE FROM {} WHERE entity_id = ?", lookup_table(table)),
            &[SqlValue::try_from(entity_id)?],
        )?;
        delete_row(self.backend.as_ref(), table, entity_id)
    }

    pub(crate) fn find_by_predicate_query(&self, table: &str, query: &MetaQuery) -> CoreResult<Vec<Entity>> {
        let compiled = self.compile(query, table, "s");
        if compiled.condition.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT {} FROM {table} AS s {} WHERE {} ORDER BY s.entity_id",
            qualified_columns("s"),
            compiled.joins.join(" "),
            compiled.condition.sql
        );
        query_entities(self.backend.as_ref(), &sql, &compiled.condition.params)
    }

    pub(crate) fn compile(&self, query: &MetaQuery, table: &str, owner_alias: &str) -> CompiledQuery {
        let dialect = self.backend.dialect();
        let lookup = lookup_table(table);
        let relation = query.effective_relation();
        let join = match relation {
            Relation::And => "INNER JOIN",
            Relation::Or => "LEFT JOIN",
        };
        let mut joins = Vec::new();
        let mut parts = Vec::new();
        let mut next_alias = 0usize;

        for predicate in &query.predicates {
            let Some(key) = predicate.key.as_deref() else {
                continue;
            };
            let Some(comparator) = predicate.comparator() else {
                tracing::debug!(key, compare = ?predicate.compare, "skipping unknown comparator");
                continue;
            };
            let alias = format!("l{next_alias}");

            // an empty IN list holds for no entity and an empty NOT IN for all
            if matches!(comparator, Comparator::In | Comparator::NotIn)
                && predicate.value.is_some()
                && value_list(predicate.value.as_ref()).is_empty()
            {
                if let Some(constant) =
                    value_condition(comparator, predicate.value.as_ref(), "", "", dialect.like_escape())
                {
                    parts.push(constant);
                }
                continue;
            }

            let key_param = SqlValue::Text(key.to_string());

            if comparator == Comparator::NotExists {
                parts.push(SqlFragment {
                    sql: format!(
                        "NOT EXISTS (SELECT 1 FROM {lookup} AS {alias} \
                         WHERE {alias}.entity_id = {owner_alias}.entity_id AND {alias}.attribute_key = ?)"
                    ),
                    params: vec![key_param],
                });
                next_alias += 1;
                continue;
            }

            let mut fragment = SqlFragment {
                sql: format!("{alias}.attribute_key = ?"),
                params: vec![key_param],
            };

            if comparator != Comparator::Exists && predicate.value.is_some() {
                let value_column = format!("{alias}.attribute_value");
                let Some(condition) = value_condition(
                    comparator,
                    predicate.value.as_ref(),
                    &value_column,
                    &value_column,
                    dialect.like_escape(),
                ) else {
                    continue;
                };
                fragment.sql = format!("{} AND {}", fragment.sql, condition.sql);
                fragment.params.extend(condition.params);
            }

            joins.push(format!(
                "{join} {lookup} AS {alias} ON {owner_alias}.entity_id = {alias}.entity_id"
            ));
            parts.push(fragment);
            next_alias += 1;
        }

        if parts.is_empty() {
            return CompiledQuery::default();
        }

        CompiledQuery {
            joins,
            condition: combine(parts, relation),
        }
    }

    pub(crate) fn create_index(&self, table: &str, _json_path: &str, index_name: &str) -> CoreResult<()> {
        let dialect = self.backend.dialect();
        let lookup = lookup_table(table);
        let value_column = match dialect {
            Dialect::MySql => "attribute_key(191), attribute_value(191)",
            Dialect::Sqlite => "attribute_key, attribute_value",
        };
        let key_column = match dialect {
            Dialect::MySql => "attribute_key(191)",
            Dialect::Sqlite => "attribute_key",
        };

        for (suffix, columns) in [("key", key_column), ("value", value_column)] {
            let index = dialect.index_name(&lookup, &format!("{index_name}_{suffix}"));
            if !self.backend.index_exists(&lookup, &index)? {
                self.backend
                    .execute(&dialect.create_index(&lookup, &index, columns), &[])?;
            }
        }
        tracing::debug!(table = %lookup, index = index_name, "created lookup index");
        Ok(())
    }

    pub(crate) fn drop_index(&self, table: &str, index_name: &str) -> CoreResult<()> {
        let dialect = self.backend.dialect();
        let lookup = lookup_table(table);
        for suffix in ["key", "value"] {
            let index = dialect.index_name(&lookup, &format!("{index_name}_{suffix}"));
            if self.backend.index_exists(&lookup, &index)? {
                self.backend.execute(&dialect.drop_index(&lookup, &index), &[])?;
            }
        }
        Ok(())
    }

    fn rewrite_lookup(&self, table: &str, entity: &Entity) -> CoreResult<()> {
        let lookup = lookup_table(table);
        self.backend.execute(
            &format!("DELETE FROM {lookup} WHERE entity_id = ?"),
            &[SqlValue::try_from(entity.id())?],
        )?;

        let sql = format!("INSERT INTO {lookup} (entity_id, attribute_key, attribute_value) VALUES (?, ?, ?)");
        for (key, value) in flatten_leaves(entity.attributes()) {
            self.backend
                .execute(&sql, &[SqlValue::try_from(entity.id())?, key.into(), value.into()])?;
        }
        Ok(())
    }
}

fn lookup_table(table: &str) -> String {
    format!("{table}_lookup")
}
