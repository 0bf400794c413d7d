//! Rewriting of host query clauses onto shadow tables.

use crate::driver::Driver;
use crate::predicate::MetaQuery;
use crate::schema::Schema;
use shadowdb_storage::SqlValue;

/// The clause fragments of a host list query.
///
/// `join` and `where_` are appended to as text; `where_` normally starts
/// with `1=1` so that `AND (...)` can always be appended.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryClauses {
    /// Join clauses.
    pub join: String,
    /// Where clause body.
    pub where_: String,
    /// Group-by expression.
    pub groupby: String,
    /// Positional parameters of the placeholders in `join` and `where_`.
    pub params: Vec<SqlValue>,
}

impl QueryClauses {
    /// Creates clauses with an empty join and a `1=1` where.
    #[must_use]
    pub fn new() -> Self {
        Self {
            where_: "1=1".to_string(),
            ..Self::default()
        }
    }
}

/// Rewrites the predicate part of a host query against one shadow table.
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    driver: Driver,
    schema: Schema,
    prefix: String,
    primary_table: String,
    primary_id: String,
}

impl QueryTranslator {
    /// Creates a translator. `primary_table.primary_id` is the host's
    /// record id column the shadow rows are joined to.
    #[must_use]
    pub fn new(
        driver: Driver,
        schema: Schema,
        prefix: impl Into<String>,
        primary_table: impl Into<String>,
        primary_id: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            schema,
            prefix: prefix.into(),
            primary_table: primary_table.into(),
            primary_id: primary_id.into(),
        }
    }

    /// Returns rewritten clauses.
    ///
    /// Queries without a keyed predicate, and queries whose predicates all
    /// compile away, return the clauses unchanged.
    #[must_use]
    pub fn translate(&self, clauses: QueryClauses, query: &MetaQuery) -> QueryClauses {
        if !query.has_keyed_predicate() {
            return clauses;
        }

        let table = self.schema.table_name(&self.prefix);
        let compiled = self.driver.compile(query, &table, "shadow");
        if compiled.condition.is_empty() {
            return clauses;
        }

        let primary = format!("{}.{}", self.primary_table, self.primary_id);
        let mut out = clauses;
        out.join
            .push_str(&format!(" INNER JOIN {table} AS shadow ON {primary} = shadow.entity_id"));
        for join in &compiled.joins {
            out.join.push(' ');
            out.join.push_str(join);
        }
        out.where_.push_str(&format!(" AND ({})", compiled.condition.sql));
        out.params.extend(compiled.condition.params);

        match self.driver {
            Driver::NativeJson(_) => {}
            Driver::LookupTable(_) => out.groupby = primary,
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::backend_with_tables;
    use crate::entity::{Attributes, Entity, EntityId};
    use crate::predicate::MetaPredicate;
    use serde_json::json;

    fn translator(driver: Driver) -> QueryTranslator {
        QueryTranslator::new(driver, Schema::new("product"), "wp_", "wp_posts", "ID")
    }

    #[test]
    fn unkeyed_query_is_a_no_op() {
        let t = translator(Driver::native_json(backend_with_tables("wp_shadow_product")));
        let clauses = QueryClauses::new();
        let query = MetaQuery::new().with(MetaPredicate::default());
        assert_eq!(t.translate(clauses.clone(), &query), clauses);
        assert_eq!(t.translate(clauses.clone(), &MetaQuery::new()), clauses);
    }

    #[test]
    fn query_that_compiles_away_is_a_no_op() {
        let t = translator(Driver::native_json(backend_with_tables("wp_shadow_product")));
        let query = MetaQuery::new().with(MetaPredicate::new("_price", Some(json!(1)), "RLIKE"));
        assert_eq!(t.translate(QueryClauses::new(), &query), QueryClauses::new());
    }

    #[test]
    fn native_rewrite() {
        let t = translator(Driver::native_json(backend_with_tables("wp_shadow_product")));
        let query = MetaQuery::new().with(MetaPredicate::eq("_sku", "A1"));
        let out = t.translate(QueryClauses::new(), &query);
        assert_eq!(
            out.join,
            " INNER JOIN wp_shadow_product AS shadow ON wp_posts.ID = shadow.entity_id"
        );
        assert_eq!(
            out.where_,
            "1=1 AND ((CAST(shadow.attributes->>'$._sku' AS TEXT) = ?))"
        );
        assert_eq!(out.params, vec![SqlValue::Text("A1".into())]);
        assert!(out.groupby.is_empty());
    }

    #[test]
    fn lookup_rewrite_groups_by_primary_id() {
        let t = translator(Driver::lookup_table(backend_with_tables("wp_shadow_product")));
        let query = MetaQuery::new()
            .with(MetaPredicate::eq("_sku", "A1"))
            .with(MetaPredicate::new("_price", Some(json!(5)), ">"));
        let out = t.translate(QueryClauses::new(), &query);
        assert!(out.join.contains("AS l0 ON shadow.entity_id = l0.entity_id"));
        assert!(out.join.contains("AS l1 ON shadow.entity_id = l1.entity_id"));
        assert_eq!(out.groupby, "wp_posts.ID");
        assert_eq!(out.params.len(), 4);
    }

    #[test]
    fn rewritten_clauses_run_against_a_host_table() {
        let backend = backend_with_tables("wp_shadow_product");
        backend
            .execute("CREATE TABLE wp_posts (ID INTEGER PRIMARY KEY, post_title TEXT)", &[])
            .unwrap();
        for id in 1..=3 {
            backend
                .execute("INSERT INTO wp_posts (ID, post_title) VALUES (?, 'p')", &[SqlValue::Integer(id)])
                .unwrap();
        }

        for driver in [Driver::native_json(backend.clone()), Driver::lookup_table(backend.clone())] {
            backend.execute("DELETE FROM wp_shadow_product", &[]).unwrap();
            backend.execute("DELETE FROM wp_shadow_product_lookup", &[]).unwrap();
            for (id, price) in [(1, 5), (2, 50), (3, 500)] {
                let attributes: Attributes = serde_json::from_value(json!({"_price": price})).unwrap();
                driver
                    .insert("wp_shadow_product", &Entity::new(EntityId::new(id), "product", "", attributes))
                    .unwrap();
            }

            let query = MetaQuery::new().with(MetaPredicate::new("_price", Some(json!([10, 100])), "BETWEEN"));
            let out = translator(driver.clone()).translate(QueryClauses::new(), &query);
            let group = if out.groupby.is_empty() {
                String::new()
            } else {
                format!(" GROUP BY {}", out.groupby)
            };
            let sql = format!(
                "SELECT wp_posts.ID FROM wp_posts{} WHERE {}{group} ORDER BY wp_posts.ID",
                out.join, out.where_
            );
            let rows = backend.query(&sql, &out.params).unwrap();
            let ids: Vec<i64> = rows.iter().map(|r| r.get_i64("ID").unwrap()).collect();
            assert_eq!(ids, vec![2], "{}", driver.driver_name());
        }
    }
}
