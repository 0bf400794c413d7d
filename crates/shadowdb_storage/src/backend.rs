//! SQL backend trait definition.

use crate::error::StorageResult;
use crate::value::{Row, SqlValue};
use std::fmt;

/// SQL dialect spoken by a backend.
///
/// Data manipulation statements are written in the subset both dialects
/// share (`->>`, `CAST(... AS DECIMAL)`, `?` placeholders). Only DDL and a
/// handful of functions differ, and those are rendered through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// MySQL or MariaDB.
    MySql,
    /// SQLite with JSON support.
    Sqlite,
}

impl Dialect {
    /// Returns the dialect name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Expression producing a random ordering.
    #[must_use]
    pub const fn random_function(self) -> &'static str {
        match self {
            Dialect::MySql => "RAND()",
            Dialect::Sqlite => "RANDOM()",
        }
    }

    /// Column type used for JSON documents.
    #[must_use]
    pub const fn json_type(self) -> &'static str {
        match self {
            Dialect::MySql => "JSON",
            Dialect::Sqlite => "TEXT",
        }
    }

    /// Column type used for large text payloads.
    #[must_use]
    pub const fn long_text_type(self) -> &'static str {
        match self {
            Dialect::MySql => "LONGTEXT",
            Dialect::Sqlite => "TEXT",
        }
    }

    /// Column definition for a surrogate auto-increment primary key.
    #[must_use]
    pub const fn surrogate_key(self) -> &'static str {
        match self {
            Dialect::MySql => "BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY",
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Column definition for an externally assigned integer primary key.
    #[must_use]
    pub const fn entity_key(self) -> &'static str {
        match self {
            Dialect::MySql => "BIGINT UNSIGNED NOT NULL PRIMARY KEY",
            Dialect::Sqlite => "INTEGER NOT NULL PRIMARY KEY",
        }
    }

    /// Trailing clause for a bookkeeping timestamp that tracks updates.
    #[must_use]
    pub const fn updated_at_default(self) -> &'static str {
        match self {
            Dialect::MySql => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP",
            Dialect::Sqlite => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
        }
    }

    /// Storage keyword for generated columns added after table creation.
    ///
    /// SQLite only allows `VIRTUAL` columns through `ALTER TABLE`.
    #[must_use]
    pub const fn generated_storage(self) -> &'static str {
        match self {
            Dialect::MySql => "STORED",
            Dialect::Sqlite => "VIRTUAL",
        }
    }

    /// Renders a `DROP INDEX` statement.
    #[must_use]
    pub fn drop_index(self, table: &str, index: &str) -> String {
        match self {
            Dialect::MySql => format!("DROP INDEX {index} ON {table}"),
            Dialect::Sqlite => format!("DROP INDEX IF EXISTS {index}"),
        }
    }

    /// Returns an index name that is unique within the database.
    ///
    /// MySQL scopes index names to their table; SQLite shares one namespace
    /// across the whole schema, so the table name is folded in.
    #[must_use]
    pub fn index_name(self, table: &str, name: &str) -> String {
        match self {
            Dialect::MySql => name.to_string(),
            Dialect::Sqlite => format!("{table}_{name}"),
        }
    }

    /// Clause appended to `LIKE` so that a backslash escapes wildcards.
    #[must_use]
    pub const fn like_escape(self) -> &'static str {
        match self {
            Dialect::MySql => "",
            Dialect::Sqlite => " ESCAPE '\\'",
        }
    }

    /// Wraps a JSON extraction so it compares as text.
    ///
    /// MySQL's `->>` already yields text; SQLite yields the JSON scalar's
    /// native type.
    #[must_use]
    pub fn as_text(self, expr: &str) -> String {
        match self {
            Dialect::MySql => expr.to_string(),
            Dialect::Sqlite => format!("CAST({expr} AS TEXT)"),
        }
    }

    /// Renders a `CREATE INDEX` statement over a column list.
    ///
    /// Text columns on MySQL need a prefix length, which callers include in
    /// `columns` themselves.
    #[must_use]
    pub fn create_index(self, table: &str, index: &str, columns: &str) -> String {
        format!("CREATE INDEX {index} ON {table} ({columns})")
    }
}

/// A SQL backend for ShadowDB.
///
/// Backends are **opaque statement executors**. They run the statements the
/// engine hands them and report rows back; all knowledge of shadow tables,
/// lookup rows and JSON layout lives in `shadowdb_core`.
///
/// # Invariants
///
/// - `execute` returns the number of rows the statement changed
/// - `insert` returns the id generated by the statement it ran, read under
///   the same lock as the insert itself
/// - Backends must be `Send + Sync` so one backend can serve a whole context
///
/// # Implementors
///
/// - [`super::SqliteBackend`] - bundled SQLite, file or in-memory
pub trait SqlBackend: Send + Sync + fmt::Debug {
    /// Returns the dialect used for DDL rendering.
    fn dialect(&self) -> Dialect;

    /// Returns the raw server version string (e.g. `8.0.36-log`).
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be queried.
    fn server_version(&self) -> StorageResult<String>;

    /// Returns the server vendor banner (e.g. `10.11.2-MariaDB`).
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be queried.
    fn server_info(&self) -> StorageResult<String>;

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<u64>;

    /// Executes an insert and returns the generated row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn insert(&self, sql: &str, params: &[SqlValue]) -> StorageResult<i64>;

    /// Runs a query and returns all rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Row>>;

    /// Runs a query and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query_row(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Runs a query and returns the first column of the first row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Option<SqlValue>> {
        Ok(self
            .query_row(sql, params)?
            .and_then(|row| row.first().cloned()))
    }

    /// Returns true if a table with this exact name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn table_exists(&self, table: &str) -> StorageResult<bool>;

    /// Returns true if `table` has a column named `column`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn column_exists(&self, table: &str, column: &str) -> StorageResult<bool>;

    /// Returns true if `table` has an index named `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn index_exists(&self, table: &str, index: &str) -> StorageResult<bool>;

    /// Returns the approximate on-disk size of a table in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn table_size_bytes(&self, table: &str) -> StorageResult<u64>;
}
