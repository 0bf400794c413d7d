//! SQLite backend built on bundled `rusqlite`.

use crate::backend::{Dialect, SqlBackend};
use crate::error::StorageResult;
use crate::value::{Row, SqlValue};
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(i),
            Value::Real(f) => SqlValue::Real(f),
            Value::Text(s) => SqlValue::Text(s),
            Value::Blob(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

/// A SQLite backend.
///
/// Uses the bundled SQLite build, so the JSON functions and `->>` operator
/// are available regardless of the system library.
///
/// # Thread Safety
///
/// The connection sits behind a mutex. Every trait call takes the lock once,
/// which keeps `insert` and its generated id consistent.
///
/// # Example
///
/// ```rust
/// use shadowdb_storage::{SqlBackend, SqliteBackend, SqlValue};
///
/// let backend = SqliteBackend::open_in_memory().unwrap();
/// backend.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[]).unwrap();
/// let id = backend.insert("INSERT INTO t (v) VALUES (?)", &["x".into()]).unwrap();
/// assert_eq!(id, 1);
/// ```
#[derive(Debug)]
pub struct SqliteBackend {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        tracing::debug!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Opens a database file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Returns the database path, or `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl SqlBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn server_version(&self) -> StorageResult<String> {
        let conn = self.conn.lock();
        let version: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
        Ok(version)
    }

    fn server_info(&self) -> StorageResult<String> {
        Ok(format!("SQLite {}", self.server_version()?))
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<u64> {
        tracing::trace!(sql, params = params.len(), "execute");
        let conn = self.conn.lock();
        let changed = conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed as u64)
    }

    fn insert(&self, sql: &str, params: &[SqlValue]) -> StorageResult<i64> {
        tracing::trace!(sql, params = params.len(), "insert");
        let conn = self.conn.lock();
        conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Row>> {
        tracing::trace!(sql, params = params.len(), "query");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut columns = Vec::with_capacity(names.len());
            for (idx, name) in names.iter().enumerate() {
                let value: Value = row.get(idx)?;
                columns.push((name.clone(), SqlValue::from(value)));
            }
            out.push(Row::new(columns));
        }
        Ok(out)
    }

    fn table_exists(&self, table: &str) -> StorageResult<bool> {
        let row = self.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[table.into()],
        )?;
        Ok(row.is_some())
    }

    fn column_exists(&self, table: &str, column: &str) -> StorageResult<bool> {
        // table_xinfo also lists generated columns
        let row = self.query_row(
            "SELECT 1 FROM pragma_table_xinfo(?) WHERE name = ?",
            &[table.into(), column.into()],
        )?;
        Ok(row.is_some())
    }

    fn index_exists(&self, table: &str, index: &str) -> StorageResult<bool> {
        let row = self.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND name = ?",
            &[table.into(), index.into()],
        )?;
        Ok(row.is_some())
    }

    fn table_size_bytes(&self, table: &str) -> StorageResult<u64> {
        if !self.table_exists(table)? {
            return Ok(0);
        }

        let columns = self.query("SELECT name FROM pragma_table_info(?)", &[table.into()])?;
        if columns.is_empty() {
            return Ok(0);
        }

        let mut terms = Vec::with_capacity(columns.len());
        for column in &columns {
            let name = column.get_string("name")?;
            terms.push(format!("COALESCE(LENGTH({}), 0)", quote_ident(&name)));
        }
        let sql = format!(
            "SELECT COALESCE(SUM({}), 0) FROM {}",
            terms.join(" + "),
            quote_ident(table)
        );

        let size = self
            .query_scalar(&sql, &[])?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(size.max(0) as u64)
    }
}
