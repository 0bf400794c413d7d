//! Bound parameters and result rows.

use crate::error::{StorageError, StorageResult};
use std::fmt;

/// A single SQL value, used both for bound parameters and for result columns.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// A 64-bit signed integer.
    Integer(i64),
    /// A double precision float.
    Real(f64),
    /// A text value.
    Text(String),
}

impl SqlValue {
    /// Returns true if this is SQL `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Returns the value as an integer, coercing numeric text.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }

    /// Returns the value rendered as text. `NULL` has no text form.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Integer(i) => Some(i.to_string()),
            SqlValue::Real(f) => Some(f.to_string()),
            SqlValue::Null => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
            SqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        SqlValue::Integer(value as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row: column names paired with their values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Creates a row from `(name, value)` pairs.
    #[must_use]
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Returns the value of the named column, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Returns the value of the first column.
    #[must_use]
    pub fn first(&self) -> Option<&SqlValue> {
        self.columns.first().map(|(_, value)| value)
    }

    /// Reads a required integer column.
    pub fn get_i64(&self, column: &str) -> StorageResult<i64> {
        self.get(column)
            .ok_or_else(|| StorageError::MissingColumn(column.to_string()))?
            .as_i64()
            .ok_or_else(|| StorageError::conversion(column, "integer"))
    }

    /// Reads a text column; `NULL` becomes an empty string.
    pub fn get_string(&self, column: &str) -> StorageResult<String> {
        let value = self
            .get(column)
            .ok_or_else(|| StorageError::MissingColumn(column.to_string()))?;
        Ok(value.as_text().unwrap_or_default())
    }

    /// Reads a nullable text column.
    pub fn get_opt_string(&self, column: &str) -> StorageResult<Option<String>> {
        let value = self
            .get(column)
            .ok_or_else(|| StorageError::MissingColumn(column.to_string()))?;
        Ok(value.as_text())
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coercion() {
        assert_eq!(SqlValue::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(SqlValue::Real(3.9).as_i64(), Some(3));
        assert_eq!(SqlValue::Null.as_i64(), None);
        assert_eq!(SqlValue::Text("abc".into()).as_i64(), None);
    }

    #[test]
    fn row_accessors() {
        let row = Row::new(vec![
            ("entity_id".into(), SqlValue::Integer(7)),
            ("content".into(), SqlValue::Null),
        ]);
        assert_eq!(row.get_i64("entity_id").unwrap(), 7);
        assert_eq!(row.get_string("content").unwrap(), "");
        assert_eq!(row.get_opt_string("content").unwrap(), None);
        assert!(matches!(
            row.get_i64("missing"),
            Err(StorageError::MissingColumn(_))
        ));
    }

    #[test]
    fn display_escapes_quotes() {
        assert_eq!(SqlValue::Text("it's".into()).to_string(), "'it''s'");
    }

    #[test]
    fn option_conversion() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }
}
