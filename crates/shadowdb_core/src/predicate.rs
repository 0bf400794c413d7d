//! Structured attribute predicates.
//!
//! A [`MetaQuery`] is a list of `{key, value, compare}` predicates joined by
//! one [`Relation`]. Drivers compile it into SQL; anything they cannot make
//! sense of (an unknown comparator, a predicate without a key) is skipped
//! rather than failing the whole query.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shadowdb_storage::SqlValue;

/// Comparison operator of one predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
    /// `LIKE`, matching the value anywhere in the attribute.
    Like,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `EXISTS`
    Exists,
    /// `NOT EXISTS`
    NotExists,
    /// `BETWEEN`, numeric and inclusive.
    Between,
}

impl Comparator {
    /// Parses a comparator, case-insensitively. Unknown operators yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        Some(match normalized.as_str() {
            "=" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Gte,
            "<=" => Self::Lte,
            "LIKE" => Self::Like,
            "IN" => Self::In,
            "NOT IN" => Self::NotIn,
            "EXISTS" => Self::Exists,
            "NOT EXISTS" => Self::NotExists,
            "BETWEEN" => Self::Between,
            _ => return None,
        })
    }

    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Exists => "EXISTS",
            Self::NotExists => "NOT EXISTS",
            Self::Between => "BETWEEN",
        }
    }

    /// Returns true for comparators that cast the attribute to a number.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Gt | Self::Lt | Self::Gte | Self::Lte | Self::Between
        )
    }
}

/// How predicates are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Relation {
    /// Every predicate must hold.
    #[default]
    And,
    /// Any predicate may hold.
    Or,
}

impl Relation {
    /// Parses a relation. Anything other than `AND`/`OR` falls back to `AND`.
    #[must_use]
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(|r| r.trim().to_ascii_uppercase()).as_deref() {
            Some("OR") => Self::Or,
            _ => Self::And,
        }
    }

    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// One keyed attribute constraint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaPredicate {
    /// Attribute key. Predicates without a key are ignored.
    #[serde(default)]
    pub key: Option<String>,
    /// Comparison value. Lists are used by `IN`, `NOT IN` and `BETWEEN`.
    #[serde(default)]
    pub value: Option<Value>,
    /// Comparator spelling; `=` when absent.
    #[serde(default)]
    pub compare: Option<String>,
}

impl MetaPredicate {
    /// Creates a predicate.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Option<Value>, compare: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value,
            compare: Some(compare.into()),
        }
    }

    /// Creates an equality predicate.
    #[must_use]
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, Some(value.into()), "=")
    }

    /// Creates an existence predicate.
    #[must_use]
    pub fn exists(key: impl Into<String>) -> Self {
        Self::new(key, None, "EXISTS")
    }

    /// Returns the comparator, defaulting to `=` when none was given.
    ///
    /// `None` means the comparator is not recognised.
    #[must_use]
    pub fn comparator(&self) -> Option<Comparator> {
        match &self.compare {
            Some(compare) => Comparator::parse(compare),
            None => Some(Comparator::Eq),
        }
    }
}

/// A list of predicates plus the relation joining them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaQuery {
    /// `AND` or `OR`; anything else means `AND`.
    #[serde(default)]
    pub relation: Option<String>,
    /// The predicates.
    #[serde(default)]
    pub predicates: Vec<MetaPredicate>,
}

impl MetaQuery {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relation.
    #[must_use]
    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Adds a predicate.
    #[must_use]
    pub fn with(mut self, predicate: MetaPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Returns the effective relation.
    #[must_use]
    pub fn effective_relation(&self) -> Relation {
        Relation::parse(self.relation.as_deref())
    }

    /// Returns true if at least one predicate carries a key.
    #[must_use]
    pub fn has_keyed_predicate(&self) -> bool {
        self.predicates.iter().any(|p| p.key.is_some())
    }
}

/// A SQL condition with its positional parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFragment {
    /// The SQL text, using `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    /// Returns true if the fragment has no SQL.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Output of compiling a [`MetaQuery`] for one driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    /// Join clauses the condition depends on, in order.
    pub joins: Vec<String>,
    /// The combined condition.
    pub condition: SqlFragment,
}

/// Renders a JSON path literal for an attribute key.
///
/// Plain keys use `$.key`; anything else is quoted as `$."key"`.
#[must_use]
pub fn json_path(key: &str) -> String {
    let plain = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        format!("$.{key}")
    } else {
        format!("$.\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Quotes a string as a SQL literal.
#[must_use]
pub fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Renders a JSON value as the text it is compared against.
///
/// Strings are used as-is, booleans become `1`/`0`, null becomes the empty
/// string and containers are rendered as JSON.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Renders a JSON value as a number. Non-numeric text is `0`.
#[must_use]
pub fn value_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Escapes `LIKE` wildcards with a backslash.
#[must_use]
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Returns the values of an `IN`-style predicate. Scalars become one-item lists.
pub(crate) fn value_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    }
}

/// Returns the bounds of a `BETWEEN` predicate.
///
/// Only lists are accepted; a missing second bound is `0`.
pub(crate) fn between_bounds(value: Option<&Value>) -> Option<(f64, f64)> {
    match value {
        Some(Value::Array(items)) => {
            let low = items.first().map_or(0.0, value_number);
            let high = items.get(1).map_or(0.0, value_number);
            Some((low, high))
        }
        _ => None,
    }
}

/// Builds the value condition shared by both drivers.
///
/// `text` is an expression yielding the attribute as text and `raw` one
/// yielding it in a form that can be cast to a number. Returns `None` when
/// the comparator has nothing to say about the value (existence checks, a
/// missing value, a malformed `BETWEEN`).
pub(crate) fn value_condition(
    comparator: Comparator,
    value: Option<&Value>,
    text: &str,
    raw: &str,
    like_escape: &str,
) -> Option<SqlFragment> {
    let decimal = |op: &str, v: &Value| SqlFragment {
        sql: format!("CAST({raw} AS DECIMAL(20,6)) {op} ?"),
        params: vec![SqlValue::Real(value_number(v))],
    };

    let fragment = match comparator {
        Comparator::Exists | Comparator::NotExists => return None,
        Comparator::In | Comparator::NotIn => {
            let items = value_list(value);
            if items.is_empty() {
                // an empty list matches nothing, and excludes nothing
                let sql = if comparator == Comparator::In { "1 = 0" } else { "1 = 1" };
                return Some(SqlFragment {
                    sql: sql.to_string(),
                    params: Vec::new(),
                });
            }
            let placeholders = vec!["?"; items.len()].join(", ");
            SqlFragment {
                sql: format!("{text} {} ({placeholders})", comparator.as_str()),
                params: items.iter().map(|v| SqlValue::Text(value_text(v))).collect(),
            }
        }
        Comparator::Between => {
            let (low, high) = between_bounds(value)?;
            SqlFragment {
                sql: format!("CAST({raw} AS DECIMAL(20,6)) BETWEEN ? AND ?"),
                params: vec![SqlValue::Real(low), SqlValue::Real(high)],
            }
        }
        Comparator::Eq | Comparator::NotEq => {
            let v = value?;
            SqlFragment {
                sql: format!("{text} {} ?", comparator.as_str()),
                params: vec![SqlValue::Text(value_text(v))],
            }
        }
        Comparator::Gt | Comparator::Lt | Comparator::Gte | Comparator::Lte => {
            decimal(comparator.as_str(), value?)
        }
        Comparator::Like => {
            let v = value?;
            SqlFragment {
                sql: format!("{text} LIKE ?{like_escape}"),
                params: vec![SqlValue::Text(format!("%{}%", escape_like(&value_text(v))))],
            }
        }
    };
    Some(fragment)
}

/// Joins compiled conditions with a relation, wrapping each in parentheses.
pub(crate) fn combine(parts: Vec<SqlFragment>, relation: Relation) -> SqlFragment {
    let mut sql = Vec::with_capacity(parts.len());
    let mut params = Vec::new();
    for part in parts {
        sql.push(format!("({})", part.sql));
        params.extend(part.params);
    }
    SqlFragment {
        sql: sql.join(&format!(" {} ", relation.as_str())),
        params,
    }
}
