//! Durable key/value records.
//!
//! Migration state, integrity reports and settings are stored as JSON
//! documents under well-known names.

use crate::error::CoreResult;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shadowdb_storage::{SqlBackend, SqlValue};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Record name of the migration state of a type.
#[must_use]
pub fn migration_key(entity_type: &str) -> String {
    format!("migration:{entity_type}")
}

/// Record name of the last integrity report of a type.
#[must_use]
pub fn last_check_key(entity_type: &str) -> String {
    format!("integrity:last_check:{entity_type}")
}

/// Record name of the integrity issue map of a type.
#[must_use]
pub fn issues_key(entity_type: &str) -> String {
    format!("integrity:issues:{entity_type}")
}

/// Record name of the persisted settings.
pub const SETTINGS_KEY: &str = "settings";

/// Named JSON records that survive restarts.
pub trait OptionStore: Send + Sync + fmt::Debug {
    /// Returns the record stored under `name`.
    fn get(&self, name: &str) -> CoreResult<Option<Value>>;

    /// Stores a record, replacing any previous one.
    fn set(&self, name: &str, value: &Value) -> CoreResult<()>;

    /// Deletes a record. Deleting a missing record is not an error.
    fn delete(&self, name: &str) -> CoreResult<()>;
}

impl dyn OptionStore {
    /// Reads and decodes a record.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> CoreResult<Option<T>> {
        match self.get(name)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encodes and stores a record.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> CoreResult<()> {
        self.set(name, &serde_json::to_value(value)?)
    }
}

/// [`OptionStore`] kept in a `<prefix>shadow_options` table.
pub struct SqlOptionStore {
    backend: Arc<dyn SqlBackend>,
    table: String,
}

impl fmt::Debug for SqlOptionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlOptionStore")
            .field("table", &self.table)
            .finish()
    }
}

impl SqlOptionStore {
    /// Opens the store, creating its table if needed.
    pub fn open(backend: Arc<dyn SqlBackend>, prefix: &str) -> CoreResult<Self> {
        let table = format!("{prefix}shadow_options");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (name VARCHAR(191) NOT NULL PRIMARY KEY, value {})",
            backend.dialect().long_text_type()
        );
        backend.execute(&sql, &[])?;
        Ok(Self { backend, table })
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl OptionStore for SqlOptionStore {
    fn get(&self, name: &str) -> CoreResult<Option<Value>> {
        let sql = format!("SELECT value FROM {} WHERE name = ?", self.table);
        let Some(row) = self.backend.query_row(&sql, &[name.into()])? else {
            return Ok(None);
        };
        match row.get_opt_string("value")? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set(&self, name: &str, value: &Value) -> CoreResult<()> {
        let sql = format!("REPLACE INTO {} (name, value) VALUES (?, ?)", self.table);
        self.backend
            .execute(&sql, &[name.into(), SqlValue::Text(value.to_string())])?;
        Ok(())
    }

    fn delete(&self, name: &str) -> CoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE name = ?", self.table);
        self.backend.execute(&sql, &[name.into()])?;
        Ok(())
    }
}

/// [`OptionStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    records: RwLock<BTreeMap<String, Value>>,
}

impl MemoryOptionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored record names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }
}

impl OptionStore for MemoryOptionStore {
    fn get(&self, name: &str) -> CoreResult<Option<Value>> {
        Ok(self.records.read().get(name).cloned())
    }

    fn set(&self, name: &str, value: &Value) -> CoreResult<()> {
        self.records.write().insert(name.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> CoreResult<()> {
        self.records.write().remove(name);
        Ok(())
    }
}
