//! # ShadowDB Storage
//!
//! SQL backend trait and implementations for ShadowDB.
//!
//! This crate provides the lowest-level database abstraction for ShadowDB.
//! Backends are **statement executors** - they run SQL and hand rows back
//! without knowing anything about shadow tables.
//!
//! ## Design Principles
//!
//! - Backends execute statements with positional `?` parameters
//! - No knowledge of shadow schemas, lookup tables or JSON layout
//! - Must be `Send + Sync` for use from a shared context
//! - DDL that differs between servers goes through [`Dialect`]
//!
//! ## Available Backends
//!
//! - [`SqliteBackend`] - Bundled SQLite, file backed or in-memory
//!
//! ## Example
//!
//! ```rust
//! use shadowdb_storage::{SqlBackend, SqliteBackend};
//!
//! let backend = SqliteBackend::open_in_memory().unwrap();
//! backend.execute("CREATE TABLE t (v TEXT)", &[]).unwrap();
//! assert!(backend.table_exists("t").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod sqlite;
mod value;

pub use backend::{Dialect, SqlBackend};
pub use error::{StorageError, StorageResult};
pub use sqlite::SqliteBackend;
pub use value::{Row, SqlValue};
