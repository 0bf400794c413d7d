//! # ShadowDB Core
//!
//! Shadow storage and query translation engine for ShadowDB.
//!
//! A sparse entity-attribute-value store (the *source of truth*) is mirrored
//! into one JSON-backed shadow table per entity type. This crate provides:
//! - The schema model and entity types
//! - Two storage drivers behind one [`Driver`] enum, picked from the backend
//!   version by [`DriverSelector`]
//! - [`ShadowRepository`] and the [`RuntimeCache`]
//! - [`QueryTranslator`], rewriting host query clauses onto shadow tables
//! - Write synchronization, resumable batch migration and integrity checks
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ShadowContext                 │
//! │  settings · driver · repositories · cache    │
//! ├───────────┬───────────┬───────────┬──────────┤
//! │   Sync    │ Migration │ Integrity │  Reader  │
//! ├───────────┴───────────┴───────────┴──────────┤
//! │        ShadowRepository · TableManager       │
//! ├──────────────────────────────────────────────┤
//! │      Driver (NativeJson | LookupTable)       │
//! ├──────────────────────────────────────────────┤
//! │           SqlBackend (shadowdb_storage)      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use shadowdb_core::{EntityId, MemorySource, Settings, ShadowContext};
//! use shadowdb_storage::SqliteBackend;
//! use std::sync::Arc;
//!
//! let source = Arc::new(MemorySource::new());
//! source.insert_record(EntityId::new(1), "post", "Hello");
//! source.set_attribute(EntityId::new(1), "color", "red");
//!
//! let ctx = ShadowContext::builder(Arc::new(SqliteBackend::open_in_memory().unwrap()))
//!     .source(source)
//!     .settings(Settings { async_write: false, ..Settings::default() })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(ctx.sync().migrate_all("post", 100, |_, _| {}).unwrap(), 1);
//! let color = ctx.reader().attribute(EntityId::new(1), "post", "color").unwrap();
//! assert_eq!(color, Some(serde_json::json!("red")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod context;
mod driver;
mod entity;
mod error;
mod index;
mod integrity;
mod migration;
mod options;
mod predicate;
mod query;
mod read;
mod repository;
mod schema;
mod settings;
mod source;
mod status;
mod sync;
mod table;

pub use cache::{CacheLookup, CacheStats, MemorySharedCache, RuntimeCache, SharedCache, DEFAULT_CACHE_TTL};
pub use config::ShadowConfig;
pub use context::{CompletionHook, ShadowContext, ShadowContextBuilder};
pub use driver::{
    flatten_leaves, Driver, DriverPreference, DriverSelector, Leaf, LookupTableDriver, NativeJsonDriver,
    ServerVersion, VersionPolicy,
};
pub use entity::{Attributes, Entity, EntityId};
pub use error::{CoreError, CoreResult};
pub use index::{default_presets, IndexManager, IndexPreset, IndexStatus};
pub use integrity::{AttributeMismatch, EntityIssues, IntegrityChecker, IntegrityReport, IntegrityStatus};
pub use migration::{BatchMigration, MigrationState, MigrationStatus, StepOutcome};
pub use options::{
    issues_key, last_check_key, migration_key, MemoryOptionStore, OptionStore, SqlOptionStore, SETTINGS_KEY,
};
pub use predicate::{
    escape_like, json_path, sql_literal, value_number, value_text, Comparator, CompiledQuery, MetaPredicate,
    MetaQuery, Relation, SqlFragment,
};
pub use query::{QueryClauses, QueryTranslator};
pub use read::ShadowReader;
pub use repository::ShadowRepository;
pub use schema::Schema;
pub use settings::Settings;
pub use source::{canonical_attributes, MemorySource, RawAttributes, SourceLayout, SourceOfTruth, SourceRecord, SqlSource};
pub use status::{StatusReport, TypeStatus};
pub use sync::{HostEvent, JobQueue, MemoryJobQueue, Schedule, SyncJob, SyncOrchestrator, WriteInterceptor};
pub use table::{TableManager, TableStats};
