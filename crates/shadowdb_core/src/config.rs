//! Engine configuration.

use crate::cache::DEFAULT_CACHE_TTL;
use crate::driver::VersionPolicy;
use crate::index::{default_presets, IndexPreset};
use crate::schema::Schema;
use crate::source::SourceLayout;
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for a [`ShadowContext`](crate::ShadowContext).
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// Prefix of every table name.
    pub table_prefix: String,

    /// Page size of one batch migration step.
    pub migration_batch_size: usize,

    /// Page size of a one-shot full migration.
    pub migrate_all_batch_size: usize,

    /// Number of entities sampled by an integrity check.
    pub integrity_sample_size: usize,

    /// Number of offending ids kept in an integrity report.
    pub issue_sample_limit: usize,

    /// Lifetime of shared cache entries.
    pub cache_ttl: Duration,

    /// Attribute keys never copied into shadow rows.
    pub internal_keys: Vec<String>,

    /// Driver thresholds; the dialect's stock policy when `None`.
    pub version_policy: Option<VersionPolicy>,

    /// Typed index columns per entity type.
    pub index_presets: BTreeMap<String, Vec<IndexPreset>>,

    /// Schemas for entity types that need more than the bare default.
    pub schemas: BTreeMap<String, Schema>,

    /// Where records and attributes live in the source of truth.
    pub source_layout: SourceLayout,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            table_prefix: "wp_".to_string(),
            migration_batch_size: 100,
            migrate_all_batch_size: 500,
            integrity_sample_size: 100,
            issue_sample_limit: 10,
            cache_ttl: DEFAULT_CACHE_TTL,
            internal_keys: vec!["_edit_lock".to_string(), "_edit_last".to_string()],
            version_policy: None,
            index_presets: default_presets(),
            schemas: BTreeMap::new(),
            source_layout: SourceLayout::wordpress("wp_"),
        }
    }
}

impl ShadowConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the schema for an entity type.
    #[must_use]
    pub fn schema_for(&self, entity_type: &str) -> Schema {
        self.schemas
            .get(entity_type)
            .cloned()
            .unwrap_or_else(|| Schema::new(entity_type))
    }

    /// Sets the table prefix. The source layout is reset to the WordPress
    /// layout under the same prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self.source_layout = SourceLayout::wordpress(&self.table_prefix);
        self
    }

    /// Sets the batch migration page size.
    #[must_use]
    pub const fn migration_batch_size(mut self, size: usize) -> Self {
        self.migration_batch_size = size;
        self
    }

    /// Sets the full migration page size.
    #[must_use]
    pub const fn migrate_all_batch_size(mut self, size: usize) -> Self {
        self.migrate_all_batch_size = size;
        self
    }

    /// Sets the integrity sample size.
    #[must_use]
    pub const fn integrity_sample_size(mut self, size: usize) -> Self {
        self.integrity_sample_size = size;
        self
    }

    /// Sets the shared cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Replaces the internal attribute keys.
    #[must_use]
    pub fn internal_keys(mut self, keys: Vec<String>) -> Self {
        self.internal_keys = keys;
        self
    }

    /// Overrides the driver thresholds.
    #[must_use]
    pub const fn version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = Some(policy);
        self
    }

    /// Registers a schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.insert(schema.entity_type().to_string(), schema);
        self
    }

    /// Sets the source layout.
    #[must_use]
    pub fn source_layout(mut self, layout: SourceLayout) -> Self {
        self.source_layout = layout;
        self
    }
}
