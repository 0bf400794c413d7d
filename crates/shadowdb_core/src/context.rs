//! The per-unit-of-work context.

use crate::cache::{RuntimeCache, SharedCache};
use crate::config::ShadowConfig;
use crate::driver::{Driver, DriverSelector, VersionPolicy};
use crate::entity::EntityId;
use crate::error::CoreResult;
use crate::index::IndexManager;
use crate::integrity::IntegrityChecker;
use crate::migration::BatchMigration;
use crate::options::{OptionStore, SqlOptionStore, SETTINGS_KEY};
use crate::predicate::MetaQuery;
use crate::query::{QueryClauses, QueryTranslator};
use crate::read::ShadowReader;
use crate::repository::ShadowRepository;
use crate::schema::Schema;
use crate::settings::Settings;
use crate::source::{SourceOfTruth, SqlSource};
use crate::status::{self, StatusReport};
use crate::sync::{JobQueue, SyncJob, SyncOrchestrator, WriteInterceptor};
use crate::table::TableManager;
use parking_lot::{Mutex, RwLock};
use shadowdb_storage::SqlBackend;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Callback fired when a type finishes migrating, with the migrated count.
pub type CompletionHook = Arc<dyn Fn(&str, u64) + Send + Sync>;

/// Everything one unit of work needs.
///
/// `ShadowContext` replaces process-wide registries: it owns the backend
/// handle, the lazily selected driver, one repository per entity type, the
/// runtime cache, a memo of which shadow tables exist, the set of ids whose
/// sync was already scheduled, and the writes deferred to the end of the
/// unit of work.
///
/// # Building a Context
///
/// ```rust
/// use shadowdb_core::{ShadowConfig, ShadowContext};
/// use shadowdb_storage::SqliteBackend;
/// use std::sync::Arc;
///
/// let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
/// let ctx = ShadowContext::builder(backend)
///     .config(ShadowConfig::new().table_prefix("wp_"))
///     .build()
///     .unwrap();
/// assert!(ctx.settings().enabled);
/// ```
///
/// # Units of Work
///
/// Call [`ShadowContext::begin_unit_of_work`] at the start of a request and
/// [`ShadowContext::finish`] at its end. Writes scheduled while async writes
/// are enabled but no [`JobQueue`] is attached run in `finish`.
///
/// Services are borrowed views over the context:
/// [`sync`](Self::sync), [`migration`](Self::migration),
/// [`integrity`](Self::integrity), [`tables`](Self::tables),
/// [`reader`](Self::reader) and [`interceptor`](Self::interceptor).
pub struct ShadowContext {
    backend: Arc<dyn SqlBackend>,
    source: Arc<dyn SourceOfTruth>,
    options: Arc<dyn OptionStore>,
    queue: Option<Arc<dyn JobQueue>>,
    on_complete: Option<CompletionHook>,
    config: ShadowConfig,
    settings: RwLock<Settings>,
    driver: Mutex<Option<Driver>>,
    repositories: Mutex<HashMap<String, ShadowRepository>>,
    tables: Mutex<HashMap<String, bool>>,
    cache: RuntimeCache,
    scheduled: Mutex<HashSet<EntityId>>,
    deferred: Mutex<Vec<SyncJob>>,
}

impl fmt::Debug for ShadowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowContext")
            .field("dialect", &self.backend.dialect())
            .field("prefix", &self.config.table_prefix)
            .field("driver", &self.driver.lock().as_ref().map(Driver::driver_name))
            .field("deferred", &self.deferred.lock().len())
            .finish_non_exhaustive()
    }
}

impl ShadowContext {
    /// Starts building a context over a backend.
    #[must_use]
    pub fn builder(backend: Arc<dyn SqlBackend>) -> ShadowContextBuilder {
        ShadowContextBuilder::new(backend)
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }

    /// Returns the source of truth.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn SourceOfTruth> {
        &self.source
    }

    /// Returns the option store.
    #[must_use]
    pub fn options(&self) -> &Arc<dyn OptionStore> {
        &self.options
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Returns the runtime cache.
    #[must_use]
    pub fn cache(&self) -> &RuntimeCache {
        &self.cache
    }

    /// Returns the attached job queue.
    #[must_use]
    pub fn job_queue(&self) -> Option<&Arc<dyn JobQueue>> {
        self.queue.as_ref()
    }

    /// Returns a copy of the current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Persists new settings.
    ///
    /// A changed driver preference takes effect on the next driver access.
    pub fn update_settings(&self, settings: Settings) -> CoreResult<()> {
        self.options.save(SETTINGS_KEY, &settings)?;
        let driver_changed = {
            let mut current = self.settings.write();
            let changed = current.driver != settings.driver;
            *current = settings;
            changed
        };
        if driver_changed {
            *self.driver.lock() = None;
            self.repositories.lock().clear();
            tracing::info!("driver preference changed, driver will be reselected");
        }
        Ok(())
    }

    /// Returns a selector configured like the context's own.
    #[must_use]
    pub fn selector(&self) -> DriverSelector {
        let policy = self
            .config
            .version_policy
            .unwrap_or_else(|| VersionPolicy::for_dialect(self.backend.dialect()));
        DriverSelector::new(self.backend.clone(), policy).with_preference(self.settings.read().driver)
    }

    /// Returns the storage driver, selecting it on first use.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UnsupportedBackend`](crate::CoreError::UnsupportedBackend)
    /// when the backend is too old for every driver.
    pub fn driver(&self) -> CoreResult<Driver> {
        let mut slot = self.driver.lock();
        if let Some(driver) = slot.as_ref() {
            return Ok(driver.clone());
        }
        let driver = self.selector().create()?;
        *slot = Some(driver.clone());
        Ok(driver)
    }

    /// Returns the schema of an entity type.
    #[must_use]
    pub fn schema(&self, entity_type: &str) -> Schema {
        self.config.schema_for(entity_type)
    }

    /// Returns the repository of an entity type.
    pub fn repository(&self, entity_type: &str) -> CoreResult<ShadowRepository> {
        if let Some(repository) = self.repositories.lock().get(entity_type) {
            return Ok(repository.clone());
        }
        let repository = ShadowRepository::new(
            self.driver()?,
            self.schema(entity_type),
            &self.config.table_prefix,
        );
        self.repositories
            .lock()
            .insert(entity_type.to_string(), repository.clone());
        Ok(repository)
    }

    /// Returns true if the shadow table of a type exists.
    ///
    /// The answer is memoized for the lifetime of the context; table
    /// creation and rollback through the context keep it current.
    pub fn table_exists(&self, entity_type: &str) -> CoreResult<bool> {
        if let Some(exists) = self.tables.lock().get(entity_type) {
            return Ok(*exists);
        }
        let table = self.schema(entity_type).table_name(&self.config.table_prefix);
        let exists = self.backend.table_exists(&table)?;
        self.tables.lock().insert(entity_type.to_string(), exists);
        Ok(exists)
    }

    pub(crate) fn remember_table(&self, entity_type: &str, exists: bool) {
        self.tables.lock().insert(entity_type.to_string(), exists);
        if !exists {
            self.repositories.lock().remove(entity_type);
        }
    }

    /// Clears the per-unit-of-work debounce set.
    pub fn begin_unit_of_work(&self) {
        self.scheduled.lock().clear();
    }

    /// Marks an id as scheduled. Returns `false` if it already was.
    pub(crate) fn claim_sync(&self, id: EntityId) -> bool {
        self.scheduled.lock().insert(id)
    }

    pub(crate) fn defer(&self, job: SyncJob) {
        self.deferred.lock().push(job);
    }

    /// Returns the number of writes waiting for [`ShadowContext::finish`].
    #[must_use]
    pub fn deferred_jobs(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Runs the deferred writes. Returns how many ran.
    ///
    /// Jobs run in scheduling order; the first failure stops the drain and
    /// the remaining jobs are dropped.
    pub fn finish(&self) -> CoreResult<usize> {
        let jobs = std::mem::take(&mut *self.deferred.lock());
        let sync = self.sync();
        for job in &jobs {
            sync.process_job(job)?;
        }
        if !jobs.is_empty() {
            tracing::debug!(jobs = jobs.len(), "ran deferred writes");
        }
        Ok(jobs.len())
    }

    pub(crate) fn notify_complete(&self, entity_type: &str, migrated: u64) {
        tracing::info!(entity_type, migrated, "migration completed");
        if let Some(hook) = &self.on_complete {
            hook(entity_type, migrated);
        }
    }

    /// Returns the write synchronization service.
    #[must_use]
    pub fn sync(&self) -> SyncOrchestrator<'_> {
        SyncOrchestrator::new(self)
    }

    /// Returns the batch migration service.
    #[must_use]
    pub fn migration(&self) -> BatchMigration<'_> {
        BatchMigration::new(self)
    }

    /// Returns the integrity checker.
    #[must_use]
    pub fn integrity(&self) -> IntegrityChecker<'_> {
        IntegrityChecker::new(self)
    }

    /// Returns the table manager.
    #[must_use]
    pub fn tables(&self) -> TableManager<'_> {
        TableManager::new(self)
    }

    /// Returns an index manager using the configured presets.
    #[must_use]
    pub fn indexes(&self) -> IndexManager {
        IndexManager::new(
            self.backend.clone(),
            self.config.table_prefix.clone(),
            self.config.index_presets.clone(),
        )
    }

    /// Returns the cached read path.
    #[must_use]
    pub fn reader(&self) -> ShadowReader<'_> {
        ShadowReader::new(self)
    }

    /// Returns the host event handler.
    #[must_use]
    pub fn interceptor(&self) -> WriteInterceptor<'_> {
        WriteInterceptor::new(self)
    }

    /// Returns a query translator for one entity type.
    pub fn translator(&self, entity_type: &str) -> CoreResult<QueryTranslator> {
        let layout = &self.config.source_layout;
        Ok(QueryTranslator::new(
            self.driver()?,
            self.schema(entity_type),
            self.config.table_prefix.clone(),
            layout.records_table.clone(),
            layout.id_column.clone(),
        ))
    }

    /// Rewrites host query clauses for one entity type.
    ///
    /// Clauses pass through unchanged when the type has no shadow table.
    pub fn translate(&self, entity_type: &str, clauses: QueryClauses, query: &MetaQuery) -> CoreResult<QueryClauses> {
        if !self.table_exists(entity_type)? {
            return Ok(clauses);
        }
        Ok(self.translator(entity_type)?.translate(clauses, query))
    }

    /// Collects a status report over the configured entity types.
    pub fn status(&self) -> CoreResult<StatusReport> {
        status::collect(self)
    }
}

/// Builder for [`ShadowContext`].
#[must_use]
pub struct ShadowContextBuilder {
    backend: Arc<dyn SqlBackend>,
    config: ShadowConfig,
    source: Option<Arc<dyn SourceOfTruth>>,
    options: Option<Arc<dyn OptionStore>>,
    queue: Option<Arc<dyn JobQueue>>,
    shared_cache: Option<Arc<dyn SharedCache>>,
    settings: Option<Settings>,
    on_complete: Option<CompletionHook>,
}

impl ShadowContextBuilder {
    fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self {
            backend,
            config: ShadowConfig::default(),
            source: None,
            options: None,
            queue: None,
            shared_cache: None,
            settings: None,
            on_complete: None,
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: ShadowConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the source of truth. Defaults to a [`SqlSource`] over the
    /// backend using the configured layout.
    pub fn source(mut self, source: Arc<dyn SourceOfTruth>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the option store. Defaults to a [`SqlOptionStore`] on the backend.
    pub fn options(mut self, options: Arc<dyn OptionStore>) -> Self {
        self.options = Some(options);
        self
    }

    /// Attaches an async job queue.
    pub fn job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Attaches a shared cache.
    pub fn shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Uses these settings instead of the persisted ones.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the migration completion hook.
    pub fn on_migration_complete(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// Fails if the default option store cannot create its table or the
    /// persisted settings cannot be read.
    pub fn build(self) -> CoreResult<ShadowContext> {
        let options: Arc<dyn OptionStore> = match self.options {
            Some(options) => options,
            None => Arc::new(SqlOptionStore::open(
                self.backend.clone(),
                &self.config.table_prefix,
            )?),
        };
        let source: Arc<dyn SourceOfTruth> = match self.source {
            Some(source) => source,
            None => Arc::new(SqlSource::new(
                self.backend.clone(),
                self.config.source_layout.clone(),
            )),
        };
        let settings = match self.settings {
            Some(settings) => settings,
            None => options.load::<Settings>(SETTINGS_KEY)?.unwrap_or_default(),
        };
        let cache = match self.shared_cache {
            Some(shared) => RuntimeCache::with_shared(shared, self.config.cache_ttl),
            None => RuntimeCache::new(),
        };

        Ok(ShadowContext {
            backend: self.backend,
            source,
            options,
            queue: self.queue,
            on_complete: self.on_complete,
            config: self.config,
            settings: RwLock::new(settings),
            driver: Mutex::new(None),
            repositories: Mutex::default(),
            tables: Mutex::default(),
            cache,
            scheduled: Mutex::default(),
            deferred: Mutex::default(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::driver::DriverPreference;
    use crate::options::MemoryOptionStore;
    use crate::sync::MemoryJobQueue;
    use shadowdb_storage::SqliteBackend;

    #[test]
    fn settings_load_from_options() {
        let options = Arc::new(MemoryOptionStore::new());
        let stored = Settings {
            entity_types: vec!["book".into()],
            ..Settings::default()
        };
        (options.clone() as Arc<dyn OptionStore>)
            .save(SETTINGS_KEY, &stored)
            .unwrap();

        let ctx = ShadowContext::builder(Arc::new(SqliteBackend::open_in_memory().unwrap()))
            .options(options)
            .build()
            .unwrap();
        assert_eq!(ctx.settings(), stored);
    }

    #[test]
    fn default_option_store_is_a_table() {
        let backend: Arc<dyn SqlBackend> = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let ctx = ShadowContext::builder(backend.clone()).build().unwrap();
        ctx.update_settings(Settings::default()).unwrap();
        assert!(backend.table_exists("wp_shadow_options").unwrap());
    }

    #[test]
    fn driver_is_selected_once_and_reset_on_preference_change() {
        let h = harness(Settings::default());
        assert_eq!(h.ctx.driver().unwrap().driver_name(), "NativeJson");
        h.ctx
            .update_settings(Settings {
                driver: DriverPreference::LookupTable,
                ..Settings::default()
            })
            .unwrap();
        assert_eq!(h.ctx.driver().unwrap().driver_name(), "LookupTable");
        assert_eq!(h.ctx.repository("post").unwrap().driver().driver_name(), "LookupTable");
    }

    #[test]
    fn table_memo_follows_create_and_drop() {
        let h = harness(Settings::default());
        assert!(!h.ctx.table_exists("post").unwrap());
        h.ctx.tables().create(&Schema::new("post")).unwrap();
        assert!(h.ctx.table_exists("post").unwrap());
        h.ctx.tables().drop("post").unwrap();
        assert!(!h.ctx.table_exists("post").unwrap());
    }

    #[test]
    fn deferred_writes_run_in_finish() {
        let h = harness(Settings::default());
        seed(&h.source, 1, "post", &[("color", "red")]);
        h.ctx.tables().create(&Schema::new("post")).unwrap();

        h.ctx.sync().schedule_sync(EntityId::new(1), "post").unwrap();
        assert_eq!(h.ctx.deferred_jobs(), 1);
        assert!(!h.ctx.repository("post").unwrap().exists(EntityId::new(1)).unwrap());

        assert_eq!(h.ctx.finish().unwrap(), 1);
        assert_eq!(h.ctx.deferred_jobs(), 0);
        assert!(h.ctx.repository("post").unwrap().exists(EntityId::new(1)).unwrap());
    }

    #[test]
    fn translate_passes_through_without_table() {
        let h = harness(Settings::default());
        let query = MetaQuery::new().with(crate::predicate::MetaPredicate::eq("a", "b"));
        let out = h.ctx.translate("post", QueryClauses::new(), &query).unwrap();
        assert_eq!(out, QueryClauses::new());

        h.ctx.tables().create(&Schema::new("post")).unwrap();
        let out = h.ctx.translate("post", QueryClauses::new(), &query).unwrap();
        assert!(out.join.contains("wp_shadow_post AS shadow ON wp_posts.ID"));
    }

    #[test]
    fn queue_is_exposed() {
        let queue = Arc::new(MemoryJobQueue::new());
        let h = harness_with(Settings::default(), |b| b.job_queue(queue.clone()));
        assert!(h.ctx.job_queue().is_some());
    }
}
