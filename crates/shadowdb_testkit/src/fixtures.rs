//! Test fixtures and environment helpers.
//!
//! A [`TestEnv`] bundles a context with the in-memory source it reads from,
//! so tests can change the source of truth and watch the shadow follow.

use shadowdb_core::{
    DriverPreference, EntityId, MemoryJobQueue, MemorySource, Settings, ShadowConfig, ShadowContext,
    ShadowRepository,
};
use shadowdb_storage::{SqlBackend, SqliteBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A context over SQLite with an in-memory source of truth.
pub struct TestEnv {
    /// The context.
    pub ctx: ShadowContext,
    /// The source the context reads from.
    pub source: Arc<MemorySource>,
    /// The attached job queue, if any.
    pub queue: Option<Arc<MemoryJobQueue>>,
    /// Keeps the database file alive.
    _temp_dir: Option<TempDir>,
}

impl TestEnv {
    /// Native JSON driver, writes applied inline.
    pub fn native() -> Self {
        Self::build(ShadowConfig::new(), inline(DriverPreference::Auto), false, None)
    }

    /// Lookup table driver, writes applied inline.
    pub fn lookup() -> Self {
        Self::build(ShadowConfig::new(), inline(DriverPreference::LookupTable), false, None)
    }

    /// Both drivers, for tests that must hold for either layout.
    pub fn both() -> Vec<Self> {
        vec![Self::native(), Self::lookup()]
    }

    /// Async writes handed to a [`MemoryJobQueue`].
    pub fn queued() -> Self {
        Self::build(ShadowConfig::new(), Settings::default(), true, None)
    }

    /// Async writes with no queue, so they wait for `finish`.
    pub fn deferred() -> Self {
        Self::build(ShadowConfig::new(), Settings::default(), false, None)
    }

    /// Native driver over a SQLite file in a temp directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::build(ShadowConfig::new(), inline(DriverPreference::Auto), false, Some(temp_dir))
    }

    /// Native driver, writes applied inline, with a custom configuration.
    pub fn with_config(config: ShadowConfig) -> Self {
        Self::build(config, inline(DriverPreference::Auto), false, None)
    }

    /// Builds an environment from explicit settings.
    pub fn with_settings(settings: Settings, with_queue: bool) -> Self {
        Self::build(ShadowConfig::new(), settings, with_queue, None)
    }

    fn build(config: ShadowConfig, settings: Settings, with_queue: bool, temp_dir: Option<TempDir>) -> Self {
        let backend: Arc<dyn SqlBackend> = match &temp_dir {
            Some(dir) => Arc::new(
                SqliteBackend::open_with_create_dirs(&dir.path().join("shadow.db"))
                    .expect("Failed to open database file"),
            ),
            None => Arc::new(SqliteBackend::open_in_memory().expect("Failed to open database")),
        };
        let source = Arc::new(MemorySource::new());
        let queue = with_queue.then(|| Arc::new(MemoryJobQueue::new()));

        let mut builder = ShadowContext::builder(backend)
            .config(config)
            .source(source.clone())
            .settings(settings);
        if let Some(queue) = &queue {
            builder = builder.job_queue(queue.clone());
        }

        Self {
            ctx: builder.build().expect("Failed to build context"),
            source,
            queue,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the database path if file-based.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("shadow.db"))
    }

    /// Opens a second context over the same database file and source, as
    /// a new process would. Settings come from the option store.
    pub fn reopen(&self) -> ShadowContext {
        let path = self.path().expect("Only file environments can be reopened");
        ShadowContext::builder(Arc::new(
            SqliteBackend::open(&path).expect("Failed to reopen database"),
        ))
        .source(self.source.clone())
        .build()
        .expect("Failed to build context")
    }

    /// Writes a record with single-valued attributes to the source.
    pub fn seed(&self, id: u64, entity_type: &str, attributes: &[(&str, &str)]) {
        let id = EntityId::new(id);
        self.source.insert_record(id, entity_type, format!("content of {id}"));
        for (key, value) in attributes {
            self.source.set_attribute(id, *key, *value);
        }
    }

    /// Migrates every record of a type, returning the count.
    pub fn migrate(&self, entity_type: &str) -> u64 {
        self.ctx
            .sync()
            .migrate_all(entity_type, self.ctx.config().migrate_all_batch_size, |_, _| {})
            .expect("Migration failed")
    }

    /// Returns the repository of a type.
    pub fn shadow(&self, entity_type: &str) -> ShadowRepository {
        self.ctx.repository(entity_type).expect("No usable driver")
    }

    /// Returns the name of the active driver.
    pub fn driver_name(&self) -> &'static str {
        self.ctx.driver().expect("No usable driver").driver_name()
    }
}

impl std::ops::Deref for TestEnv {
    type Target = ShadowContext;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

fn inline(driver: DriverPreference) -> Settings {
    Settings {
        driver,
        async_write: false,
        ..Settings::default()
    }
}

/// Runs a test with a native in-memory environment.
pub fn with_env<F, R>(f: F) -> R
where
    F: FnOnce(&TestEnv) -> R,
{
    let env = TestEnv::native();
    f(&env)
}

/// Runs a test once per driver.
pub fn with_each_driver<F>(mut f: F)
where
    F: FnMut(&TestEnv),
{
    for env in TestEnv::both() {
        f(&env);
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Seeds `count` products with price, SKU and stock attributes.
    pub fn products(env: &TestEnv, count: u64) {
        for id in 1..=count {
            let price = format!("{}.99", id * 10);
            let sku = format!("SKU-{id:04}");
            let stock = (id % 5).to_string();
            let status = if id % 5 == 0 { "outofstock" } else { "instock" };
            env.seed(
                id,
                "product",
                &[
                    ("_price", price.as_str()),
                    ("_sku", sku.as_str()),
                    ("_stock", stock.as_str()),
                    ("_stock_status", status),
                ],
            );
        }
    }

    /// A native environment with `count` migrated posts.
    pub fn populated(count: u64) -> TestEnv {
        let env = TestEnv::native();
        for id in 1..=count {
            let n = id.to_string();
            env.seed(id, "post", &[("index", n.as_str()), ("color", "red")]);
        }
        env.migrate("post");
        env
    }
}
