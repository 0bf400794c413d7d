//! CLI command implementations.

pub mod batch;
pub mod index;
pub mod migrate;
pub mod rollback;
pub mod settings;
pub mod status;
pub mod verify;

use shadowdb_core::{ShadowConfig, ShadowContext};
use shadowdb_storage::SqliteBackend;
use std::path::Path;
use std::sync::Arc;

/// Result type of every command.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Opens the database and builds a context over it.
pub fn open_context(path: &Path, prefix: &str) -> CliResult<ShadowContext> {
    let backend = SqliteBackend::open_with_create_dirs(path)?;
    let ctx = ShadowContext::builder(Arc::new(backend))
        .config(ShadowConfig::new().table_prefix(prefix))
        .build()?;
    Ok(ctx)
}

/// Resolves `--type` / `--all` into the list of types to act on.
pub fn target_types(ctx: &ShadowContext, entity_type: Option<String>, all: bool) -> CliResult<Vec<String>> {
    match entity_type {
        Some(t) => Ok(vec![t]),
        None if all => Ok(ctx.settings().entity_types),
        None => Err("Specify --type=<entity_type> or --all".into()),
    }
}

/// Formats a byte count with a binary unit.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use shadowdb_storage::SqlBackend;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Creates a database with WordPress-shaped source tables holding
    /// `posts` published posts, each with a `color` attribute.
    pub fn seeded_database(posts: i64) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.db");
        let backend = SqliteBackend::open(&path).unwrap();
        backend
            .execute(
                "CREATE TABLE wp_posts (ID INTEGER PRIMARY KEY, post_type TEXT, \
                 post_status TEXT, post_content TEXT)",
                &[],
            )
            .unwrap();
        backend
            .execute(
                "CREATE TABLE wp_postmeta (meta_id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 post_id INTEGER, meta_key TEXT, meta_value TEXT)",
                &[],
            )
            .unwrap();
        for id in 1..=posts {
            backend
                .execute(
                    "INSERT INTO wp_posts (ID, post_type, post_status, post_content) \
                     VALUES (?, 'post', 'publish', 'body')",
                    &[id.into()],
                )
                .unwrap();
            backend
                .execute(
                    "INSERT INTO wp_postmeta (post_id, meta_key, meta_value) VALUES (?, 'color', 'red')",
                    &[id.into()],
                )
                .unwrap();
        }
        (dir, path)
    }

    pub fn context(path: &Path) -> ShadowContext {
        open_context(path, "wp_").unwrap()
    }
}
