//! Operator status report.

use crate::context::ShadowContext;
use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shadowing state of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeStatus {
    /// Records of the type in the source of truth.
    pub total: u64,
    /// Rows in the shadow table.
    pub migrated: u64,
    /// Shadow storage footprint.
    pub size_bytes: u64,
    /// Whether the shadow table exists.
    pub exists: bool,
    /// Whether a batch migration is running.
    pub migrating: bool,
}

/// Engine-wide status, as shown by `shadowdb status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Active driver, `None` when the backend is unsupported.
    pub driver: Option<String>,
    /// Backend version string.
    pub backend_version: String,
    /// Whether the backend supports the native JSON driver.
    pub native_json: bool,
    /// Whether the backend reports an alternate vendor.
    pub alternate_vendor: bool,
    /// Per configured entity type.
    pub types: BTreeMap<String, TypeStatus>,
}

pub(crate) fn collect(ctx: &ShadowContext) -> CoreResult<StatusReport> {
    let selector = ctx.selector();
    let driver = match ctx.driver() {
        Ok(driver) => Some(driver.driver_name().to_string()),
        Err(err) => {
            tracing::warn!(error = %err, "no usable driver");
            None
        }
    };

    let tables = ctx.tables();
    let migration = ctx.migration();
    let mut types = BTreeMap::new();
    for entity_type in ctx.settings().entity_types {
        let stats = tables.stats(&entity_type)?;
        let status = TypeStatus {
            total: ctx.source().count(&entity_type)?,
            migrated: stats.count,
            size_bytes: stats.size_bytes,
            exists: stats.exists,
            migrating: migration.is_migrating(&entity_type)?,
        };
        types.insert(entity_type, status);
    }

    Ok(StatusReport {
        driver,
        backend_version: ctx.backend().server_version()?,
        native_json: selector.is_native_json_capable()?,
        alternate_vendor: selector.is_alternate_vendor()?,
        types,
    })
}

#[cfg(test)]
mod tests {
    use crate::context::test_support::{harness, inline_settings, seed};

    #[test]
    fn status_over_sqlite() {
        let h = harness(inline_settings());
        seed(&h.source, 1, "post", &[]);
        seed(&h.source, 2, "post", &[]);
        seed(&h.source, 3, "page", &[]);
        h.ctx.sync().migrate_all("post", 10, |_, _| {}).unwrap();

        let report = h.ctx.status().unwrap();
        assert_eq!(report.driver.as_deref(), Some("NativeJson"));
        assert!(report.native_json);
        assert!(!report.alternate_vendor);

        let post = report.types["post"];
        assert!(post.exists);
        assert_eq!((post.total, post.migrated), (2, 2));
        assert!(post.size_bytes > 0);

        let page = report.types["page"];
        assert!(!page.exists);
        assert_eq!((page.total, page.migrated), (1, 0));
        assert!(report.types.contains_key("product"));
    }
}
