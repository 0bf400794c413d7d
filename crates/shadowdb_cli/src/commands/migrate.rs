//! Migrate command.

use super::CliResult;
use shadowdb_core::ShadowContext;
use tracing::info;

/// Migrates each type in one pass. Returns the number of records migrated.
pub fn run(ctx: &ShadowContext, types: &[String], batch: usize, dry_run: bool) -> CliResult<u64> {
    let mut migrated = 0;
    for entity_type in types {
        let total = ctx.source().count(entity_type)?;
        if dry_run {
            println!("Would migrate {total} records of type '{entity_type}'");
            continue;
        }

        info!("Migrating {} ({} records)", entity_type, total);
        let count = ctx.sync().migrate_all(entity_type, batch, |done, total| {
            println!("  {entity_type}: {done}/{total}");
        })?;
        println!("✓ Migrated {count} records of type '{entity_type}'");
        migrated += count;
    }
    Ok(migrated)
}
