//! Rollback command.

use super::CliResult;
use shadowdb_core::ShadowContext;

/// Drops the shadow storage of one type. Refuses without `confirmed`.
pub fn run(ctx: &ShadowContext, entity_type: &str, confirmed: bool) -> CliResult<()> {
    if !confirmed {
        return Err(format!(
            "This will delete the shadow table for '{entity_type}'. Re-run with --yes to continue"
        )
        .into());
    }
    ctx.sync().rollback(entity_type)?;
    println!("✓ Shadow table for '{entity_type}' dropped");
    Ok(())
}
