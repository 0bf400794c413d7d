//! Status command.

use super::{format_bytes, CliResult};
use shadowdb_core::{ShadowContext, StatusReport};

/// Prints the status report as a table or JSON.
pub fn run(ctx: &ShadowContext, format: &str) -> CliResult<StatusReport> {
    let report = ctx.status()?;
    let indexes = ctx.indexes();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report);
    }

    println!("ShadowDB Status");
    println!("===============");
    println!("  Backend version: {}", report.backend_version);
    println!(
        "  Driver:          {}",
        report.driver.as_deref().unwrap_or("unsupported backend")
    );
    println!("  Native JSON:     {}", yes_no(report.native_json));
    println!();
    println!(
        "  {:<20} {:>8} {:>9} {:>12} {:>8}",
        "Type", "Total", "Migrated", "Size", "Indexes"
    );
    for (entity_type, status) in &report.types {
        let size = if status.exists {
            format_bytes(status.size_bytes)
        } else {
            "-".to_string()
        };
        let indexed = status.exists && indexes.has_indexes(entity_type)?;
        println!(
            "  {:<20} {:>8} {:>9} {:>12} {:>8}",
            entity_type,
            status.total,
            status.migrated,
            size,
            yes_no(indexed)
        );
        if status.migrating {
            println!("  {:<20} batch migration running", "");
        }
    }
    Ok(report)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}
