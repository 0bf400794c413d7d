//! Index commands.

use super::CliResult;
use shadowdb_core::ShadowContext;

/// Creates the preset index columns of each type.
pub fn create(ctx: &ShadowContext, types: &[String]) -> CliResult<usize> {
    let manager = ctx.indexes();
    let mut created = 0;
    for entity_type in types {
        let count = manager.create_indexes(entity_type)?;
        println!("  {entity_type}: {count} index(es) created");
        created += count;
    }
    println!("✓ Indexes created");
    Ok(created)
}

/// Drops the preset index columns of each type.
pub fn drop(ctx: &ShadowContext, types: &[String]) -> CliResult<usize> {
    let manager = ctx.indexes();
    let mut dropped = 0;
    for entity_type in types {
        let count = manager.drop_indexes(entity_type)?;
        println!("  {entity_type}: {count} index(es) dropped");
        dropped += count;
    }
    println!("✓ Indexes dropped");
    Ok(dropped)
}

/// Prints column and index presence for each preset.
pub fn status(ctx: &ShadowContext, types: &[String]) -> CliResult<usize> {
    let manager = ctx.indexes();
    let mut rows = 0;
    for entity_type in types {
        for preset in manager.index_status(entity_type)? {
            if rows == 0 {
                println!(
                    "  {:<20} {:<20} {:<20} {:<7} {:<7}",
                    "Type", "Attribute", "Column", "Exists", "Indexed"
                );
            }
            println!(
                "  {:<20} {:<20} {:<20} {:<7} {:<7}",
                entity_type,
                preset.attribute_key,
                preset.column,
                if preset.exists { "Yes" } else { "No" },
                if preset.indexed { "Yes" } else { "No" }
            );
            rows += 1;
        }
    }
    if rows == 0 {
        println!("No index configuration found for these types.");
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn create_then_drop() {
        let (_dir, path) = seeded_database(2);
        let ctx = context(&path);
        let types = vec!["post".to_string()];
        super::super::migrate::run(&ctx, &types, 10, false).unwrap();

        assert_eq!(status(&ctx, &types).unwrap(), 1);
        assert_eq!(create(&ctx, &types).unwrap(), 1);
        assert!(ctx.indexes().has_indexes("post").unwrap());
        assert_eq!(drop(&ctx, &types).unwrap(), 1);
        assert_eq!(status(&ctx, &["page".to_string()]).unwrap(), 0);
    }
}
