//! Settings commands.

use super::CliResult;
use shadowdb_core::{DriverPreference, Settings, ShadowContext};

/// Fields to change; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct SettingsChange {
    /// Master switch.
    pub enabled: Option<bool>,
    /// Shadowed entity types.
    pub types: Option<Vec<String>>,
    /// Driver override.
    pub driver: Option<String>,
    /// Async writes.
    pub async_write: Option<bool>,
}

/// Prints the current settings as JSON.
pub fn show(ctx: &ShadowContext) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&ctx.settings())?);
    Ok(())
}

/// Applies a change and persists the result.
pub fn set(ctx: &ShadowContext, change: SettingsChange) -> CliResult<Settings> {
    let mut settings = ctx.settings();
    if let Some(enabled) = change.enabled {
        settings.enabled = enabled;
    }
    if let Some(types) = change.types {
        settings.entity_types = types;
    }
    if let Some(driver) = change.driver {
        settings.driver = driver.parse::<DriverPreference>()?;
    }
    if let Some(async_write) = change.async_write {
        settings.async_write = async_write;
    }
    ctx.update_settings(settings.clone())?;
    println!("✓ Settings saved");
    Ok(settings)
}
