//! Operator settings.

use crate::driver::DriverPreference;
use serde::{Deserialize, Serialize};

/// Settings persisted in the option store under
/// [`SETTINGS_KEY`](crate::options::SETTINGS_KEY).
///
/// Missing fields deserialize to their defaults, so records written by
/// older versions stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for write interception.
    pub enabled: bool,
    /// Entity types that are shadowed.
    pub entity_types: Vec<String>,
    /// Driver override.
    pub driver: DriverPreference,
    /// Whether writes are pushed off the request path.
    pub async_write: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            entity_types: vec!["post".to_string(), "page".to_string(), "product".to_string()],
            driver: DriverPreference::Auto,
            async_write: true,
        }
    }
}

impl Settings {
    /// Returns true if `entity_type` is shadowed.
    #[must_use]
    pub fn is_configured(&self, entity_type: &str) -> bool {
        self.entity_types.iter().any(|t| t == entity_type)
    }
}
