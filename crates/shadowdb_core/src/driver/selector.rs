//! Driver selection by backend capability.

use super::Driver;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use shadowdb_storage::{Dialect, SqlBackend};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A `MAJOR.MINOR.PATCH` server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl ServerVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Extracts the leading `MAJOR.MINOR.PATCH` of a version string.
    ///
    /// Anything after the patch digits (`-log`, `-MariaDB`, ...) is ignored.
    /// Returns `None` unless all three components are present.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut rest = s.trim_start();
        let mut parts = [0u32; 3];
        for (i, part) in parts.iter_mut().enumerate() {
            if i > 0 {
                rest = rest.strip_prefix('.')?;
            }
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if digits == 0 {
                return None;
            }
            *part = rest[..digits].parse().ok()?;
            rest = &rest[digits..];
        }
        Some(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version thresholds deciding which driver a backend gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPolicy {
    /// Lowest version with usable JSON querying.
    pub native_threshold: ServerVersion,
    /// Lowest version supported at all.
    pub minimum: ServerVersion,
}

impl VersionPolicy {
    /// Returns the stock thresholds for a dialect.
    #[must_use]
    pub const fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::MySql => Self {
                native_threshold: ServerVersion::new(8, 0, 17),
                minimum: ServerVersion::new(5, 7, 0),
            },
            Dialect::Sqlite => Self {
                native_threshold: ServerVersion::new(3, 38, 0),
                minimum: ServerVersion::new(3, 9, 0),
            },
        }
    }
}

/// Which driver the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverPreference {
    /// Pick by detected version.
    #[default]
    Auto,
    /// Require the native JSON driver.
    #[serde(alias = "mysql8")]
    NativeJson,
    /// Always use the lookup table driver.
    #[serde(alias = "legacy")]
    LookupTable,
}

impl DriverPreference {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::NativeJson => "native_json",
            Self::LookupTable => "lookup_table",
        }
    }
}

impl fmt::Display for DriverPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverPreference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "native_json" | "mysql8" => Ok(Self::NativeJson),
            "lookup_table" | "legacy" => Ok(Self::LookupTable),
            other => Err(CoreError::invalid_operation(format!(
                "unknown driver preference: {other}"
            ))),
        }
    }
}

/// Picks the storage driver for a backend.
pub struct DriverSelector {
    backend: Arc<dyn SqlBackend>,
    policy: VersionPolicy,
    preference: DriverPreference,
}

impl fmt::Debug for DriverSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSelector")
            .field("dialect", &self.backend.dialect())
            .field("policy", &self.policy)
            .field("preference", &self.preference)
            .finish()
    }
}

impl DriverSelector {
    /// Creates a selector with an explicit policy.
    #[must_use]
    pub fn new(backend: Arc<dyn SqlBackend>, policy: VersionPolicy) -> Self {
        Self {
            backend,
            policy,
            preference: DriverPreference::Auto,
        }
    }

    /// Creates a selector with the stock policy of the backend's dialect.
    #[must_use]
    pub fn for_backend(backend: Arc<dyn SqlBackend>) -> Self {
        let policy = VersionPolicy::for_dialect(backend.dialect());
        Self::new(backend, policy)
    }

    /// Sets the operator preference.
    #[must_use]
    pub fn with_preference(mut self, preference: DriverPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Returns the parsed backend version, if it has one.
    pub fn detected_version(&self) -> CoreResult<Option<ServerVersion>> {
        Ok(ServerVersion::parse(&self.backend.server_version()?))
    }

    /// Returns true if the backend is new enough for the native JSON driver.
    pub fn is_native_json_capable(&self) -> CoreResult<bool> {
        Ok(self
            .detected_version()?
            .is_some_and(|v| v >= self.policy.native_threshold))
    }

    /// Returns true if the backend identifies itself as MariaDB.
    pub fn is_alternate_vendor(&self) -> CoreResult<bool> {
        Ok(self.backend.server_info()?.to_ascii_lowercase().contains("mariadb"))
    }

    /// Creates the driver for the backend.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedBackend`] when the version cannot be
    /// read, is below the minimum, or is below the native threshold while
    /// the native driver is forced.
    pub fn create(&self) -> CoreResult<Driver> {
        let detected = self.backend.server_version()?;
        let minimum = self.policy.minimum;

        let Some(version) = ServerVersion::parse(&detected) else {
            return Err(CoreError::unsupported_backend(detected, minimum.to_string()));
        };
        if version < minimum {
            return Err(CoreError::unsupported_backend(detected, minimum.to_string()));
        }

        let native = version >= self.policy.native_threshold;
        let driver = match self.preference {
            DriverPreference::Auto if native => Driver::native_json(self.backend.clone()),
            DriverPreference::Auto | DriverPreference::LookupTable => {
                Driver::lookup_table(self.backend.clone())
            }
            DriverPreference::NativeJson if native => Driver::native_json(self.backend.clone()),
            DriverPreference::NativeJson => {
                return Err(CoreError::unsupported_backend(
                    detected,
                    self.policy.native_threshold.to_string(),
                ));
            }
        };

        tracing::info!(
            driver = driver.driver_name(),
            version = %version,
            preference = %self.preference,
            "selected storage driver"
        );
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shadowdb_storage::{Row, SqlValue, SqliteBackend, StorageResult};

    /// Reports a fixed version and refuses to run statements.
    #[derive(Debug)]
    struct FakeBackend {
        version: &'static str,
        info: &'static str,
    }

    impl SqlBackend for FakeBackend {
        fn dialect(&self) -> Dialect {
            Dialect::MySql
        }
        fn server_version(&self) -> StorageResult<String> {
            Ok(self.version.to_string())
        }
        fn server_info(&self) -> StorageResult<String> {
            Ok(self.info.to_string())
        }
        fn execute(&self, _: &str, _: &[SqlValue]) -> StorageResult<u64> {
            Ok(0)
        }
        fn insert(&self, _: &str, _: &[SqlValue]) -> StorageResult<i64> {
            Ok(0)
        }
        fn query(&self, _: &str, _: &[SqlValue]) -> StorageResult<Vec<Row>> {
            Ok(Vec::new())
        }
        fn table_exists(&self, _: &str) -> StorageResult<bool> {
            Ok(false)
        }
        fn column_exists(&self, _: &str, _: &str) -> StorageResult<bool> {
            Ok(false)
        }
        fn index_exists(&self, _: &str, _: &str) -> StorageResult<bool> {
            Ok(false)
        }
        fn table_size_bytes(&self, _: &str) -> StorageResult<u64> {
            Ok(0)
        }
    }

    fn mysql(version: &'static str) -> DriverSelector {
        DriverSelector::for_backend(Arc::new(FakeBackend {
            version,
            info: "MySQL Community Server",
        }))
    }

    #[test]
    fn parses_leading_triple() {
        assert_eq!(ServerVersion::parse("8.0.32-0ubuntu0.22.04.2"), Some(ServerVersion::new(8, 0, 32)));
        assert_eq!(ServerVersion::parse("10.5.8-MariaDB-log"), Some(ServerVersion::new(10, 5, 8)));
        assert_eq!(ServerVersion::parse("5.7"), None);
        assert_eq!(ServerVersion::parse("v8.0.1"), None);
        assert_eq!(ServerVersion::parse(""), None);
    }

    #[test]
    fn picks_by_threshold() {
        assert_eq!(mysql("8.0.17").create().unwrap().driver_name(), "NativeJson");
        assert_eq!(mysql("8.0.16").create().unwrap().driver_name(), "LookupTable");
        assert_eq!(mysql("5.7.0").create().unwrap().driver_name(), "LookupTable");
    }

    #[test]
    fn rejects_old_or_unreadable_versions() {
        for version in ["5.6.51", "garbage"] {
            match mysql(version).create() {
                Err(CoreError::UnsupportedBackend { detected, minimum }) => {
                    assert_eq!(detected, version);
                    assert_eq!(minimum, "5.7.0");
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[test]
    fn preferences() {
        let forced = mysql("8.0.30").with_preference(DriverPreference::LookupTable);
        assert_eq!(forced.create().unwrap().driver_name(), "LookupTable");

        let too_old = mysql("5.7.44").with_preference(DriverPreference::NativeJson);
        match too_old.create() {
            Err(CoreError::UnsupportedBackend { minimum, .. }) => assert_eq!(minimum, "8.0.17"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn preference_names() {
        assert_eq!("legacy".parse::<DriverPreference>().unwrap(), DriverPreference::LookupTable);
        assert_eq!("MYSQL8".parse::<DriverPreference>().unwrap(), DriverPreference::NativeJson);
        assert!("fastest".parse::<DriverPreference>().is_err());
        let json: DriverPreference = serde_json::from_str("\"legacy\"").unwrap();
        assert_eq!(json, DriverPreference::LookupTable);
        assert_eq!(serde_json::to_string(&DriverPreference::NativeJson).unwrap(), "\"native_json\"");
    }

    #[test]
    fn vendor_detection() {
        let maria = DriverSelector::for_backend(Arc::new(FakeBackend {
            version: "10.6.12-MariaDB",
            info: "10.6.12-MariaDB-0ubuntu0.22.04.1",
        }));
        assert!(maria.is_alternate_vendor().unwrap());
        assert!(maria.is_native_json_capable().unwrap());
        assert!(!mysql("8.0.1").is_alternate_vendor().unwrap());
    }

    #[test]
    fn bundled_sqlite_is_native() {
        let selector = DriverSelector::for_backend(Arc::new(SqliteBackend::open_in_memory().unwrap()));
        assert!(selector.is_native_json_capable().unwrap());
        assert_eq!(selector.create().unwrap().driver_name(), "NativeJson");
    }

    proptest! {
        #[test]
        fn parse_display_round_trip(major in 0u32..100, minor in 0u32..100, patch in 0u32..1000, suffix in "(-[a-zA-Z]{1,8})?") {
            let text = format!("{major}.{minor}.{patch}{suffix}");
            let version = ServerVersion::parse(&text).unwrap();
            prop_assert_eq!(version, ServerVersion::new(major, minor, patch));
            prop_assert_eq!(version.to_string(), format!("{major}.{minor}.{patch}"));
        }
    }
}
