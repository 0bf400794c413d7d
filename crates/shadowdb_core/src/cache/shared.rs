//! Cross-request cache seam.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// A cache shared between units of work, such as a memcached pool.
///
/// Entries live in one group; [`SharedCache::flush_group`] drops them all.
/// Implementations own their failure handling: a cache that cannot be
/// reached behaves like an empty one.
pub trait SharedCache: Send + Sync + fmt::Debug {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: String, ttl: Duration);

    /// Removes `key`.
    fn delete(&self, key: &str);

    /// Removes every entry in the group.
    fn flush_group(&self);

    /// Returns true if the cache can be used at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// In-process [`SharedCache`] with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemorySharedCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    unavailable: bool,
}

impl MemorySharedCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that reports itself unavailable.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            entries: Mutex::default(),
            unavailable: true,
        }
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    /// Returns true if no live entry is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SharedCache for MemorySharedCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn flush_group(&self) {
        self.entries.lock().clear();
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }
}
