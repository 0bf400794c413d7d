//! Per-context entity cache.

use super::shared::SharedCache;
use crate::entity::{Entity, EntityId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default lifetime of mirrored entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const KEY_PREFIX: &str = "shadowdb:entity:";

/// What the cache knows about one id.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// The entity is cached.
    Hit(Entity),
    /// The entity is known not to exist.
    Absent,
    /// Nothing is known.
    Unknown,
}

/// Counters reported by [`RuntimeCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached entities.
    pub cached: usize,
    /// Number of ids marked as absent.
    pub not_found: usize,
    /// Approximate bytes held by cached entities.
    pub memory_bytes: usize,
}

/// Value mirrored into the shared cache.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "slot", content = "entity", rename_all = "snake_case")]
enum CacheSlot {
    Found(Entity),
    Absent,
}

#[derive(Debug, Default)]
struct Local {
    entities: HashMap<EntityId, Entity>,
    not_found: HashSet<EntityId>,
}

/// Positive and negative entity cache for one unit of work.
///
/// An id is in at most one of the two local maps at any time. When a
/// [`SharedCache`] is attached, writes are mirrored into it and local
/// misses consult it; hits found there are promoted into the local maps.
#[derive(Debug)]
pub struct RuntimeCache {
    local: Mutex<Local>,
    shared: Option<Arc<dyn SharedCache>>,
    shared_available: OnceLock<bool>,
    ttl: Duration,
}

impl Default for RuntimeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeCache {
    /// Creates a purely local cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: Mutex::default(),
            shared: None,
            shared_available: OnceLock::new(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Creates a cache backed by a shared cache.
    #[must_use]
    pub fn with_shared(shared: Arc<dyn SharedCache>, ttl: Duration) -> Self {
        Self {
            shared: Some(shared),
            ttl,
            ..Self::new()
        }
    }

    /// Looks an id up locally, then in the shared cache.
    pub fn lookup(&self, id: EntityId) -> CacheLookup {
        {
            let local = self.local.lock();
            if let Some(entity) = local.entities.get(&id) {
                return CacheLookup::Hit(entity.clone());
            }
            if local.not_found.contains(&id) {
                return CacheLookup::Absent;
            }
        }

        let Some(shared) = self.shared() else {
            return CacheLookup::Unknown;
        };
        let Some(raw) = shared.get(&cache_key(id)) else {
            return CacheLookup::Unknown;
        };
        match serde_json::from_str::<CacheSlot>(&raw) {
            Ok(CacheSlot::Found(entity)) => {
                let mut local = self.local.lock();
                local.not_found.remove(&id);
                local.entities.insert(id, entity.clone());
                CacheLookup::Hit(entity)
            }
            Ok(CacheSlot::Absent) => {
                let mut local = self.local.lock();
                local.entities.remove(&id);
                local.not_found.insert(id);
                CacheLookup::Absent
            }
            Err(err) => {
                tracing::debug!(%id, error = %err, "discarding unreadable shared cache entry");
                shared.delete(&cache_key(id));
                CacheLookup::Unknown
            }
        }
    }

    /// Returns the cached entity.
    pub fn get(&self, id: EntityId) -> Option<Entity> {
        match self.lookup(id) {
            CacheLookup::Hit(entity) => Some(entity),
            CacheLookup::Absent | CacheLookup::Unknown => None,
        }
    }

    /// Caches an entity and clears any absent mark for it.
    pub fn set(&self, entity: Entity) {
        let id = entity.id();
        if let Some(shared) = self.shared() {
            self.mirror(shared.as_ref(), id, &CacheSlot::Found(entity.clone()));
        }
        let mut local = self.local.lock();
        local.not_found.remove(&id);
        local.entities.insert(id, entity);
    }

    /// Forgets everything about an id.
    pub fn delete(&self, id: EntityId) {
        {
            let mut local = self.local.lock();
            local.entities.remove(&id);
            local.not_found.remove(&id);
        }
        if let Some(shared) = self.shared() {
            shared.delete(&cache_key(id));
        }
    }

    /// Records that an id has no entity, dropping any cached one.
    pub fn mark_not_found(&self, id: EntityId) {
        {
            let mut local = self.local.lock();
            local.entities.remove(&id);
            local.not_found.insert(id);
        }
        if let Some(shared) = self.shared() {
            self.mirror(shared.as_ref(), id, &CacheSlot::Absent);
        }
    }

    /// Returns true if the id is marked absent.
    pub fn is_marked_not_found(&self, id: EntityId) -> bool {
        matches!(self.lookup(id), CacheLookup::Absent)
    }

    /// Returns true if the entity is cached locally.
    #[must_use]
    pub fn has(&self, id: EntityId) -> bool {
        self.local.lock().entities.contains_key(&id)
    }

    /// Caches many entities at once. Shared copies are not written.
    pub fn warmup(&self, entities: impl IntoIterator<Item = Entity>) {
        let mut local = self.local.lock();
        for entity in entities {
            local.not_found.remove(&entity.id());
            local.entities.insert(entity.id(), entity);
        }
    }

    /// Empties the local maps.
    pub fn clear(&self) {
        let mut local = self.local.lock();
        local.entities.clear();
        local.not_found.clear();
    }

    /// Empties the local maps and the shared group.
    pub fn flush(&self) {
        self.clear();
        if let Some(shared) = self.shared() {
            shared.flush_group();
        }
    }

    /// Returns local counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let local = self.local.lock();
        CacheStats {
            cached: local.entities.len(),
            not_found: local.not_found.len(),
            memory_bytes: local.entities.values().map(Entity::approximate_size).sum(),
        }
    }

    fn shared(&self) -> Option<&Arc<dyn SharedCache>> {
        let shared = self.shared.as_ref()?;
        let available = *self.shared_available.get_or_init(|| shared.is_available());
        available.then_some(shared)
    }

    fn mirror(&self, shared: &dyn SharedCache, id: EntityId, slot: &CacheSlot) {
        match serde_json::to_string(slot) {
            Ok(raw) => shared.set(&cache_key(id), raw, self.ttl),
            Err(err) => tracing::warn!(%id, error = %err, "could not mirror cache entry"),
        }
    }
}

fn cache_key(id: EntityId) -> String {
    format!("{KEY_PREFIX}{id}")
}
