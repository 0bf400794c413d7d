//! Cached attribute reads.

use crate::cache::CacheLookup;
use crate::context::ShadowContext;
use crate::entity::{Attributes, Entity, EntityId};
use crate::error::CoreResult;
use serde_json::Value;

/// Serves attribute reads from the runtime cache and shadow tables.
///
/// Misses are cached too: an id confirmed absent from its shadow table is
/// not looked up again until something writes it.
#[derive(Debug, Clone, Copy)]
pub struct ShadowReader<'a> {
    ctx: &'a ShadowContext,
}

impl<'a> ShadowReader<'a> {
    pub(crate) const fn new(ctx: &'a ShadowContext) -> Self {
        Self { ctx }
    }

    /// Loads an entity. Returns `None` if the type has no shadow table or
    /// the entity has no row.
    pub fn load(&self, id: EntityId, entity_type: &str) -> CoreResult<Option<Entity>> {
        let cache = self.ctx.cache();
        match cache.lookup(id) {
            CacheLookup::Hit(entity) => return Ok(Some(entity)),
            CacheLookup::Absent => return Ok(None),
            CacheLookup::Unknown => {}
        }
        if !self.ctx.table_exists(entity_type)? {
            return Ok(None);
        }

        match self.ctx.repository(entity_type)?.find(id)? {
            Some(entity) => {
                cache.set(entity.clone());
                Ok(Some(entity))
            }
            None => {
                cache.mark_not_found(id);
                Ok(None)
            }
        }
    }

    /// Returns one attribute value.
    pub fn attribute(&self, id: EntityId, entity_type: &str, key: &str) -> CoreResult<Option<Value>> {
        Ok(self
            .load(id, entity_type)?
            .and_then(|entity| entity.attribute(key).cloned()))
    }

    /// Returns every attribute of an entity.
    pub fn attributes(&self, id: EntityId, entity_type: &str) -> CoreResult<Option<Attributes>> {
        Ok(self
            .load(id, entity_type)?
            .map(|entity| entity.attributes().clone()))
    }

    /// Loads every id the cache knows nothing about in one query.
    ///
    /// Ids without a row are marked absent. Returns the number of entities
    /// loaded.
    pub fn preload(&self, ids: &[EntityId], entity_type: &str) -> CoreResult<usize> {
        let cache = self.ctx.cache();
        let unknown: Vec<EntityId> = ids
            .iter()
            .copied()
            .filter(|id| cache.lookup(*id) == CacheLookup::Unknown)
            .collect();
        if unknown.is_empty() || !self.ctx.table_exists(entity_type)? {
            return Ok(0);
        }

        let found = self.ctx.repository(entity_type)?.find_many(&unknown)?;
        for id in &unknown {
            if !found.contains_key(id) {
                cache.mark_not_found(*id);
            }
        }
        let loaded = found.len();
        cache.warmup(found.into_values());
        tracing::debug!(entity_type, requested = ids.len(), loaded, "preloaded entities");
        Ok(loaded)
    }
}
