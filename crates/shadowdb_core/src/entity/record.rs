//! The shadowed entity value.

use crate::entity::EntityId;
use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute map of an entity.
pub type Attributes = BTreeMap<String, Value>;

/// One logical record plus its open attribute map.
///
/// Entities are immutable values. Attribute changes go through
/// [`Entity::with_attribute`] and [`Entity::without_attribute`], which return
/// a new entity and leave the original untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    entity_id: EntityId,
    entity_type: String,
    content: String,
    attributes: Attributes,
}

impl Entity {
    /// Creates an entity.
    #[must_use]
    pub fn new(
        entity_id: EntityId,
        entity_type: impl Into<String>,
        content: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            entity_id,
            entity_type: entity_type.into(),
            content: content.into(),
            attributes,
        }
    }

    /// Returns the entity ID.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.entity_id
    }

    /// Returns the entity type tag.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the opaque content blob.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns one attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns true if the attribute is present (even when its value is null).
    #[must_use]
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Returns a copy of this entity with `key` set to `value`.
    #[must_use]
    pub fn with_attribute(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.attributes.insert(key.into(), value);
        next
    }

    /// Returns a copy of this entity without `key`.
    #[must_use]
    pub fn without_attribute(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.attributes.remove(key);
        next
    }

    /// Encodes the attribute map as the JSON document stored in the shadow row.
    pub fn attributes_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(&self.attributes)?)
    }

    /// Rough heap footprint, used for cache statistics.
    #[must_use]
    pub fn approximate_size(&self) -> usize {
        let attributes: usize = self
            .attributes
            .iter()
            .map(|(key, value)| key.len() + value.to_string().len())
            .sum();
        std::mem::size_of::<Self>() + self.entity_type.len() + self.content.len() + attributes
    }
}
