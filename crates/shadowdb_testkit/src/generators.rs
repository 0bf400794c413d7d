//! Property-based test generators using proptest.
//!
//! Provides strategies for generating attribute data shaped like what a
//! source of truth really holds.

use proptest::prelude::*;
use serde_json::Value;
use shadowdb_core::{Attributes, Entity, EntityId, RawAttributes};

/// Strategy for entity ids small enough to collide in interesting ways.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    (1u64..10_000).prop_map(EntityId::new)
}

/// Strategy for entity type tags, including characters that table names
/// must normalize away.
pub fn entity_type_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for attribute keys.
pub fn attribute_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("_?[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for one stored attribute string. Never starts with `[` or `{`,
/// so it always reads back as a string.
pub fn raw_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 .%_-]{0,16}").expect("Invalid regex")
}

/// Strategy for the raw attributes of one record, one to three values
/// per key.
pub fn raw_attributes_strategy() -> impl Strategy<Value = RawAttributes> {
    prop::collection::btree_map(
        attribute_key_strategy(),
        prop::collection::vec(raw_value_strategy(), 1..4),
        0..6,
    )
}

/// Strategy for JSON attribute values, nested up to two levels.
pub fn attribute_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        raw_value_strategy().prop_map(Value::String),
        any::<i32>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(attribute_key_strategy(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for a complete attribute map.
pub fn attributes_strategy() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map(attribute_key_strategy(), attribute_value_strategy(), 0..6)
}

/// Strategy for entities of one type.
pub fn entity_strategy(entity_type: &'static str) -> impl Strategy<Value = Entity> {
    (entity_id_strategy(), raw_value_strategy(), attributes_strategy())
        .prop_map(move |(id, content, attributes)| Entity::new(id, entity_type, content, attributes))
}

/// Property test configuration.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrinking iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for tests that touch the database per case.
    #[must_use]
    pub fn database() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 50,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
