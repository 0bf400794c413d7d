//! Flattening of attribute maps into lookup rows.

use crate::entity::Attributes;
use crate::predicate::value_text;
use serde_json::Value;

/// One lookup row: attribute key and its text value (`None` is SQL `NULL`).
pub type Leaf = (String, Option<String>);

/// Flattens an attribute map into `(key, scalar)` pairs.
///
/// Arrays and objects are expanded recursively and every scalar leaf is
/// emitted under the top-level key it was found under. Strings are kept
/// as-is, numbers use their JSON spelling, booleans become `1`/`0` and
/// null becomes `None`. Empty containers produce no rows.
#[must_use]
pub fn flatten_leaves(attributes: &Attributes) -> Vec<Leaf> {
    let mut leaves = Vec::new();
    for (key, value) in attributes {
        push_leaves(key, value, &mut leaves);
    }
    leaves
}

fn push_leaves(key: &str, value: &Value, out: &mut Vec<Leaf>) {
    match value {
        Value::Array(items) => {
            for item in items {
                push_leaves(key, item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                push_leaves(key, item, out);
            }
        }
        Value::Null => out.push((key.to_string(), None)),
        scalar => out.push((key.to_string(), Some(value_text(scalar)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn scalars() {
        let leaves = flatten_leaves(&attrs(json!({
            "a": "x",
            "b": 2.5,
            "c": true,
            "d": null
        })));
        assert_eq!(
            leaves,
            vec![
                ("a".to_string(), Some("x".to_string())),
                ("b".to_string(), Some("2.5".to_string())),
                ("c".to_string(), Some("1".to_string())),
                ("d".to_string(), None),
            ]
        );
    }

    #[test]
    fn nested_values_share_the_key() {
        let leaves = flatten_leaves(&attrs(json!({
            "colors": ["red", ["green", {"x": "blue"}]],
            "empty": []
        })));
        assert_eq!(
            leaves,
            vec![
                ("colors".to_string(), Some("red".to_string())),
                ("colors".to_string(), Some("green".to_string())),
                ("colors".to_string(), Some("blue".to_string())),
            ]
        );
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(Value::String),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn count_scalars(value: &Value) -> usize {
        match value {
            Value::Array(items) => items.iter().map(count_scalars).sum(),
            Value::Object(map) => map.values().map(count_scalars).sum(),
            _ => 1,
        }
    }

    proptest! {
        #[test]
        fn one_leaf_per_scalar(map in prop::collection::btree_map("[a-z_]{1,6}", json_value(), 0..6)) {
            let expected: usize = map.values().map(count_scalars).sum();
            let leaves = flatten_leaves(&map);
            prop_assert_eq!(leaves.len(), expected);
            for (key, _) in &leaves {
                prop_assert!(map.contains_key(key));
            }
        }
    }
}
