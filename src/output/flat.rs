//! Flat-key form of JSON trees
//!
//! `{"a": {"b": [{"c": 1}]}}` flattens to `{"a.b.[0].c": 1}`. Dotted
//! segments are object keys; bracketed integers are array indices. Empty
//! objects and arrays have no leaves and disappear.

use super::path::join;
use crate::error::TransformError;
use serde_json::{Map, Value};

/// Ordered flat mapping from dotted path to leaf
pub type FlatMap = Map<String, Value>;

pub fn flatten(value: &Value) -> FlatMap {
    let mut out = FlatMap::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, path: String, out: &mut FlatMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, join(&path, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, join(&path, &format!("[{}]", index)), out);
            }
        }
        leaf => {
            out.insert(path, leaf.clone());
        }
    }
}

enum Key<'a> {
    Member(&'a str),
    Index(usize),
}

fn parse_segment(segment: &str) -> Key<'_> {
    segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.parse().ok())
        .map(Key::Index)
        .unwrap_or(Key::Member(segment))
}

/// Rebuild the tree. Array elements must be created in index order.
pub fn unflatten(flat: &FlatMap) -> Result<Value, TransformError> {
    let mut root: Option<Value> = None;
    for (path, leaf) in flat {
        let segments: Vec<&str> = path.split('.').collect();
        match root.as_mut() {
            None => root = Some(branch(&segments, leaf.clone(), path)?),
            Some(tree) => merge(tree, &segments, leaf.clone(), path)?,
        }
    }
    Ok(root.unwrap_or_else(|| Value::Object(Map::new())))
}

/// A fresh subtree holding only `leaf`
fn branch(segments: &[&str], leaf: Value, path: &str) -> Result<Value, TransformError> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(leaf);
    };
    let child = branch(rest, leaf, path)?;
    match parse_segment(first) {
        Key::Index(0) => Ok(Value::Array(vec![child])),
        Key::Index(index) => Err(TransformError::IndexOutOfOrder {
            path: path.to_string(),
            index,
            len: 0,
        }),
        Key::Member(name) => {
            let mut map = Map::new();
            map.insert(name.to_string(), child);
            Ok(Value::Object(map))
        }
    }
}

fn merge(tree: &mut Value, segments: &[&str], leaf: Value, path: &str) -> Result<(), TransformError> {
    let conflict = || TransformError::ShapeConflict {
        path: path.to_string(),
    };
    let Some((first, rest)) = segments.split_first() else {
        return Err(conflict());
    };

    match (parse_segment(first), tree) {
        (Key::Index(index), Value::Array(items)) => {
            let len = items.len();
            if index < len {
                merge(&mut items[index], rest, leaf, path)
            } else if index == len {
                items.push(branch(rest, leaf, path)?);
                Ok(())
            } else {
                Err(TransformError::IndexOutOfOrder {
                    path: path.to_string(),
                    index,
                    len,
                })
            }
        }
        (Key::Member(name), Value::Object(map)) => match map.get_mut(name) {
            Some(child) => merge(child, rest, leaf, path),
            None => {
                map.insert(name.to_string(), branch(rest, leaf, path)?);
                Ok(())
            }
        },
        _ => Err(conflict()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested() {
        let flat = flatten(&json!({"a": {"b": [{"c": 1}, 2]}, "d": "x"}));
        let keys: Vec<_> = flat.keys().cloned().collect();
        assert_eq!(keys, vec!["a.b.[0].c", "a.b.[1]", "d"]);
        assert_eq!(flat["a.b.[1]"], 2);
    }

    #[test]
    fn test_unflatten_rebuilds_arrays() {
        let mut flat = FlatMap::new();
        flat.insert("a.b.[0].c".into(), json!(1));
        flat.insert("a.b.[0].d".into(), json!(2));
        flat.insert("a.b.[1]".into(), json!("x"));
        flat.insert("top".into(), json!(null));

        assert_eq!(
            unflatten(&flat).unwrap(),
            json!({"a": {"b": [{"c": 1, "d": 2}, "x"]}, "top": null})
        );
    }

    #[test]
    fn test_unflatten_skipped_index_is_error() {
        let mut flat = FlatMap::new();
        flat.insert("a.[0]".into(), json!(1));
        flat.insert("a.[2]".into(), json!(3));
        assert!(matches!(
            unflatten(&flat),
            Err(TransformError::IndexOutOfOrder { index: 2, len: 1, .. })
        ));

        let mut flat = FlatMap::new();
        flat.insert("a.[1]".into(), json!(1));
        assert!(unflatten(&flat).is_err());
    }

    #[test]
    fn test_unflatten_shape_conflict() {
        let mut flat = FlatMap::new();
        flat.insert("a".into(), json!(1));
        flat.insert("a.b".into(), json!(2));
        assert!(matches!(
            unflatten(&flat),
            Err(TransformError::ShapeConflict { .. })
        ));
    }

    #[test]
    fn test_empty_is_empty_object() {
        assert_eq!(unflatten(&FlatMap::new()).unwrap(), json!({}));
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
        ]
    }

    /// Trees without empty containers survive a flatten/unflatten cycle
    fn tree() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 1..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_object_trees_rebuild(
            entries in prop::collection::btree_map("[a-z]{1,4}", tree(), 1..4)
        ) {
            let original = Value::Object(entries.into_iter().collect());
            prop_assert_eq!(unflatten(&flatten(&original)).unwrap(), original);
        }
    }
}
