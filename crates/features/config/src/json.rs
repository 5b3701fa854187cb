//! Path navigation, deep merge and structural diff over `serde_json::Value`.

use crate::error::ConfigError;
use crate::path::ConfigPath;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structural difference between two documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum JsonChange {
    Added {
        path: String,
        #[cfg_attr(feature = "server", schema(value_type = Object))]
        value: Value,
    },
    Removed {
        path: String,
        #[cfg_attr(feature = "server", schema(value_type = Object))]
        value: Value,
    },
    Modified {
        path: String,
        #[cfg_attr(feature = "server", schema(value_type = Object))]
        from: Value,
        #[cfg_attr(feature = "server", schema(value_type = Object))]
        to: Value,
    },
}

impl JsonChange {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Modified { path, .. } => {
                path
            },
        }
    }
}

fn index(segment: &str, len: usize, path: &ConfigPath) -> Result<usize, ConfigError> {
    let idx: usize = segment.parse().map_err(|_| ConfigError::TypeConflict {
        message: format!("'{segment}' is not an array index in '{path}'").into(),
        context: None,
    })?;
    if idx > len {
        return Err(ConfigError::IndexOutOfRange {
            message: format!("{idx} > {len} in '{path}'").into(),
            context: None,
        });
    }
    Ok(idx)
}

fn conflict(segment: &str, path: &ConfigPath) -> ConfigError {
    ConfigError::TypeConflict {
        message: format!("'{segment}' in '{path}' goes through a scalar").into(),
        context: None,
    }
}

/// Borrow the value at `path`.
#[must_use]
pub fn pointer<'a>(root: &'a Value, path: &ConfigPath) -> Option<&'a Value> {
    path.segments().iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Stores `value` at `path`, creating intermediate objects.
///
/// In arrays, an index equal to the length appends.
///
/// # Errors
/// [`ConfigError::TypeConflict`] when a parent is a scalar or a non-numeric segment
/// addresses an array; [`ConfigError::IndexOutOfRange`] past the end of an array.
pub fn set(root: &mut Value, path: &ConfigPath, value: Value) -> Result<(), ConfigError> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => {
                map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()))
            },
            Value::Array(items) => {
                let idx = index(segment, items.len(), path)?;
                if idx == items.len() {
                    items.push(Value::Object(Map::new()));
                }
                &mut items[idx]
            },
            _ => return Err(conflict(segment, path)),
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(last.to_owned(), value);
        },
        Value::Array(items) => {
            let idx = index(last, items.len(), path)?;
            if idx == items.len() {
                items.push(value);
            } else {
                items[idx] = value;
            }
        },
        _ => return Err(conflict(last, path)),
    }
    Ok(())
}

/// Removes the value at `path`; returns it if it existed. Removing the root empties it.
pub fn remove(root: &mut Value, path: &ConfigPath) -> Option<Value> {
    let Some((last, parents)) = path.split_last() else {
        return Some(std::mem::replace(root, Value::Object(Map::new())));
    };

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => {
            let idx = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
            Some(items.remove(idx))
        },
        _ => None,
    }
}

/// Deep merge: objects merge key by key, anything else replaces the target.
pub fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    },
                }
            }
        },
        (target, patch) => *target = patch,
    }
}

/// Changes that turn `old` into `new`, depth first, object keys in `new` order after
/// removals.
#[must_use]
pub fn json_diff(old: &Value, new: &Value) -> Vec<JsonChange> {
    let mut changes = Vec::new();
    diff_into(&ConfigPath::root(), old, new, &mut changes);
    changes
}

fn diff_into(path: &ConfigPath, old: &Value, new: &Value, out: &mut Vec<JsonChange>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in a {
                if !b.contains_key(key) {
                    out.push(JsonChange::Removed {
                        path: path.join(key.clone()).to_string(),
                        value: value.clone(),
                    });
                }
            }
            for (key, value) in b {
                let child = path.join(key.clone());
                match a.get(key) {
                    Some(previous) => diff_into(&child, previous, value, out),
                    None => out.push(JsonChange::Added { path: child.to_string(), value: value.clone() }),
                }
            }
        },
        (Value::Array(a), Value::Array(b)) => {
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                diff_into(&path.join(i.to_string()), x, y, out);
            }
            for (i, value) in a.iter().enumerate().skip(b.len()) {
                out.push(JsonChange::Removed {
                    path: path.join(i.to_string()).to_string(),
                    value: value.clone(),
                });
            }
            for (i, value) in b.iter().enumerate().skip(a.len()) {
                out.push(JsonChange::Added {
                    path: path.join(i.to_string()).to_string(),
                    value: value.clone(),
                });
            }
        },
        (a, b) if a != b => out.push(JsonChange::Modified {
            path: path.to_string(),
            from: a.clone(),
            to: b.clone(),
        }),
        _ => {},
    }
}

/// Expands dotted object keys into nested objects, recursively.
///
/// `{"a.b": 1, "a": {"c": 2}}` becomes `{"a": {"b": 1, "c": 2}}`.
#[must_use]
pub fn tidy(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Value::Object(Map::new());
            for (key, child) in map {
                let child = tidy(child);
                let mut nested = child;
                for part in key.split('.').filter(|p| !p.is_empty()).rev() {
                    let mut wrapper = Map::new();
                    wrapper.insert(part.to_owned(), nested);
                    nested = Value::Object(wrapper);
                }
                merge(&mut out, nested);
            }
            out
        },
        Value::Array(items) => Value::Array(items.into_iter().map(tidy).collect()),
        other => other,
    }
}

/// Paths of every leaf (scalars, empty objects and empty arrays), in document order.
#[must_use]
pub fn leaf_paths(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_leaves(&ConfigPath::root(), value, &mut out);
    out
}

fn collect_leaves(path: &ConfigPath, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect_leaves(&path.join(key.clone()), child, out);
            }
        },
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                collect_leaves(&path.join(i.to_string()), child, out);
            }
        },
        _ if !path.is_root() => out.push(path.to_string()),
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn p(raw: &str) -> ConfigPath {
        ConfigPath::parse(raw).unwrap()
    }

    #[test]
    fn set_creates_intermediates_and_appends() {
        let mut doc = json!({});
        set(&mut doc, &p("server/ssl/cert"), json!("cert.pem")).unwrap();
        set(&mut doc, &p("targets"), json!([])).unwrap();
        set(&mut doc, &p("targets/0/name"), json!("M31")).unwrap();
        set(&mut doc, &p("targets/1"), json!("M42")).unwrap();
        assert_eq!(
            doc,
            json!({ "server": { "ssl": { "cert": "cert.pem" } }, "targets": [{ "name": "M31" }, "M42"] })
        );

        assert!(matches!(set(&mut doc, &p("targets/5"), json!(1)), Err(ConfigError::IndexOutOfRange { .. })));
        assert!(matches!(set(&mut doc, &p("targets/x"), json!(1)), Err(ConfigError::TypeConflict { .. })));
        assert!(matches!(
            set(&mut doc, &p("server/ssl/cert/path"), json!(1)),
            Err(ConfigError::TypeConflict { .. })
        ));
    }

    #[test]
    fn pointer_and_remove() {
        let mut doc = json!({ "a": { "b": [10, 20, 30] } });
        assert_eq!(pointer(&doc, &p("a.b.1")), Some(&json!(20)));
        assert_eq!(pointer(&doc, &p("a/b/9")), None);
        assert_eq!(remove(&mut doc, &p("a/b/0")), Some(json!(10)));
        assert_eq!(doc, json!({ "a": { "b": [20, 30] } }));
        assert_eq!(remove(&mut doc, &p("a/zzz")), None);
        assert_eq!(remove(&mut doc, &ConfigPath::root()), Some(json!({ "a": { "b": [20, 30] } })));
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn merge_is_deep_for_objects_only() {
        let mut doc = json!({ "camera": { "gain": 100, "offset": 10 }, "filters": ["L", "R"] });
        merge(&mut doc, json!({ "camera": { "gain": 200 }, "filters": ["Ha"], "site": "home" }));
        assert_eq!(
            doc,
            json!({ "camera": { "gain": 200, "offset": 10 }, "filters": ["Ha"], "site": "home" })
        );
    }

    #[test]
    fn diff_reports_paths() {
        let old = json!({ "a": 1, "b": { "c": true }, "list": [1, 2, 3] });
        let new = json!({ "a": 2, "b": { "c": true, "d": null }, "list": [1] });
        let changes = json_diff(&old, &new);
        assert_eq!(
            changes,
            vec![
                JsonChange::Modified { path: "a".to_owned(), from: json!(1), to: json!(2) },
                JsonChange::Added { path: "b/d".to_owned(), value: json!(null) },
                JsonChange::Removed { path: "list/1".to_owned(), value: json!(2) },
                JsonChange::Removed { path: "list/2".to_owned(), value: json!(3) },
            ]
        );
        assert!(json_diff(&new, &new).is_empty());
        assert_eq!(serde_json::to_value(&changes[0]).unwrap()["op"], "modified");
    }

    #[test]
    fn tidy_expands_dotted_keys() {
        let messy = json!({ "a.b": 1, "a": { "c": 2 }, "list": [{ "x.y": true }] });
        assert_eq!(tidy(messy), json!({ "a": { "b": 1, "c": 2 }, "list": [{ "x": { "y": true } }] }));
    }

    #[test]
    fn leaves_include_empty_containers() {
        let doc = json!({ "a": { "b": 1, "c": [] }, "d": [true, {}] });
        assert_eq!(leaf_paths(&doc), vec!["a/b", "a/c", "d/0", "d/1"]);
    }

    proptest! {
        #[test]
        fn merge_then_diff_only_touches_patch_keys(
            base in proptest::collection::btree_map("[a-d]", 0i64..5, 0..4),
            patch in proptest::collection::btree_map("[c-f]", 0i64..5, 0..4),
        ) {
            let old = serde_json::to_value(&base).unwrap();
            let mut merged = old.clone();
            merge(&mut merged, serde_json::to_value(&patch).unwrap());
            for change in json_diff(&old, &merged) {
                prop_assert!(patch.contains_key(change.path()));
                prop_assert!(!matches!(change, JsonChange::Removed { .. }));
            }
        }
    }
}
