//! Structural diffing and merging over JSON snapshots.
//!
//! Agents publish only what changed: after each mutation the new snapshot is
//! diffed against the previous one and the changed sub-paths go out. The
//! inverse (`apply`) exists so the diff contract is testable, and
//! `merge_existing` implements the field-wise merge YXC events use.

use serde_json::{Map, Value};

/// Compute the changed paths from `old` to `new`.
///
/// Objects are compared key by key and recursed; arrays compare as multisets
/// (ordered `(url, metadata)` pairs reordering without membership change is
/// not a difference); everything else compares by equality and the new value
/// is emitted. Returns `None` when nothing changed.
///
/// A key present in `old` but gone from `new` is encoded as `null`, and
/// [`apply`] deletes it. For `apply(old, diff(old, new)) == new` to hold the
/// inputs must not carry null-valued members themselves; [`strip_nulls`]
/// produces that form, and state snapshots are already stripped.
pub fn diff(old: &Value, new: &Value) -> Option<Value> {
    if old == new {
        return None;
    }

    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut changes = Map::new();
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) => {
                        if let Some(changed) = diff(old_value, new_value) {
                            changes.insert(key.clone(), changed);
                        }
                    }
                    None => {
                        changes.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    changes.insert(key.clone(), Value::Null);
                }
            }
            if changes.is_empty() {
                None
            } else {
                Some(Value::Object(changes))
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            if equal_as_multisets(old_items, new_items) {
                None
            } else {
                Some(new.clone())
            }
        }
        _ => Some(new.clone()),
    }
}

/// Apply a diff produced by [`diff`] to a base snapshot.
///
/// A `null` change deletes the key, matching the differ's removal encoding.
pub fn apply(base: &Value, changes: &Value) -> Value {
    match (base, changes) {
        (Value::Object(base_map), Value::Object(change_map)) => {
            let mut result = base_map.clone();
            for (key, change) in change_map {
                if change.is_null() {
                    result.remove(key);
                    continue;
                }
                let merged = match result.get(key) {
                    Some(existing) if existing.is_object() && change.is_object() => {
                        apply(existing, change)
                    }
                    _ => change.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        _ => changes.clone(),
    }
}

/// Recursively drop null-valued object members.
///
/// Snapshots fed to [`diff`] are stripped so that `null` in a diff always
/// means the key was removed.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                strip_nulls(v);
            }
        }
        _ => {}
    }
}

/// Merge `patch` into `target`, overwriting only keys `target` already has.
///
/// Nested objects recurse; keys the target does not carry are ignored.
pub fn merge_existing(target: &mut Value, patch: &Value) {
    let (target_map, patch_map) = match (target.as_object_mut(), patch.as_object()) {
        (Some(t), Some(p)) => (t, p),
        _ => return,
    };

    for (key, patch_value) in patch_map {
        if let Some(existing) = target_map.get_mut(key) {
            if existing.is_object() && patch_value.is_object() {
                merge_existing(existing, patch_value);
            } else {
                *existing = patch_value.clone();
            }
        }
    }
}

fn equal_as_multisets(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for item in a {
        match b
            .iter()
            .enumerate()
            .find(|(i, candidate)| !used[*i] && *candidate == item)
        {
            Some((i, _)) => used[i] = true,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_values_produce_no_diff() {
        let value = json!({"a": 1, "b": {"c": [1, 2]}});
        assert_eq!(diff(&value, &value), None);
    }

    #[test]
    fn changed_leaves_only() {
        let old = json!({"status": {"volume": 30, "power": "on"}, "host": "h"});
        let new = json!({"status": {"volume": 42, "power": "on"}, "host": "h"});

        assert_eq!(diff(&old, &new), Some(json!({"status": {"volume": 42}})));
    }

    #[test]
    fn new_and_removed_keys() {
        let old = json!({"a": 1});
        let new = json!({"b": 2});
        assert_eq!(diff(&old, &new), Some(json!({"a": null, "b": 2})));
    }

    #[test]
    fn arrays_compare_as_multisets() {
        let old = json!({"items": [["u1", {"t": 1}], ["u2", {"t": 2}]]});
        let reordered = json!({"items": [["u2", {"t": 2}], ["u1", {"t": 1}]]});
        let changed = json!({"items": [["u1", {"t": 1}], ["u3", {"t": 3}]]});

        assert_eq!(diff(&old, &reordered), None);
        assert_eq!(
            diff(&old, &changed),
            Some(json!({"items": [["u1", {"t": 1}], ["u3", {"t": 3}]]}))
        );
    }

    #[test]
    fn apply_reconstructs_new_state() {
        let cases = [
            (json!({"a": 1, "b": {"c": 2}}), json!({"a": 1, "b": {"c": 3}})),
            (json!({"a": 1}), json!({"a": 1, "b": 2})),
            (json!({"a": {"x": 1}}), json!({"a": "scalar"})),
            (json!({}), json!({"a": {"deep": {"er": 5}}})),
            (
                json!({"q": {"items": []}}),
                json!({"q": {"media_url": "u1", "items": [["u1", {}]]}}),
            ),
            // Removed keys: the diff encodes them as null and apply deletes.
            (json!({"a": 1, "b": 2}), json!({"a": 1})),
            (
                json!({"status": {"volume": 30, "tone_control": {"mode": "manual"}}}),
                json!({"status": {"volume": 30}}),
            ),
            (json!({"a": 1}), json!({"b": 2})),
        ];

        for (old, new) in cases {
            match diff(&old, &new) {
                Some(changes) => assert_eq!(apply(&old, &changes), new, "old={old} new={new}"),
                None => assert_eq!(old, new),
            }
        }
    }

    #[test]
    fn strip_nulls_removes_members_recursively() {
        let mut value = json!({
            "power": "on",
            "input": null,
            "equalizer": {"low": 0, "mode": null},
            "queue": [["u1", {"title": null, "id": "1"}]]
        });
        strip_nulls(&mut value);
        assert_eq!(
            value,
            json!({
                "power": "on",
                "equalizer": {"low": 0},
                "queue": [["u1", {"id": "1"}]]
            })
        );
    }

    #[test]
    fn merge_existing_ignores_unknown_keys() {
        let mut target = json!({"volume": 30, "power": "on"});
        merge_existing(&mut target, &json!({"volume": 42, "brand_new": true}));
        assert_eq!(target, json!({"volume": 42, "power": "on"}));
    }

    #[test]
    fn merge_existing_recurses_into_nested_maps() {
        let mut target = json!({"equalizer": {"low": 0, "high": 2}, "volume": 10});
        merge_existing(&mut target, &json!({"equalizer": {"low": -3, "bogus": 9}}));
        assert_eq!(target, json!({"equalizer": {"low": -3, "high": 2}, "volume": 10}));
    }

    #[test]
    fn merge_existing_overwrites_null_fields() {
        let mut target = json!({"input": null, "volume": 10});
        merge_existing(&mut target, &json!({"input": "bluetooth"}));
        assert_eq!(target, json!({"input": "bluetooth", "volume": 10}));
    }
}
