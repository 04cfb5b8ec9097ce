//! JSON body model: deep-key lookups, primitive flattening, and the
//! non-destructive dotted-path set used by the mutation generator.
//!
//! `serde_json` is built with `preserve_order`, so objects keep insertion
//! order and re-serialization is deterministic.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null
    )
}

/// DFS over objects and arrays; true if any object node has `key` as an own
/// key. The key is matched literally, dots included.
pub fn contains_key_deep(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key(key) || map.values().any(|v| contains_key_deep(v, key))
        }
        Value::Array(items) => items.iter().any(|v| contains_key_deep(v, key)),
        _ => false,
    }
}

/// Dotted keys traverse object children segment by segment and return the
/// terminal value iff it is primitive. Bare keys DFS for the first object
/// node carrying the key with a primitive value.
pub fn get_primitive_deep<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    if key.contains('.') {
        let mut cursor = value;
        for segment in key.split('.') {
            cursor = cursor.as_object()?.get(segment)?;
        }
        return is_primitive(cursor).then_some(cursor);
    }
    match value {
        Value::Object(map) => {
            if let Some(v) = map.get(key)
                && is_primitive(v)
            {
                return Some(v);
            }
            map.values().find_map(|v| get_primitive_deep(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| get_primitive_deep(v, key)),
        _ => None,
    }
}

/// Flatten every primitive in the tree to `path -> stringified value`.
/// Paths use `a.b` for object descent and `a[i]` for array indices.
pub fn get_all_primitives(value: &Value, prefix: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    collect_primitives(value, prefix, &mut out);
    out
}

fn collect_primitives(value: &Value, path: &str, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_primitives(child, &child_path, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_primitives(child, &format!("{path}[{index}]"), out);
            }
        }
        primitive => {
            out.insert(path.to_string(), safe_stringify(primitive));
        }
    }
}

/// Return a fresh object with `path` created or overwritten. Intermediate
/// non-object nodes are replaced by fresh objects; siblings are preserved.
pub fn set_deep(obj: &Map<String, Value>, path: &str, value: Value) -> Map<String, Value> {
    let segments: Vec<&str> = path.split('.').collect();
    set_path(obj, &segments, value)
}

fn set_path(map: &Map<String, Value>, segments: &[&str], value: Value) -> Map<String, Value> {
    let mut out = map.clone();
    match segments {
        [] => out,
        [leaf] => {
            out.insert((*leaf).to_string(), value);
            out
        }
        [head, rest @ ..] => {
            let child = match out.get(*head).and_then(Value::as_object) {
                Some(existing) => set_path(existing, rest, value),
                None => set_path(&Map::new(), rest, value),
            };
            out.insert((*head).to_string(), Value::Object(child));
            out
        }
    }
}

/// The single stringification used for finding labels and value equality.
/// Primitives render like their JavaScript `String(..)` counterparts;
/// objects and arrays render as canonical JSON.
pub fn safe_stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => stringify_number(n),
        Value::String(s) => s.clone(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

fn stringify_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // Whole floats print without the trailing ".0" serde_json would emit.
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
            format!("{}", f as i64)
        }
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().expect("test fixture is an object").clone()
    }

    #[test]
    fn contains_key_deep_finds_nested_keys() {
        let v = json!({"user": {"profile": {"isAdmin": false}}, "items": [{"role": "x"}]});
        assert!(contains_key_deep(&v, "isAdmin"));
        assert!(contains_key_deep(&v, "role"));
        assert!(!contains_key_deep(&v, "plan"));
    }

    #[test]
    fn contains_key_deep_matches_dotted_keys_literally() {
        let v = json!({"a": {"b": 1}});
        assert!(!contains_key_deep(&v, "a.b"));
        let literal = json!({"a.b": 1});
        assert!(contains_key_deep(&literal, "a.b"));
    }

    #[test]
    fn get_primitive_deep_prefers_first_primitive_carrier() {
        let v = json!({"outer": {"count": {"nested": true}}, "list": [{"count": 3}]});
        assert_eq!(get_primitive_deep(&v, "count"), Some(&json!(3)));
    }

    #[test]
    fn get_primitive_deep_dotted_path_traverses_objects_only() {
        let v = json!({"user": {"plan": "free", "meta": [1, 2]}});
        assert_eq!(get_primitive_deep(&v, "user.plan"), Some(&json!("free")));
        assert_eq!(get_primitive_deep(&v, "user.meta"), None);
        assert_eq!(get_primitive_deep(&v, "user.meta.0"), None);
    }

    #[test]
    fn get_primitive_deep_rejects_composite_terminal() {
        let v = json!({"user": {"roles": ["admin"]}});
        assert_eq!(get_primitive_deep(&v, "user.roles"), None);
    }

    #[test]
    fn flatten_uses_dot_and_index_paths() {
        let v = json!({"a": {"b": 1}, "list": [true, {"c": "x"}]});
        let flat = get_all_primitives(&v, "");
        assert_eq!(flat.get("a.b").map(String::as_str), Some("1"));
        assert_eq!(flat.get("list[0]").map(String::as_str), Some("true"));
        assert_eq!(flat.get("list[1].c").map(String::as_str), Some("x"));
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn set_deep_creates_missing_path_and_keeps_siblings() {
        let base = obj(json!({"username": "u", "plan": "free"}));
        let mutated = set_deep(&base, "profile.isAdmin", json!(true));
        assert_eq!(mutated["username"], json!("u"));
        assert_eq!(mutated["plan"], json!("free"));
        assert_eq!(mutated["profile"]["isAdmin"], json!(true));
        // The input object is untouched.
        assert!(!base.contains_key("profile"));
    }

    #[test]
    fn set_deep_replaces_non_object_intermediates() {
        let base = obj(json!({"a": 1}));
        let mutated = set_deep(&base, "a.b", json!("x"));
        assert_eq!(mutated["a"]["b"], json!("x"));
    }

    #[test]
    fn set_deep_then_get_primitive_deep_round_trips() {
        let base = obj(json!({"keep": 1}));
        for (path, value) in [
            ("role", json!("admin")),
            ("user.tier", json!(2)),
            ("deep.a.b", json!(true)),
        ] {
            let mutated = Value::Object(set_deep(&base, path, value.clone()));
            let got = get_primitive_deep(&mutated, path).expect("value at path");
            assert_eq!(safe_stringify(got), safe_stringify(&value));
        }
    }

    #[test]
    fn flatten_round_trips_through_set_deep() {
        let v = json!({"a": {"b": "x", "c": 2}, "flag": false});
        let flat = get_all_primitives(&v, "");
        let mut rebuilt = Map::new();
        for (path, raw) in &flat {
            rebuilt = set_deep(&rebuilt, path, Value::String(raw.clone()));
        }
        let reflat = get_all_primitives(&Value::Object(rebuilt), "");
        assert_eq!(flat, reflat);
    }

    #[test]
    fn safe_stringify_matches_primitive_to_string() {
        assert_eq!(safe_stringify(&json!(null)), "null");
        assert_eq!(safe_stringify(&json!(true)), "true");
        assert_eq!(safe_stringify(&json!(1)), "1");
        assert_eq!(safe_stringify(&json!(2.5)), "2.5");
        assert_eq!(safe_stringify(&json!(3.0)), "3");
        assert_eq!(safe_stringify(&json!("admin")), "admin");
        assert_eq!(safe_stringify(&json!({"a": 1})), "{\"a\":1}");
        assert_eq!(safe_stringify(&json!([1, "x"])), "[1,\"x\"]");
    }

    #[test]
    fn stringification_unifies_numeric_strings_and_numbers() {
        assert_eq!(safe_stringify(&json!("1")), safe_stringify(&json!(1)));
    }
}
