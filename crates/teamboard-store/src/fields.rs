//! Field-level write primitives shared by the backends: server timestamps,
//! deep merge, and set-union array operations.

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::models::{DocPath, Fields};

const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// Placeholder replaced by the store's authoritative clock when the write is
/// applied. Use it for any ordering-sensitive timestamp so that skewed client
/// clocks cannot reorder records.
pub fn server_timestamp() -> Value {
    let mut map = serde_json::Map::new();
    map.insert(SERVER_TIMESTAMP_KEY.to_string(), Value::Bool(true));
    Value::Object(map)
}

fn is_server_timestamp(value: &Value) -> bool {
    matches!(value, Value::Object(map) if is_placeholder_map(map))
}

/// Replace every server-timestamp placeholder (including inside nested maps)
/// with `now`.
pub(crate) fn resolve_server_timestamps(fields: &mut Fields, now: i64) {
    for value in fields.values_mut() {
        resolve_value(value, now);
    }
}

fn resolve_value(value: &mut Value, now: i64) {
    if is_server_timestamp(value) {
        *value = Value::from(now);
    } else if let Value::Object(map) = value {
        for nested in map.values_mut() {
            resolve_value(nested, now);
        }
    }
}

/// Merge `patch` into `target`. Nested maps merge recursively; every other
/// value (arrays included) overwrites. Fields absent from `patch` are kept.
pub(crate) fn deep_merge(target: &mut Fields, patch: Fields) {
    for (key, incoming) in patch {
        match incoming {
            Value::Object(nested) if !is_placeholder_map(&nested) => {
                if let Some(Value::Object(existing)) = target.get_mut(&key) {
                    deep_merge(existing, nested);
                } else {
                    target.insert(key, Value::Object(nested));
                }
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}

fn is_placeholder_map(map: &Fields) -> bool {
    map.len() == 1 && map.get(SERVER_TIMESTAMP_KEY) == Some(&Value::Bool(true))
}

fn array_field<'a>(fields: &'a mut Fields, path: &DocPath, field: &str) -> Result<&'a mut Vec<Value>> {
    let slot = fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(items) => Ok(items),
        _ => Err(StoreError::NotAnArray {
            path: path.to_string(),
            field: field.to_string(),
        }),
    }
}

/// Append `element` unless an equal element is already present.
/// Returns whether the array changed.
pub(crate) fn array_union(fields: &mut Fields, path: &DocPath, field: &str, element: Value) -> Result<bool> {
    let items = array_field(fields, path, field)?;
    if items.contains(&element) {
        return Ok(false);
    }
    items.push(element);
    Ok(true)
}

/// Remove every element equal to `element`. Returns whether the array changed.
pub(crate) fn array_remove(fields: &mut Fields, path: &DocPath, field: &str, element: &Value) -> Result<bool> {
    let items = array_field(fields, path, field)?;
    let before = items.len();
    items.retain(|item| item != element);
    Ok(items.len() != before)
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Authoritative write clock: epoch millis, strictly increasing per store
/// even when several writes land within the same millisecond.
#[derive(Debug, Default)]
pub(crate) struct ServerClock {
    last: i64,
}

impl ServerClock {
    pub(crate) fn starting_after(last: i64) -> Self {
        Self { last }
    }

    pub(crate) fn stamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectionPath;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn path() -> DocPath {
        CollectionPath::new("tasks").doc("t1")
    }

    #[test]
    fn test_resolve_nested_timestamps() {
        let mut f = fields(json!({
            "createdAt": server_timestamp(),
            "meta": { "touched": server_timestamp() },
            "text": "hi"
        }));
        resolve_server_timestamps(&mut f, 42);
        assert_eq!(f["createdAt"], 42);
        assert_eq!(f["meta"]["touched"], 42);
        assert_eq!(f["text"], "hi");
    }

    #[test]
    fn test_deep_merge_keeps_unsupplied_fields() {
        let mut target = fields(json!({
            "participantNames": { "a": "Alice", "b": "Bob" },
            "participants": ["a", "b"]
        }));
        deep_merge(
            &mut target,
            fields(json!({
                "participantNames": { "a": "Al" },
                "updatedAt": 7
            })),
        );
        assert_eq!(target["participantNames"]["a"], "Al");
        assert_eq!(target["participantNames"]["b"], "Bob");
        assert_eq!(target["updatedAt"], 7);
    }

    #[test]
    fn test_merge_replaces_timestamp_with_placeholder() {
        let mut target = fields(json!({ "updatedAt": 5 }));
        deep_merge(&mut target, fields(json!({ "updatedAt": server_timestamp() })));
        resolve_server_timestamps(&mut target, 9);
        assert_eq!(target["updatedAt"], 9);
    }

    #[test]
    fn test_array_union_is_idempotent() {
        let mut f = fields(json!({ "members": ["u1"] }));
        assert!(array_union(&mut f, &path(), "members", json!("u2")).unwrap());
        assert!(!array_union(&mut f, &path(), "members", json!("u2")).unwrap());
        assert_eq!(f["members"], json!(["u1", "u2"]));
    }

    #[test]
    fn test_array_union_creates_missing_field() {
        let mut f = Fields::new();
        array_union(&mut f, &path(), "comments", json!({ "text": "x" })).unwrap();
        assert_eq!(f["comments"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_array_ops_reject_scalars() {
        let mut f = fields(json!({ "members": 3 }));
        assert!(matches!(
            array_union(&mut f, &path(), "members", json!("u1")),
            Err(StoreError::NotAnArray { .. })
        ));
        assert!(array_remove(&mut f, &path(), "members", &json!("u1")).is_err());
    }

    #[test]
    fn test_array_remove() {
        let mut f = fields(json!({ "members": ["u1", "u2"] }));
        assert!(array_remove(&mut f, &path(), "members", &json!("u2")).unwrap());
        assert!(!array_remove(&mut f, &path(), "members", &json!("u2")).unwrap());
        assert_eq!(f["members"], json!(["u1"]));
    }

    #[test]
    fn test_clock_is_strictly_increasing() {
        let mut clock = ServerClock::starting_after(i64::MAX / 2);
        let a = clock.stamp();
        let b = clock.stamp();
        assert!(b > a);
    }
}
