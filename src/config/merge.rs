//! Deep merging and dotted-path access on serialized configuration trees.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Merges `overlay` into `base`. Objects merge key by key, `null` leaves the
/// base untouched, anything else replaces it.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Merges two typed values through their serialized form.
pub fn merge_serialized<T: Serialize + DeserializeOwned>(base: &T, overlay: &T) -> Result<T> {
    let mut merged = to_value(base)?;
    merge_values(&mut merged, to_value(overlay)?);
    from_value(merged)
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::SerializeFailed {
        message: e.to_string(),
    })
}

pub(crate) fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| StoreError::ParseFailed {
        message: e.to_string(),
    })
}

/// Splits "sql.data_source" into its segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Looks up a nested value.
pub fn get_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

/// Sets a nested value, creating intermediate objects as needed.
///
/// Returns false when an intermediate value exists but is not an object.
pub fn set_path(value: &mut Value, path: &[String], new_value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };

    let mut current = value;
    for key in parents {
        let Some(map) = current.as_object_mut() else {
            return false;
        };
        current = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    match current.as_object_mut() {
        Some(map) => {
            map.insert(last.clone(), new_value);
            true
        }
        None => false,
    }
}

/// Removes a nested value if present.
pub fn remove_path(value: &mut Value, path: &[String]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut current = value;
    for key in parents {
        current = current.as_object_mut()?.get_mut(key)?;
    }
    current.as_object_mut()?.remove(last)
}

/// Parses a raw string into a JSON value, guided by the type it replaces.
pub fn coerce_scalar(raw: &str, existing: Option<&Value>) -> Value {
    match existing {
        Some(Value::String(_)) => Value::String(raw.to_string()),
        Some(Value::Bool(_)) => raw
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
            _ => Value::String(raw.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        split_path(p)
    }

    #[test]
    fn overlay_wins_and_nulls_are_ignored() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": "keep"});
        merge_values(&mut base, json!({"a": {"y": 3, "z": null}, "b": null, "c": true}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 3}, "b": "keep", "c": true}));
    }

    #[test]
    fn merge_serialized_fills_missing_fields() {
        use crate::config::model::AppConfig;
        use crate::config::Configuration;

        let mut base = AppConfig::default();
        base.set_defaults();

        let mut overlay = AppConfig::default();
        overlay.log.console_level = Some("debug".to_string());

        let merged = base.merge(&overlay).unwrap();
        assert_eq!(merged.log.console_level.as_deref(), Some("debug"));
        assert_eq!(merged.service, base.service);
        assert_eq!(merged.sql, base.sql);
    }

    #[test]
    fn set_get_remove_nested() {
        let mut value = json!({});
        assert!(set_path(&mut value, &path("sql.data_source"), json!("dsn")));
        assert_eq!(get_path(&value, &path("sql.data_source")), Some(&json!("dsn")));

        assert_eq!(remove_path(&mut value, &path("sql.data_source")), Some(json!("dsn")));
        assert_eq!(get_path(&value, &path("sql.data_source")), None);
    }

    #[test]
    fn set_path_refuses_to_descend_into_scalars() {
        let mut value = json!({"sql": 5});
        assert!(!set_path(&mut value, &path("sql.data_source"), json!("dsn")));
        assert_eq!(value, json!({"sql": 5}));
    }

    #[test]
    fn coerce_follows_existing_type() {
        assert_eq!(coerce_scalar("8065", Some(&json!(":80"))), json!("8065"));
        assert_eq!(coerce_scalar("true", Some(&json!(false))), json!(true));
        assert_eq!(coerce_scalar("42", Some(&json!(1))), json!(42));
        assert_eq!(coerce_scalar("42", None), json!(42));
        assert_eq!(coerce_scalar("hello", None), json!("hello"));
    }
}
