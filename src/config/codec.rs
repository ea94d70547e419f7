//! Serialization formats for the backing file.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Converts a serialized configuration tree to and from bytes.
#[cfg_attr(test, mockall::automock)]
pub trait Codec: Send + Sync {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>>;

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value>;
}

/// Pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

/// YAML.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl Codec for JsonCodec {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::SerializeFailed {
            message: e.to_string(),
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| StoreError::ParseFailed {
            message: format!("invalid JSON: {}", e),
        })?;
        ensure_object(value)
    }
}

impl Codec for YamlCodec {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| StoreError::SerializeFailed {
                message: e.to_string(),
            })
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value> {
        let value: Value = serde_yaml::from_slice(bytes).map_err(|e| StoreError::ParseFailed {
            message: format!("invalid YAML: {}", e),
        })?;
        ensure_object(value)
    }
}

/// An empty document is an empty configuration; anything else must be a map.
fn ensure_object(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(StoreError::ParseFailed {
            message: format!("expected a map at the top level, found {}", kind_of(&other)),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

/// Picks a codec from the file extension. YAML for `.yaml`/`.yml`, JSON otherwise.
pub fn codec_for_path(path: &Path) -> Box<dyn Codec> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            Box::new(YamlCodec)
        }
        _ => Box::new(JsonCodec),
    }
}
