//! Record body codec
//!
//! Bodies are JSON objects holding exactly the schema's declared fields.
//! Encoding projects the serde form onto that list (undeclared fields are
//! dropped, declared-but-absent ones become `null`). Decoding relies on the
//! record type being `#[serde(default)]`, so fields missing from an older
//! body come back as the type's null.

use serde_json::{Map, Value};
use velostore_core::{ShadowRecord, VeloError, VeloResult};

/// Serialize a record body
pub fn encode<T: ShadowRecord>(record: &T) -> VeloResult<String> {
    let schema = T::schema();
    let mut full = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(VeloError::encode(
                schema.class,
                format!("expected a JSON object, got {}", kind(&other)),
            ))
        }
        Err(e) => return Err(VeloError::encode(schema.class, e)),
    };
    let mut body = Map::with_capacity(schema.fields.len());
    for field in schema.fields {
        body.insert((*field).to_string(), full.remove(*field).unwrap_or(Value::Null));
    }
    serde_json::to_string(&Value::Object(body)).map_err(|e| VeloError::encode(schema.class, e))
}

/// Deserialize a record body
pub fn decode<T: ShadowRecord>(body: &str) -> VeloResult<T> {
    serde_json::from_str(body).map_err(|e| VeloError::decode(T::schema().class, e))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
