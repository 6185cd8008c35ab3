//! `[PARSE]` and `[PARSE/ARRAY]` queries.
//!
//! Lets a host with no JSON parser of its own pull one value out of a
//! document it received earlier. The `json` field may hold the document
//! itself or a string containing it.

use serde::Deserialize;
use serde_json::Value;

use flipper_bridge_core::BridgeError;

use crate::payload::from_json;

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: String,
    json: Value,
}

#[derive(Debug, Deserialize)]
struct ArrayQuery {
    key: String,
    index: usize,
    json: Value,
}

/// Answer `{"key": k, "json": doc}` with `doc[k]`.
pub fn lookup_key(payload: &str) -> Result<String, BridgeError> {
    let query: KeyQuery = from_json(payload.trim())?;
    let document = document(query.json)?;
    let value = document
        .get(&query.key)
        .ok_or_else(|| BridgeError::Parse(format!("Key '{}' not found", query.key)))?;
    Ok(render(value))
}

/// Answer `{"key": k, "index": i, "json": doc}` with `doc[k][i]`.
pub fn lookup_array(payload: &str) -> Result<String, BridgeError> {
    let query: ArrayQuery = from_json(payload.trim())?;
    let document = document(query.json)?;
    let array = document
        .get(&query.key)
        .and_then(Value::as_array)
        .ok_or_else(|| BridgeError::Parse(format!("Key '{}' is not an array", query.key)))?;
    let value = array.get(query.index).ok_or_else(|| {
        BridgeError::Parse(format!(
            "Index {} out of range for '{}' ({} items)",
            query.index,
            query.key,
            array.len()
        ))
    })?;
    Ok(render(value))
}

fn document(json: Value) -> Result<Value, BridgeError> {
    match json {
        Value::String(text) => from_json(&text),
        other => Ok(other),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
