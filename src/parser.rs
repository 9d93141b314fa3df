//! Model response parsing
//!
//! Turns raw completion text into characteristic/value entries. The model is
//! asked for bare JSON but frequently wraps it in prose or markdown fences,
//! so the payload is located before it is validated.
//!
//! Two shapes are understood:
//!
//! ```text
//! [{"characteristic": "leaf shape", "value": "ovate"}, ...]                 // per-species
//! [{"characteristic": "leaf shape", "values": {"sp1": "ovate", ...}}, ...]  // tabulation
//! ```

use indexmap::IndexMap;
use lazy_regex::regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One fact extracted for one species
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharValue {
    pub characteristic: String,
    pub value: String,
}

impl CharValue {
    pub fn new(characteristic: &str, value: &str) -> Self {
        Self {
            characteristic: characteristic.to_string(),
            value: value.to_string(),
        }
    }
}

/// One row of a tabulated seed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub characteristic: String,
    pub values: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON payload could be extracted from the response")]
    InvalidJson,

    #[error("JSON payload has the wrong structure: {0}")]
    BadStructure(String),
}

/// Parse a per-species response into characteristic/value entries.
///
/// Entries keep the order the model emitted them in. Scalar values are
/// rendered as strings and `null` values are dropped. An empty array is a
/// valid (empty) result.
pub fn parse(raw_text: &str) -> Result<Vec<CharValue>, ParseError> {
    let payload = extract_payload(raw_text).ok_or(ParseError::InvalidJson)?;
    let items = payload
        .as_array()
        .ok_or_else(|| ParseError::BadStructure(format!("expected an array, got {}", kind(&payload))))?;

    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| ParseError::BadStructure(format!("entry {} is {}, not an object", i, kind(item))))?;

        if obj.len() != 2 || !obj.contains_key("characteristic") || !obj.contains_key("value") {
            let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            return Err(ParseError::BadStructure(format!(
                "entry {} has keys [{}], expected [characteristic, value]",
                i,
                keys.join(", ")
            )));
        }

        let characteristic = obj["characteristic"]
            .as_str()
            .ok_or_else(|| ParseError::BadStructure(format!("entry {} characteristic is not a string", i)))?;

        let Some(value) = scalar_to_string(&obj["value"]) else {
            if obj["value"].is_null() {
                continue;
            }
            return Err(ParseError::BadStructure(format!("entry {} value is {}", i, kind(&obj["value"]))));
        };

        entries.push(CharValue {
            characteristic: characteristic.to_string(),
            value,
        });
    }

    Ok(entries)
}

/// Parse a tabulation response; every row must carry a value for exactly
/// the supplied species ids.
pub fn parse_table(raw_text: &str, species_ids: &[String]) -> Result<Vec<TableRow>, ParseError> {
    let payload = extract_payload(raw_text).ok_or(ParseError::InvalidJson)?;
    let items = payload
        .as_array()
        .ok_or_else(|| ParseError::BadStructure(format!("expected an array, got {}", kind(&payload))))?;

    let mut expected: Vec<&str> = species_ids.iter().map(String::as_str).collect();
    expected.sort_unstable();

    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| ParseError::BadStructure(format!("row {} is {}, not an object", i, kind(item))))?;

        let characteristic = obj
            .get("characteristic")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::BadStructure(format!("row {} has no string characteristic", i)))?;

        let values = obj
            .get("values")
            .and_then(Value::as_object)
            .ok_or_else(|| ParseError::BadStructure(format!("row {} has no values object", i)))?;

        if obj.len() != 2 {
            return Err(ParseError::BadStructure(format!("row {} has unexpected keys", i)));
        }

        let mut found: Vec<&str> = values.keys().map(String::as_str).collect();
        found.sort_unstable();
        if found != expected {
            return Err(ParseError::BadStructure(format!(
                "row {} covers species [{}], expected [{}]",
                i,
                found.join(", "),
                expected.join(", ")
            )));
        }

        let values = values
            .iter()
            .map(|(id, v)| (id.clone(), scalar_to_string(v).unwrap_or_default()))
            .collect();

        rows.push(TableRow {
            characteristic: characteristic.to_string(),
            values,
        });
    }

    Ok(rows)
}

/// Locate a JSON payload in model output: the whole text, then fenced
/// blocks, then the first bracketed value found in the prose.
fn extract_payload(raw_text: &str) -> Option<Value> {
    let text = raw_text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    for cap in regex!(r"```[A-Za-z]*[ \t]*\r?\n?([\s\S]*?)```").captures_iter(text) {
        if let Ok(value) = serde_json::from_str(cap[1].trim()) {
            return Some(value);
        }
    }

    // Prose may carry brackets of its own, so try every opening position
    let mut fallback = None;
    for open in ['[', '{'] {
        for (start, _) in text.match_indices(open) {
            let Some(Ok(value)) = serde_json::Deserializer::from_str(&text[start..])
                .into_iter::<Value>()
                .next()
            else {
                continue;
            };
            if looks_like_entries(&value) {
                return Some(value);
            }
            fallback.get_or_insert(value);
        }
    }

    fallback
}

/// An array of objects (or an empty array)
fn looks_like_entries(value: &Value) -> bool {
    value.as_array().is_some_and(|items| items.iter().all(Value::is_object))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
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
