//! JSON representation of wire values.
//!
//! SQL backends without native document types store documents and arrays as
//! JSON text. These helpers convert between [`WireValue`] trees and
//! `serde_json` values.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::WireValue;
use serde_json::{Map, Number, Value as Json};

/// Converts a wire value into a JSON value.
///
/// # Errors
///
/// Returns an encoding error for non-finite floats, which JSON cannot hold.
pub fn to_json(value: &WireValue) -> CodecResult<Json> {
    Ok(match value {
        WireValue::Null => Json::Null,
        WireValue::Bool(b) => Json::Bool(*b),
        WireValue::Integer(n) => Json::Number(Number::from(*n)),
        WireValue::Float(f) => Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| CodecError::encoding(format!("float {f} has no JSON representation")))?,
        WireValue::Text(s) => Json::String(s.clone()),
        WireValue::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        WireValue::Array(items) => Json::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| to_json(item).map_err(|e| e.at_index(i)))
                .collect::<CodecResult<_>>()?,
        ),
        WireValue::Document(doc) => {
            let mut map = Map::with_capacity(doc.len());
            for (key, item) in doc.iter() {
                map.insert(key.to_string(), to_json(item).map_err(|e| e.at(key))?);
            }
            Json::Object(map)
        }
        WireValue::Json(json) => json.clone(),
    })
}

/// Converts a JSON value into the equivalent structural wire value.
#[allow(clippy::cast_precision_loss)]
pub fn from_json(json: Json) -> WireValue {
    match json {
        Json::Null => WireValue::Null,
        Json::Bool(b) => WireValue::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => WireValue::Integer(i),
            None => WireValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => WireValue::Text(s),
        Json::Array(items) => WireValue::Array(items.into_iter().map(from_json).collect()),
        Json::Object(map) => {
            let mut doc = Document::with_capacity(map.len());
            for (key, item) in map {
                doc.insert(key, from_json(item));
            }
            WireValue::Document(doc)
        }
    }
}

/// Serializes a wire value as JSON text.
///
/// # Errors
///
/// Returns an error if the value has no JSON representation.
pub fn to_json_text(value: &WireValue) -> CodecResult<String> {
    Ok(serde_json::to_string(&to_json(value)?)?)
}

/// Parses JSON text into a structural wire value.
///
/// # Errors
///
/// Returns a JSON error if the text is not valid JSON.
pub fn from_json_text(text: &str) -> CodecResult<WireValue> {
    let json: Json = serde_json::from_str(text)?;
    Ok(from_json(json))
}

/// Lowers JSON-carrying wire values into structural ones.
///
/// `Json` values become documents/arrays; `Text` and `Bytes` are parsed as
/// JSON only when `parse_text` is set (SQL drivers hand JSON columns back as
/// text). Anything else is returned unchanged.
///
/// # Errors
///
/// Returns a JSON error when text or bytes do not parse.
pub fn lower(value: WireValue, parse_text: bool) -> CodecResult<WireValue> {
    match value {
        WireValue::Json(json) => Ok(from_json(json)),
        WireValue::Text(text) if parse_text => from_json_text(&text),
        WireValue::Bytes(bytes) if parse_text => {
            let json: Json = serde_json::from_slice(&bytes)?;
            Ok(from_json(json))
        }
        other => Ok(other),
    }
}
