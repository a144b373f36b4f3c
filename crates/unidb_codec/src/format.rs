//! Field format hints.
//!
//! A format hint attached to a record field selects a fixed codec for the
//! field's wire value instead of leaving it to type-driven inference.

use crate::error::{CodecError, CodecResult};
use crate::json;
use crate::value::{WireKind, WireValue};
use crate::wire::expect_array_of;
use std::fmt;
use std::str::FromStr;

/// Declared wire format of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Type-driven inference.
    #[default]
    Auto,
    /// Typed array of text.
    StringArray,
    /// Typed array of 64-bit integers.
    Int64Array,
    /// Typed array of doubles.
    Float64Array,
    /// Typed array of booleans.
    BoolArray,
    /// JSON document, whatever the value's shape.
    Json,
}

impl Format {
    /// Applies the format to a freshly marshaled value.
    ///
    /// # Errors
    ///
    /// Returns an encoding error when the value does not have the shape the
    /// format requires.
    pub fn encode(self, value: WireValue) -> CodecResult<WireValue> {
        match self {
            Format::Auto => Ok(value),
            Format::StringArray => {
                expect_array_of(&value, WireKind::Text)?;
                Ok(value)
            }
            Format::Int64Array => {
                expect_array_of(&value, WireKind::Integer)?;
                Ok(value)
            }
            Format::Float64Array => {
                expect_array_of(&value, WireKind::Float)?;
                Ok(match value {
                    WireValue::Array(items) => WireValue::Array(
                        items
                            .into_iter()
                            .map(|item| match item.as_float() {
                                Some(f) => WireValue::Float(f),
                                None => item,
                            })
                            .collect(),
                    ),
                    other => other,
                })
            }
            Format::BoolArray => {
                expect_array_of(&value, WireKind::Bool)?;
                Ok(value)
            }
            Format::Json => match value {
                WireValue::Null => Ok(WireValue::Null),
                other => json::to_json(&other).map(WireValue::Json),
            },
        }
    }

    /// Normalizes a backend value before it is handed to the field's
    /// [`FromWire`](crate::FromWire) implementation.
    ///
    /// # Errors
    ///
    /// Returns a decoding error when JSON-carrying text does not parse.
    pub fn decode(self, value: WireValue) -> CodecResult<WireValue> {
        match self {
            Format::Auto => Ok(value),
            Format::Json => json::lower(value, true),
            Format::StringArray | Format::Int64Array | Format::Float64Array | Format::BoolArray => {
                match value {
                    WireValue::Text(_) | WireValue::Json(_) => json::lower(value, true)
                        .map_err(|_| CodecError::decoding_detail("array", "non-JSON text")),
                    other => Ok(other),
                }
            }
        }
    }

    /// Tag name used in record descriptions.
    pub fn name(self) -> &'static str {
        match self {
            Format::Auto => "auto",
            Format::StringArray => "stringarray",
            Format::Int64Array => "int64array",
            Format::Float64Array => "float64array",
            Format::BoolArray => "boolarray",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Format::Auto),
            "stringarray" => Ok(Format::StringArray),
            "int64array" => Ok(Format::Int64Array),
            "float64array" => Ok(Format::Float64Array),
            "boolarray" => Ok(Format::BoolArray),
            "json" | "jsonb" | "jsonmap" | "jsonarray" => Ok(Format::Json),
            other => Err(CodecError::encoding(format!("unknown format hint `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_array_rejects_mixed_elements() {
        let value = WireValue::Array(vec!["a".into(), WireValue::Integer(1)]);
        let err = Format::StringArray.encode(value).unwrap_err();
        assert_eq!(err.path(), Some("[1]"));
    }

    #[test]
    fn float_array_widens_integers() {
        let value = WireValue::Array(vec![WireValue::Integer(1), WireValue::Float(2.5)]);
        assert_eq!(
            Format::Float64Array.encode(value).unwrap(),
            WireValue::Array(vec![WireValue::Float(1.0), WireValue::Float(2.5)])
        );
    }

    #[test]
    fn json_wraps_any_shape_and_keeps_null() {
        let value = WireValue::Array(vec![WireValue::Integer(1)]);
        assert_eq!(
            Format::Json.encode(value).unwrap(),
            WireValue::Json(serde_json::json!([1]))
        );
        assert_eq!(Format::Json.encode(WireValue::Null).unwrap(), WireValue::Null);
    }

    #[test]
    fn json_decode_parses_text_columns() {
        let decoded = Format::Json
            .decode(WireValue::Text(r#"{"a":1}"#.into()))
            .unwrap();
        assert_eq!(decoded.get("a"), Some(&WireValue::Integer(1)));
    }

    #[test]
    fn parse_hint_names() {
        assert_eq!("jsonb".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("StringArray".parse::<Format>().unwrap(), Format::StringArray);
        assert!("bogus".parse::<Format>().is_err());
    }
}
