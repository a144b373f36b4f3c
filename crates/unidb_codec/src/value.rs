//! Backend-native wire values.

use crate::document::Document;
use std::cmp::Ordering;
use std::fmt;

/// A backend-native value.
///
/// Every host value crosses the driver boundary as a `WireValue`. SQL drivers
/// bind scalars directly and receive arrays/documents already lowered by the
/// dialect; the document store consumes documents natively.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Backend null / absent marker.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Double precision float.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Typed array of scalar or nested values.
    Array(Vec<WireValue>),
    /// Ordered, BSON-like document.
    Document(Document),
    /// A value explicitly stored as a JSON document.
    Json(serde_json::Value),
}

/// Kind tag for a [`WireValue`], used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireKind {
    /// `Null`.
    Null,
    /// `Bool`.
    Bool,
    /// `Integer`.
    Integer,
    /// `Float`.
    Float,
    /// `Text`.
    Text,
    /// `Bytes`.
    Bytes,
    /// `Array`.
    Array,
    /// `Document`.
    Document,
    /// `Json`.
    Json,
}

impl fmt::Display for WireKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireKind::Null => "null",
            WireKind::Bool => "bool",
            WireKind::Integer => "integer",
            WireKind::Float => "float",
            WireKind::Text => "text",
            WireKind::Bytes => "bytes",
            WireKind::Array => "array",
            WireKind::Document => "document",
            WireKind::Json => "json",
        };
        f.write_str(name)
    }
}

impl WireValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> WireKind {
        match self {
            WireValue::Null => WireKind::Null,
            WireValue::Bool(_) => WireKind::Bool,
            WireValue::Integer(_) => WireKind::Integer,
            WireValue::Float(_) => WireKind::Float,
            WireValue::Text(_) => WireKind::Text,
            WireValue::Bytes(_) => WireKind::Bytes,
            WireValue::Array(_) => WireKind::Array,
            WireValue::Document(_) => WireKind::Document,
            WireValue::Json(_) => WireKind::Json,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    /// Returns true if this is the zero value of its kind.
    ///
    /// Documents are zero when every entry is zero, mirroring how a record
    /// whose fields are all defaults is considered empty.
    pub fn is_zero(&self) -> bool {
        match self {
            WireValue::Null => true,
            WireValue::Bool(b) => !b,
            WireValue::Integer(n) => *n == 0,
            WireValue::Float(f) => *f == 0.0,
            WireValue::Text(s) => s.is_empty(),
            WireValue::Bytes(b) => b.is_empty(),
            WireValue::Array(a) => a.is_empty(),
            WireValue::Document(d) => d.iter().all(|(_, v)| v.is_zero()),
            WireValue::Json(j) => match j {
                serde_json::Value::Null => true,
                serde_json::Value::Array(a) => a.is_empty(),
                serde_json::Value::Object(o) => o.is_empty(),
                _ => false,
            },
        }
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            WireValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            WireValue::Float(f) => Some(*f),
            WireValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a document, if it is one.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            WireValue::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key in this document value.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        match self {
            WireValue::Document(doc) => doc.get(key),
            _ => None,
        }
    }

    /// Compares two values of comparable kinds.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// unrelated kinds (or NaN) are incomparable and return `None`.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (WireValue::Null, WireValue::Null) => Some(Ordering::Equal),
            (WireValue::Bool(a), WireValue::Bool(b)) => Some(a.cmp(b)),
            (WireValue::Integer(a), WireValue::Integer(b)) => Some(a.cmp(b)),
            (WireValue::Integer(_) | WireValue::Float(_), WireValue::Integer(_) | WireValue::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (WireValue::Text(a), WireValue::Text(b)) => Some(a.cmp(b)),
            (WireValue::Bytes(a), WireValue::Bytes(b)) => Some(a.cmp(b)),
            (WireValue::Array(a), WireValue::Array(b)) => {
                for (av, bv) in a.iter().zip(b.iter()) {
                    match av.compare(bv)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total order used for sorting result sets.
    ///
    /// Nulls sort first, then kinds in a fixed bracket order, then values.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        self.sort_bracket().cmp(&other.sort_bracket())
    }

    fn sort_bracket(&self) -> u8 {
        match self {
            WireValue::Null => 0,
            WireValue::Integer(_) | WireValue::Float(_) => 1,
            WireValue::Text(_) => 2,
            WireValue::Document(_) | WireValue::Json(_) => 3,
            WireValue::Array(_) => 4,
            WireValue::Bytes(_) => 5,
            WireValue::Bool(_) => 6,
        }
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Bool(b)
    }
}

impl From<i64> for WireValue {
    fn from(n: i64) -> Self {
        WireValue::Integer(n)
    }
}

impl From<i32> for WireValue {
    fn from(n: i32) -> Self {
        WireValue::Integer(i64::from(n))
    }
}

impl From<u32> for WireValue {
    fn from(n: u32) -> Self {
        WireValue::Integer(i64::from(n))
    }
}

impl From<f64> for WireValue {
    fn from(f: f64) -> Self {
        WireValue::Float(f)
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::Text(s)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::Text(s.to_string())
    }
}

impl From<Document> for WireValue {
    fn from(d: Document) -> Self {
        WireValue::Document(d)
    }
}

impl<T: Into<WireValue>> From<Vec<T>> for WireValue {
    fn from(v: Vec<T>) -> Self {
        WireValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<WireValue>, const N: usize> From<[T; N]> for WireValue {
    fn from(v: [T; N]) -> Self {
        WireValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for WireValue {
    fn from((): ()) -> Self {
        WireValue::Null
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(WireValue::Null, Into::into)
    }
}
