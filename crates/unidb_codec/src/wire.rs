//! Marshal/unmarshal capabilities.
//!
//! [`ToWire`] and [`FromWire`] are the capability pair every persisted value
//! type implements. The impls in this module are the default, type-driven
//! inference rules: scalars map to scalars, sequences to typed arrays, and
//! string-keyed maps to documents. A type that wants full control over its
//! wire form implements both traits itself and sets [`ToWire::CUSTOM`].

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::json;
use crate::value::{WireKind, WireValue};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// Converts a host value into its wire form.
pub trait ToWire {
    /// Marks a type that defines its own wire form.
    ///
    /// Field-level format hints are bypassed for such types; the value
    /// returned by [`ToWire::to_wire`] is used verbatim.
    const CUSTOM: bool = false;

    /// Marshals the value.
    fn to_wire(&self) -> CodecResult<WireValue>;
}

/// Rebuilds a host value from its wire form.
///
/// Lookup is by destination type: the implementation on the type being
/// decoded into decides how to read the wire value, independent of how the
/// value was produced.
pub trait FromWire: Sized {
    /// Unmarshals a value.
    fn from_wire(value: WireValue) -> CodecResult<Self>;
}

/// Raw bytes stored as a backend byte string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob(bytes)
    }
}

impl From<Blob> for WireValue {
    fn from(blob: Blob) -> Self {
        WireValue::Bytes(blob.0)
    }
}

impl ToWire for WireValue {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(self.clone())
    }
}

impl FromWire for WireValue {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        Ok(value)
    }
}

impl ToWire for bool {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Bool(*self))
    }
}

impl FromWire for bool {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Bool(b) => Ok(b),
            // SQL engines without a boolean type hand back 0/1.
            WireValue::Integer(0) => Ok(false),
            WireValue::Integer(1) => Ok(true),
            other => Err(CodecError::decoding("bool", other.kind())),
        }
    }
}

macro_rules! impl_wire_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl ToWire for $t {
                fn to_wire(&self) -> CodecResult<WireValue> {
                    i64::try_from(*self)
                        .map(WireValue::Integer)
                        .map_err(|_| CodecError::encoding(format!(
                            "{} does not fit in a 64-bit signed integer",
                            self
                        )))
                }
            }

            impl FromWire for $t {
                fn from_wire(value: WireValue) -> CodecResult<Self> {
                    match value {
                        WireValue::Integer(n) => <$t>::try_from(n).map_err(|_| {
                            CodecError::decoding_detail(stringify!($t), format!("out of range integer {n}"))
                        }),
                        other => Err(CodecError::decoding(stringify!($t), other.kind())),
                    }
                }
            }
        )*
    };
}

impl_wire_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl ToWire for f64 {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Float(*self))
    }
}

impl FromWire for f64 {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        value
            .as_float()
            .ok_or_else(|| CodecError::decoding("float", value.kind()))
    }
}

impl ToWire for f32 {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Float(f64::from(*self)))
    }
}

impl FromWire for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        f64::from_wire(value).map(|f| f as f32)
    }
}

impl ToWire for String {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Text(self.clone()))
    }
}

impl ToWire for str {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Text(self.to_string()))
    }
}

impl FromWire for String {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Text(s) => Ok(s),
            WireValue::Bytes(bytes) => {
                String::from_utf8(bytes).map_err(|_| CodecError::decoding_detail("text", "invalid UTF-8 bytes"))
            }
            other => Err(CodecError::decoding("text", other.kind())),
        }
    }
}

impl ToWire for Blob {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Bytes(self.0.clone()))
    }
}

impl FromWire for Blob {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Bytes(bytes) => Ok(Blob(bytes)),
            WireValue::Text(text) => Ok(Blob(text.into_bytes())),
            WireValue::Null => Ok(Blob::default()),
            // Bytes that went through a JSON document come back as numbers.
            WireValue::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| u8::from_wire(item).map_err(|e| e.at_index(i)))
                .collect::<CodecResult<Vec<u8>>>()
                .map(Blob),
            other => Err(CodecError::decoding("bytes", other.kind())),
        }
    }
}

impl<T: ToWire> ToWire for Option<T> {
    const CUSTOM: bool = T::CUSTOM;

    fn to_wire(&self) -> CodecResult<WireValue> {
        match self {
            Some(inner) => inner.to_wire(),
            None => Ok(WireValue::Null),
        }
    }
}

impl<T: FromWire> FromWire for Option<T> {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Null => Ok(None),
            other => T::from_wire(other).map(Some),
        }
    }
}

impl<T: ToWire + ?Sized> ToWire for Box<T> {
    const CUSTOM: bool = T::CUSTOM;

    fn to_wire(&self) -> CodecResult<WireValue> {
        (**self).to_wire()
    }
}

impl<T: FromWire> FromWire for Box<T> {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        T::from_wire(value).map(Box::new)
    }
}

impl<T: ToWire> ToWire for Vec<T> {
    fn to_wire(&self) -> CodecResult<WireValue> {
        self.iter()
            .enumerate()
            .map(|(i, item)| item.to_wire().map_err(|e| e.at_index(i)))
            .collect::<CodecResult<Vec<_>>>()
            .map(WireValue::Array)
    }
}

impl<T: FromWire> FromWire for Vec<T> {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        match json::lower(value, true).map_err(|_| CodecError::decoding_detail("array", "non-JSON text"))? {
            // Non-nilable container: absent means empty.
            WireValue::Null => Ok(Vec::new()),
            WireValue::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| T::from_wire(item).map_err(|e| e.at_index(i)))
                .collect(),
            other => Err(CodecError::decoding("array", other.kind())),
        }
    }
}

impl<T: ToWire> ToWire for BTreeMap<String, T> {
    fn to_wire(&self) -> CodecResult<WireValue> {
        map_to_wire(self.iter())
    }
}

impl<T: FromWire> FromWire for BTreeMap<String, T> {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        map_from_wire(value)
    }
}

impl<T: ToWire, S: BuildHasher> ToWire for HashMap<String, T, S> {
    fn to_wire(&self) -> CodecResult<WireValue> {
        // Sort keys so equal maps always produce identical documents.
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        map_to_wire(entries.into_iter())
    }
}

impl<T: FromWire, S: BuildHasher + Default> FromWire for HashMap<String, T, S> {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        map_from_wire(value)
    }
}

fn map_to_wire<'a, T: ToWire + 'a>(
    entries: impl Iterator<Item = (&'a String, &'a T)>,
) -> CodecResult<WireValue> {
    let mut doc = Document::new();
    for (key, item) in entries {
        doc.insert(key.clone(), item.to_wire().map_err(|e| e.at(key))?);
    }
    Ok(WireValue::Document(doc))
}

fn map_from_wire<T: FromWire, M: FromIterator<(String, T)>>(value: WireValue) -> CodecResult<M> {
    match json::lower(value, true).map_err(|_| CodecError::decoding_detail("document", "non-JSON text"))? {
        WireValue::Null => Ok(std::iter::empty::<(String, T)>().collect()),
        WireValue::Document(doc) => doc
            .into_iter()
            .map(|(key, item)| {
                let decoded = T::from_wire(item).map_err(|e| e.at(&key))?;
                Ok((key, decoded))
            })
            .collect(),
        other => Err(CodecError::decoding("document", other.kind())),
    }
}

impl ToWire for Document {
    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Document(self.clone()))
    }
}

impl FromWire for Document {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        match json::lower(value, true).map_err(|_| CodecError::decoding_detail("document", "non-JSON text"))? {
            WireValue::Document(doc) => Ok(doc),
            WireValue::Null => Ok(Document::new()),
            other => Err(CodecError::decoding("document", other.kind())),
        }
    }
}

impl ToWire for serde_json::Value {
    const CUSTOM: bool = true;

    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(WireValue::Json(self.clone()))
    }
}

impl FromWire for serde_json::Value {
    fn from_wire(value: WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Json(json) => Ok(json),
            WireValue::Text(text) => Ok(serde_json::from_str(&text)?),
            WireValue::Bytes(bytes) => Ok(serde_json::from_slice(&bytes)?),
            other => json::to_json(&other),
        }
    }
}

/// Checks that `value` is an array whose elements are all of `kind`.
pub(crate) fn expect_array_of(value: &WireValue, kind: WireKind) -> CodecResult<()> {
    match value {
        WireValue::Null => Ok(()),
        WireValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let matches = item.kind() == kind
                    || item.is_null()
                    || (kind == WireKind::Float && item.kind() == WireKind::Integer);
                if !matches {
                    return Err(CodecError::encoding(format!(
                        "expected {kind} element, found {}",
                        item.kind()
                    ))
                    .at_index(i));
                }
            }
            Ok(())
        }
        other => Err(CodecError::encoding(format!(
            "expected an array of {kind}, found {}",
            other.kind()
        ))),
    }
}
