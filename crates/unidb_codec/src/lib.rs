//! # unidb Codec
//!
//! Value marshaling for unidb.
//!
//! Every backend exchanges data with the core as [`WireValue`]s: rows and
//! documents are ordered [`Document`]s, and host records are converted to
//! and from them through a cached [`FieldMapping`].
//!
//! ## Conversion priority
//!
//! When a field is marshaled:
//!
//! 1. a type that supplies its own wire form ([`ToWire::CUSTOM`]) is used as is;
//! 2. otherwise the field's declared [`Format`] hint applies;
//! 3. otherwise the type-driven [`ToWire`]/[`FromWire`] impl decides.
//!
//! Reading back, lookup is by destination type, so `Option<T>` reads `Null`
//! as `None` while `Vec<T>` and maps read it as empty.
//!
//! ## Usage
//!
//! ```
//! use unidb_codec::{Document, WireValue};
//!
//! let doc = Document::new().with("name", "Ada").with("age", 36i64);
//! assert_eq!(doc.get("age"), Some(&WireValue::Integer(36)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod format;
pub mod json;
mod mapping;
mod value;
mod wire;

pub use document::Document;
pub use error::{CodecError, CodecResult};
pub use format::Format;
pub use mapping::{
    decode_record, encode_record, Describer, EncodeMode, FieldBuilder, FieldInfo, FieldMapping,
    FieldOptions, Record,
};
pub use value::{WireKind, WireValue};
pub use wire::{Blob, FromWire, ToWire};
