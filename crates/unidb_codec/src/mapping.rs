//! Record field mappings.
//!
//! A [`Record`] describes its persisted fields once through a [`Describer`].
//! The resulting [`FieldMapping`] is built on first use, with inline records
//! already expanded into the parent, and cached for the rest of the process
//! keyed by the record's `TypeId`.
//!
//! ```
//! use unidb_codec::{Describer, FieldMapping, Format, Record};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Artist {
//!     id: i64,
//!     name: String,
//!     tags: Vec<String>,
//! }
//!
//! impl Record for Artist {
//!     fn describe(d: &mut Describer<Self>) {
//!         d.field("id", |a| &a.id, |a| &mut a.id).primary_key().omit_empty();
//!         d.field("name", |a| &a.name, |a| &mut a.name);
//!         d.field("tags", |a| &a.tags, |a| &mut a.tags).format(Format::StringArray);
//!     }
//! }
//!
//! let mapping = FieldMapping::<Artist>::of().unwrap();
//! let artist = Artist { id: 0, name: "Ozzie".into(), tags: vec!["metal".into()] };
//! let row = mapping.encode(&artist).unwrap();
//! assert!(row.get("id").is_none()); // omitted: zero primary key
//! assert_eq!(mapping.decode(row).unwrap(), artist);
//! ```

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::format::Format;
use crate::value::WireValue;
use crate::wire::{FromWire, ToWire};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A host type persisted as a row or document.
pub trait Record: Default + Send + Sync + 'static {
    /// Describes the persisted fields of this type.
    ///
    /// Called once per process; the result is cached.
    fn describe(fields: &mut Describer<Self>);
}

type EncodeFn<T> = Arc<dyn Fn(&T) -> CodecResult<WireValue> + Send + Sync>;
type DecodeFn<T> = Arc<dyn Fn(&mut T, WireValue) -> CodecResult<()> + Send + Sync>;

/// Per-field tag options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    /// Leave the field out of outbound rows when it holds its zero value.
    pub omit_empty: bool,
    /// The field identifies the record.
    pub primary_key: bool,
    /// The backend owns the value; it is read but never written.
    pub read_only: bool,
    /// Declared wire format.
    pub format: Format,
}

/// Which fields an outbound row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Every writable field (inserts and nested documents).
    Insert,
    /// Writable fields except the primary key (update `SET` lists).
    Update,
    /// Every field, including read-only ones.
    Full,
}

/// One persisted field of a record.
pub struct FieldInfo<T> {
    column: String,
    path: String,
    options: FieldOptions,
    custom: bool,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

impl<T> Clone for FieldInfo<T> {
    fn clone(&self) -> Self {
        Self {
            column: self.column.clone(),
            path: self.path.clone(),
            options: self.options.clone(),
            custom: self.custom,
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> std::fmt::Debug for FieldInfo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldInfo")
            .field("column", &self.column)
            .field("path", &self.path)
            .field("options", &self.options)
            .field("custom", &self.custom)
            .finish_non_exhaustive()
    }
}

impl<T> FieldInfo<T> {
    /// Column (or document key) name.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Access path used in error messages (`audit.created_by` for inline fields).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Tag options.
    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    /// Whether the field's type supplies its own wire form.
    pub fn is_custom(&self) -> bool {
        self.custom
    }
}

/// Collects field descriptions for a record type.
pub struct Describer<T> {
    fields: Vec<FieldInfo<T>>,
    error: Option<CodecError>,
}

/// Chained tag options for the field just described.
pub struct FieldBuilder<'a, T> {
    field: Option<&'a mut FieldInfo<T>>,
}

impl<T> FieldBuilder<'_, T> {
    fn update(mut self, f: impl FnOnce(&mut FieldOptions)) -> Self {
        if let Some(field) = self.field.as_deref_mut() {
            f(&mut field.options);
        }
        self
    }

    /// Omits the field from outbound rows while it holds its zero value.
    #[must_use]
    pub fn omit_empty(self) -> Self {
        self.update(|o| o.omit_empty = true)
    }

    /// Marks the field as the record's primary key.
    #[must_use]
    pub fn primary_key(self) -> Self {
        self.update(|o| o.primary_key = true)
    }

    /// Marks the field as backend-owned.
    #[must_use]
    pub fn read_only(self) -> Self {
        self.update(|o| o.read_only = true)
    }

    /// Declares the wire format of the field.
    #[must_use]
    pub fn format(self, format: Format) -> Self {
        self.update(|o| o.format = format)
    }
}

impl<T: Record> Describer<T> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            error: None,
        }
    }

    fn push(&mut self, info: FieldInfo<T>) -> FieldBuilder<'_, T> {
        self.fields.push(info);
        FieldBuilder {
            field: self.fields.last_mut(),
        }
    }

    fn fail(&mut self, error: CodecError) -> FieldBuilder<'_, T> {
        self.error.get_or_insert(error);
        FieldBuilder { field: None }
    }

    /// Describes a field whose type converts itself to and from the wire.
    pub fn field<V>(
        &mut self,
        column: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> FieldBuilder<'_, T>
    where
        V: ToWire + FromWire + 'static,
    {
        self.push(FieldInfo {
            column: column.to_string(),
            path: column.to_string(),
            options: FieldOptions::default(),
            custom: V::CUSTOM,
            encode: Arc::new(move |record: &T| get(record).to_wire()),
            decode: Arc::new(move |record: &mut T, value| {
                *get_mut(record) = V::from_wire(value)?;
                Ok(())
            }),
        })
    }

    /// Describes a field holding another record, stored as a document.
    pub fn nested<R: Record>(
        &mut self,
        column: &str,
        get: fn(&T) -> &R,
        get_mut: fn(&mut T) -> &mut R,
    ) -> FieldBuilder<'_, T> {
        let mapping = match FieldMapping::<R>::of() {
            Ok(mapping) => mapping,
            Err(e) => return self.fail(e.at(column)),
        };
        let decode_mapping = Arc::clone(&mapping);
        self.push(FieldInfo {
            column: column.to_string(),
            path: column.to_string(),
            options: FieldOptions::default(),
            custom: false,
            encode: Arc::new(move |record: &T| {
                mapping
                    .encode_with(get(record), EncodeMode::Insert)
                    .map(WireValue::Document)
            }),
            decode: Arc::new(move |record: &mut T, value| {
                let doc = Document::from_wire(value)?;
                decode_mapping.decode_into(get_mut(record), doc)
            }),
        })
    }

    /// Flattens another record's fields into this one.
    ///
    /// The inline record's columns keep their own names; `label` only shows
    /// up in error paths.
    pub fn inline<R: Record>(&mut self, label: &str, get: fn(&T) -> &R, get_mut: fn(&mut T) -> &mut R) {
        let mapping = match FieldMapping::<R>::of() {
            Ok(mapping) => mapping,
            Err(e) => {
                self.fail(e.at(label));
                return;
            }
        };
        for inner in &mapping.fields {
            let encode = Arc::clone(&inner.encode);
            let decode = Arc::clone(&inner.decode);
            self.fields.push(FieldInfo {
                column: inner.column.clone(),
                path: format!("{label}.{}", inner.path),
                options: inner.options.clone(),
                custom: inner.custom,
                encode: Arc::new(move |record: &T| encode(get(record))),
                decode: Arc::new(move |record: &mut T, value| decode(get_mut(record), value)),
            });
        }
    }
}

/// Compiled field mapping of a record type.
pub struct FieldMapping<T> {
    record: &'static str,
    fields: Vec<FieldInfo<T>>,
    index: HashMap<String, usize>,
    primary_key: Option<usize>,
}

impl<T> std::fmt::Debug for FieldMapping<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapping")
            .field("record", &self.record)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

type Erased = Arc<dyn Any + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<TypeId, Erased>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TypeId, Erased>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

impl<T: Record> FieldMapping<T> {
    /// Returns the cached mapping for `T`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DuplicateField`] when two fields (usually one of
    /// them inline) map to the same column.
    pub fn of() -> CodecResult<Arc<Self>> {
        let key = TypeId::of::<T>();
        if let Some(found) = registry().read().get(&key) {
            return Self::downcast(Arc::clone(found));
        }

        // Built outside the lock: inline and nested fields resolve their own
        // mappings through this same registry.
        let built: Erased = Arc::new(Self::build()?);
        let stored = Arc::clone(registry().write().entry(key).or_insert(built));
        Self::downcast(stored)
    }

    fn downcast(erased: Erased) -> CodecResult<Arc<Self>> {
        erased
            .downcast::<Self>()
            .map_err(|_| CodecError::encoding("field mapping registry holds a foreign type"))
    }

    fn build() -> CodecResult<Self> {
        let mut describer = Describer::new();
        T::describe(&mut describer);
        if let Some(err) = describer.error {
            return Err(err);
        }

        let record = std::any::type_name::<T>();
        let mut index = HashMap::with_capacity(describer.fields.len());
        let mut primary_key = None;
        for (pos, field) in describer.fields.iter().enumerate() {
            if index.insert(field.column.clone(), pos).is_some() {
                return Err(CodecError::DuplicateField {
                    record,
                    column: field.column.clone(),
                });
            }
            if field.options.primary_key && primary_key.is_none() {
                primary_key = Some(pos);
            }
        }

        Ok(Self {
            record,
            fields: describer.fields,
            index,
            primary_key,
        })
    }

    /// Name of the record type.
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    /// Fields in declaration order, inline fields expanded in place.
    pub fn fields(&self) -> &[FieldInfo<T>] {
        &self.fields
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.column.as_str()).collect()
    }

    /// Looks up a field by column name.
    pub fn field(&self, column: &str) -> Option<&FieldInfo<T>> {
        self.index.get(column).map(|&pos| &self.fields[pos])
    }

    /// The primary key field, if one is declared.
    pub fn primary_key(&self) -> Option<&FieldInfo<T>> {
        self.primary_key.map(|pos| &self.fields[pos])
    }

    /// Marshals one field of `value`.
    ///
    /// # Errors
    ///
    /// Returns an encoding error carrying the field path.
    pub fn encode_field(&self, field: &FieldInfo<T>, value: &T) -> CodecResult<WireValue> {
        let raw = (field.encode)(value).map_err(|e| e.at(&field.path))?;
        if field.custom {
            return Ok(raw);
        }
        field.options.format.encode(raw).map_err(|e| e.at(&field.path))
    }

    /// Marshals a record into an insert row.
    ///
    /// # Errors
    ///
    /// Returns the first field encoding error.
    pub fn encode(&self, value: &T) -> CodecResult<Document> {
        self.encode_with(value, EncodeMode::Insert)
    }

    /// Marshals a record, selecting fields by `mode`.
    ///
    /// # Errors
    ///
    /// Returns the first field encoding error.
    pub fn encode_with(&self, value: &T, mode: EncodeMode) -> CodecResult<Document> {
        let mut row = Document::with_capacity(self.fields.len());
        for field in &self.fields {
            let skip = match mode {
                EncodeMode::Full => false,
                EncodeMode::Insert => field.options.read_only,
                EncodeMode::Update => field.options.read_only || field.options.primary_key,
            };
            if skip {
                continue;
            }
            let wire = self.encode_field(field, value)?;
            if field.options.omit_empty && mode != EncodeMode::Full && wire.is_zero() {
                continue;
            }
            row.insert(field.column.clone(), wire);
        }
        Ok(row)
    }

    /// Unmarshals a row into a fresh record.
    ///
    /// # Errors
    ///
    /// Returns a decoding error carrying the field path.
    pub fn decode(&self, row: Document) -> CodecResult<T> {
        let mut value = T::default();
        self.decode_into(&mut value, row)?;
        Ok(value)
    }

    /// Unmarshals a row into an existing record.
    ///
    /// Columns without a matching field are ignored; fields without a
    /// matching column keep their current value.
    ///
    /// # Errors
    ///
    /// Returns a decoding error carrying the field path.
    pub fn decode_into(&self, target: &mut T, row: Document) -> CodecResult<()> {
        for (column, value) in row {
            let Some(field) = self.field(&column) else {
                continue;
            };
            let value = if field.custom {
                value
            } else {
                field.options.format.decode(value).map_err(|e| e.at(&field.path))?
            };
            (field.decode)(target, value).map_err(|e| e.at(&field.path))?;
        }
        Ok(())
    }

    /// Returns the primary key column and its current value.
    ///
    /// # Errors
    ///
    /// Returns an encoding error if the key field fails to marshal.
    pub fn primary_key_value(&self, value: &T) -> CodecResult<Option<(String, WireValue)>> {
        match self.primary_key() {
            Some(field) => Ok(Some((field.column.clone(), self.encode_field(field, value)?))),
            None => Ok(None),
        }
    }
}

/// Marshals a record with its cached mapping.
///
/// # Errors
///
/// Returns mapping or field encoding errors.
pub fn encode_record<T: Record>(value: &T) -> CodecResult<Document> {
    FieldMapping::<T>::of()?.encode(value)
}

/// Unmarshals a row with the record's cached mapping.
///
/// # Errors
///
/// Returns mapping or field decoding errors.
pub fn decode_record<T: Record>(row: Document) -> CodecResult<T> {
    FieldMapping::<T>::of()?.decode(row)
}
