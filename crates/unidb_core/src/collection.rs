//! Table and collection handles.
//!
//! A [`Collection`] names one table (SQL) or collection (document store)
//! on a session. It writes records directly and starts reads through
//! [`Collection::find`].
//!
//! # Example
//!
//! ```rust,ignore
//! use unidb_core::{cond, Comparison};
//!
//! let users = session.collection("users");
//!
//! // Insert a record; the generated key is written back.
//! let mut ada = User { id: 0, name: "Ada".into(), age: 36 };
//! users.insert_returning(&mut ada)?;
//!
//! // Filter, sort and read.
//! let adults: Vec<User> = users
//!     .find(cond! { "age >=" => 18 })
//!     .order_by("-age")
//!     .all()?;
//! ```

use crate::adapter::{Adapter, InsertOutcome};
use crate::batch::BatchInserter;
use crate::cond::Condition;
use crate::error::Result;
use crate::query::Query;
use crate::result::ResultSet;
use crate::session::{OpKind, Session};
use unidb_codec::{Document, EncodeMode, FieldMapping, Record, WireValue};

/// A handle to a table or collection.
pub struct Collection<A: Adapter> {
    session: Session<A>,
    name: String,
}

impl<A: Adapter> Clone for Collection<A> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            name: self.name.clone(),
        }
    }
}

impl<A: Adapter> std::fmt::Debug for Collection<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("session", &self.session.id())
            .finish()
    }
}

impl<A: Adapter> Collection<A> {
    pub(crate) fn new(session: Session<A>, name: String) -> Self {
        Self { session, name }
    }

    /// The table or collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session this handle runs on.
    pub fn session(&self) -> &Session<A> {
        &self.session
    }

    /// True if the backend lists this table or collection.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.session.collections()?.iter().any(|n| n == &self.name))
    }

    /// Inserts a record and returns its key when the record maps one.
    ///
    /// # Errors
    ///
    /// Returns codec errors for fields that fail to marshal, or the
    /// driver's error.
    pub fn insert<T: Record>(&self, record: &T) -> Result<Option<WireValue>> {
        let mapping = FieldMapping::<T>::of()?;
        let row = mapping.encode_with(record, EncodeMode::Insert)?;
        let key = mapping.primary_key().map(|f| f.column().to_string());
        let outcome = self.insert_rows(&[row], key.as_deref())?;
        Ok(outcome.keys.into_iter().next())
    }

    /// Inserts a record and writes the generated key back into it.
    ///
    /// # Errors
    ///
    /// Same as [`Collection::insert`], plus a codec error if the key does
    /// not fit the key field.
    pub fn insert_returning<T: Record>(&self, record: &mut T) -> Result<()> {
        let mapping = FieldMapping::<T>::of()?;
        let key = self.insert(record)?;
        if let (Some(value), Some(field)) = (key, mapping.primary_key()) {
            mapping.decode_into(record, Document::new().with(field.column(), value))?;
        }
        Ok(())
    }

    /// Inserts a raw row and returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn insert_doc(&self, row: Document) -> Result<u64> {
        Ok(self.insert_rows(&[row], None)?.rows_affected)
    }

    /// Inserts a raw row and returns the value of `key_column` for it,
    /// generated by the backend when the row does not carry one.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn insert_doc_returning(&self, row: Document, key_column: &str) -> Result<Option<WireValue>> {
        let outcome = self.insert_rows(&[row], Some(key_column))?;
        Ok(outcome.keys.into_iter().next())
    }

    pub(crate) fn insert_rows(&self, rows: &[Document], returning: Option<&str>) -> Result<InsertOutcome> {
        self.session.run(OpKind::Write, &|a, conn, ctx| {
            a.insert(conn, ctx, &self.name, rows, returning)
        })
    }

    /// Starts a read over the rows matching `condition`.
    pub fn find(&self, condition: impl Into<Condition>) -> ResultSet<A> {
        let mut query = Query::new(self.name.clone());
        query.condition = condition.into();
        ResultSet::new(self.session.clone(), query)
    }

    /// Starts a read over every row.
    pub fn find_all(&self) -> ResultSet<A> {
        self.find(Condition::all())
    }

    /// Counts every row.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn count(&self) -> Result<u64> {
        self.find_all().count()
    }

    /// Removes every row.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn truncate(&self) -> Result<()> {
        self.session
            .run(OpKind::Write, &|a, conn, ctx| a.truncate(conn, ctx, &self.name))
    }

    /// Starts a batch insert writing `chunk_size` rows per statement.
    ///
    /// A chunk size of zero writes one row per statement.
    pub fn batch(&self, chunk_size: usize) -> BatchInserter<A> {
        BatchInserter::new(self.clone(), chunk_size)
    }
}
