//! Document store driver boundary.

use crate::context::Context;
use crate::error::DriverResult;
use crate::rows::RowSource;
use unidb_codec::{Document, WireValue};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortOrder {
    /// The opposite direction.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// A compiled find request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindCommand {
    /// Query filter document.
    pub filter: Document,
    /// Fields to return; empty means all.
    pub projection: Vec<String>,
    /// Sort keys in priority order.
    pub sort: Vec<(String, SortOrder)>,
    /// Documents to skip.
    pub skip: u64,
    /// Maximum documents to return.
    pub limit: Option<u64>,
}

/// Opens connections to a document store.
pub trait DocumentDriver: Send + Sync + 'static {
    /// Connection type.
    type Conn: DocumentConnection;

    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the store is unreachable.
    fn open(&self, ctx: &Context) -> DriverResult<Self::Conn>;
}

/// One document store connection (or session).
pub trait DocumentConnection: Send + 'static {
    /// Finds documents.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn find(
        &mut self,
        ctx: &Context,
        collection: &str,
        command: &FindCommand,
    ) -> DriverResult<Box<dyn RowSource>>;

    /// Counts documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn count(&mut self, ctx: &Context, collection: &str, filter: &Document) -> DriverResult<u64>;

    /// Inserts documents, returning their `_id` values in order.
    ///
    /// # Errors
    ///
    /// Returns a constraint error on duplicate ids.
    fn insert(
        &mut self,
        ctx: &Context,
        collection: &str,
        documents: Vec<Document>,
    ) -> DriverResult<Vec<WireValue>>;

    /// Sets fields on every document matching `filter`; returns the match count.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn update(
        &mut self,
        ctx: &Context,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> DriverResult<u64>;

    /// Deletes every document matching `filter`; returns the delete count.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn delete(&mut self, ctx: &Context, collection: &str, filter: &Document) -> DriverResult<u64>;

    /// Removes every document from a collection.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn truncate(&mut self, ctx: &Context, collection: &str) -> DriverResult<()>;

    /// Lists collection names.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn collection_names(&mut self, ctx: &Context) -> DriverResult<Vec<String>>;

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn begin(&mut self, ctx: &Context) -> DriverResult<()>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn commit(&mut self, ctx: &Context) -> DriverResult<()>;

    /// Aborts the open transaction.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn rollback(&mut self, ctx: &Context) -> DriverResult<()>;

    /// Checks that the connection is alive.
    ///
    /// # Errors
    ///
    /// Returns a connection error if it is not.
    fn ping(&mut self, ctx: &Context) -> DriverResult<()>;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn close(&mut self) -> DriverResult<()>;
}
