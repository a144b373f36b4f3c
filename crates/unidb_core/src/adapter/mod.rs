//! Backend adapters.
//!
//! An [`Adapter`] turns backend-neutral [`Query`] values into driver calls.
//! The session layer owns pooling, retries and transactions; adapters only
//! translate and execute on the connection they are handed.
//!
//! # Available Adapters
//!
//! - [`SqlAdapter`] - any [`SqlDriver`](unidb_driver::SqlDriver) plus a
//!   [`Dialect`](crate::compile::Dialect)
//! - [`DocumentAdapter`] - any [`DocumentDriver`](unidb_driver::DocumentDriver)

mod cache;
mod document;
mod sql;

pub use document::DocumentAdapter;
pub use sql::{SqlAdapter, SqlConn};

use crate::config::Config;
use crate::error::Result;
use crate::query::Query;
use unidb_codec::{Document, WireValue};
use unidb_driver::{Context, RowSource};

/// Outcome of an insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    /// Rows inserted.
    pub rows_affected: u64,
    /// Generated keys, in row order, when they were asked for and the
    /// backend reports them.
    pub keys: Vec<WireValue>,
}

/// Prepared statement cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Statements found prepared.
    pub hits: u64,
    /// Statements prepared on a miss.
    pub misses: u64,
    /// Statements closed on eviction or reset.
    pub evictions: u64,
}

/// Executes queries against one kind of backend.
pub trait Adapter: Send + Sync + 'static {
    /// Pooled connection type.
    type Conn: Send + 'static;

    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Opens a connection.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn connect(&self, ctx: &Context) -> Result<Self::Conn>;

    /// Checks that a connection is alive.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn ping(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()>;

    /// Drops per-connection state such as prepared statements.
    fn reset(&self, conn: &mut Self::Conn);

    /// Closes a connection.
    fn close(&self, conn: Self::Conn);

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn begin(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn commit(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn rollback(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()>;

    /// Runs a read.
    ///
    /// # Errors
    ///
    /// Returns compile, codec or driver errors.
    fn select(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<Box<dyn RowSource>>;

    /// Counts rows matching the query's filter, ignoring paging.
    ///
    /// # Errors
    ///
    /// Returns compile, codec or driver errors.
    fn count(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<u64>;

    /// Inserts rows in one statement.
    ///
    /// # Errors
    ///
    /// Returns compile, codec or driver errors.
    fn insert(
        &self,
        conn: &mut Self::Conn,
        ctx: &Context,
        collection: &str,
        rows: &[Document],
        returning: Option<&str>,
    ) -> Result<InsertOutcome>;

    /// Sets columns on every row matching the query's filter.
    ///
    /// # Errors
    ///
    /// Returns compile, codec or driver errors.
    fn update(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query, set: &Document) -> Result<u64>;

    /// Deletes every row matching the query's filter.
    ///
    /// # Errors
    ///
    /// Returns compile, codec or driver errors.
    fn delete(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<u64>;

    /// Removes every row of a collection.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn truncate(&self, conn: &mut Self::Conn, ctx: &Context, collection: &str) -> Result<()>;

    /// Lists collections.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn collections(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<Vec<String>>;

    /// Applies session settings before the first connection is opened.
    fn configure(&mut self, config: &Config) {
        let _ = config;
    }

    /// Prepared statement cache counters.
    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
