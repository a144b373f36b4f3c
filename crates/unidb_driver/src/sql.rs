//! SQL driver boundary.

use crate::context::Context;
use crate::error::DriverResult;
use crate::rows::RowSource;
use unidb_codec::WireValue;

/// Handle to a statement prepared on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub u64);

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
    /// Key generated by the last insert, on backends that report one.
    pub last_insert_id: Option<i64>,
}

/// Opens connections to a SQL backend.
pub trait SqlDriver: Send + Sync + 'static {
    /// Connection type.
    type Conn: SqlConnection;

    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the backend is unreachable.
    fn open(&self, ctx: &Context) -> DriverResult<Self::Conn>;
}

/// One SQL connection.
///
/// SQL text reaching the connection is already in the dialect's final form
/// (placeholders rewritten, identifiers quoted); parameters are bound
/// positionally.
pub trait SqlConnection: Send + 'static {
    /// Prepares `sql` for repeated execution.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the statement does not parse.
    fn prepare(&mut self, ctx: &Context, sql: &str) -> DriverResult<StatementId>;

    /// Releases a prepared statement.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnknownStatement`](crate::DriverError::UnknownStatement)
    /// for handles this connection never issued.
    fn close_statement(&mut self, id: StatementId) -> DriverResult<()>;

    /// Executes a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn execute(&mut self, ctx: &Context, sql: &str, params: &[WireValue]) -> DriverResult<ExecResult>;

    /// Executes a prepared statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn execute_prepared(
        &mut self,
        ctx: &Context,
        id: StatementId,
        params: &[WireValue],
    ) -> DriverResult<ExecResult>;

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[WireValue],
    ) -> DriverResult<Box<dyn RowSource>>;

    /// Runs a prepared query.
    ///
    /// # Errors
    ///
    /// Returns any driver error.
    fn query_prepared(
        &mut self,
        ctx: &Context,
        id: StatementId,
        params: &[WireValue],
    ) -> DriverResult<Box<dyn RowSource>>;

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

    /// Rolls back the open transaction.
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
    /// Returns any driver error; the connection is unusable either way.
    fn close(&mut self) -> DriverResult<()>;
}
