//! Scripted SQL driver.
//!
//! Records every statement it receives and answers from a script: persistent
//! rules matched by SQL fragment first, then a FIFO queue of one-shot
//! replies. With nothing scripted, queries return no rows and statements
//! affect nothing.

use crate::context::Context;
use crate::error::{DriverError, DriverResult};
use crate::faults::Faults;
use crate::rows::{BufferedRows, RowSource};
use crate::sql::{ExecResult, SqlConnection, SqlDriver, StatementId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use unidb_codec::{Document, WireValue};

/// A scripted answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Rows for a query; for a statement, the row count is reported as affected.
    Rows(Vec<Document>),
    /// Rows followed by a mid-stream failure.
    RowsThenError(Vec<Document>, DriverError),
    /// Outcome of a statement.
    Exec(ExecResult),
    /// Fail the call.
    Error(DriverError),
}

/// What kind of call a [`Statement`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `prepare`.
    Prepare,
    /// `close_statement`.
    CloseStatement,
    /// `execute` or `execute_prepared`.
    Execute,
    /// `query` or `query_prepared`.
    Query,
    /// `begin`.
    Begin,
    /// `commit`.
    Commit,
    /// `rollback`.
    Rollback,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Connection that made the call, numbered from 1.
    pub connection: u64,
    /// Kind of call.
    pub kind: StatementKind,
    /// SQL text (for prepared calls, the prepared text).
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<WireValue>,
    /// Prepared statement used, if any.
    pub prepared: Option<StatementId>,
}

#[derive(Debug)]
struct ScriptInner {
    name: String,
    log: Mutex<Vec<Statement>>,
    queue: Mutex<VecDeque<Reply>>,
    rules: Mutex<Vec<(String, Reply)>>,
    faults: Faults,
    next_connection: AtomicU64,
    next_statement: AtomicU64,
}

/// Handle to a scripted SQL backend.
#[derive(Debug, Clone)]
pub struct ScriptedSql {
    inner: Arc<ScriptInner>,
}

impl Default for ScriptedSql {
    fn default() -> Self {
        Self::new("scripted")
    }
}

impl ScriptedSql {
    /// Creates a script reporting `name` as its backend.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScriptInner {
                name: name.into(),
                log: Mutex::new(Vec::new()),
                queue: Mutex::new(VecDeque::new()),
                rules: Mutex::new(Vec::new()),
                faults: Faults::default(),
                next_connection: AtomicU64::new(1),
                next_statement: AtomicU64::new(1),
            }),
        }
    }

    /// Returns a driver for this script.
    #[must_use]
    pub fn driver(&self) -> ScriptedDriver {
        ScriptedDriver {
            script: self.clone(),
        }
    }

    /// Queues a one-shot reply for the next query or statement.
    pub fn reply(&self, reply: Reply) {
        self.inner.queue.lock().push_back(reply);
    }

    /// Answers every call whose SQL contains `fragment` with `reply`.
    ///
    /// Rules are checked in the order they were added, before the queue.
    pub fn reply_when(&self, fragment: impl Into<String>, reply: Reply) {
        self.inner.rules.lock().push((fragment.into(), reply));
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.inner.log.lock().clone()
    }

    /// SQL text of recorded queries and statements, in order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.inner
            .log
            .lock()
            .iter()
            .filter(|s| matches!(s.kind, StatementKind::Execute | StatementKind::Query))
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Recorded calls of one kind.
    #[must_use]
    pub fn statements_of(&self, kind: StatementKind) -> Vec<Statement> {
        self.inner
            .log
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_log(&self) {
        self.inner.log.lock().clear();
    }

    /// Makes the next connection operation fail with `err`.
    pub fn fail_next(&self, err: DriverError) {
        self.inner.faults.push_failure(err);
    }

    /// Makes the next connection attempt fail with `err`.
    pub fn fail_next_open(&self, err: DriverError) {
        self.inner.faults.push_open_failure(err);
    }

    /// Breaks every connection opened so far.
    pub fn break_connections(&self) {
        self.inner.faults.break_connections();
    }

    /// Delays every operation by `latency` (context-aware).
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.faults.set_latency(latency);
    }

    /// Connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.inner.faults.open_connections()
    }

    /// Connections opened over the script's lifetime.
    #[must_use]
    pub fn opened_total(&self) -> u64 {
        self.inner.faults.opened_total()
    }

    fn record(&self, statement: Statement) {
        trace!(backend = %self.inner.name, sql = %statement.sql, "scripted call");
        self.inner.log.lock().push(statement);
    }

    fn next_reply(&self, sql: &str) -> Option<Reply> {
        let rule = self
            .inner
            .rules
            .lock()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone());
        rule.or_else(|| self.inner.queue.lock().pop_front())
    }
}

/// Driver for a [`ScriptedSql`] backend.
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    script: ScriptedSql,
}

impl SqlDriver for ScriptedDriver {
    type Conn = ScriptedConnection;

    fn name(&self) -> &str {
        &self.script.inner.name
    }

    fn open(&self, ctx: &Context) -> DriverResult<ScriptedConnection> {
        let generation = self.script.inner.faults.open(ctx)?;
        Ok(ScriptedConnection {
            script: self.script.clone(),
            id: self.script.inner.next_connection.fetch_add(1, Ordering::SeqCst),
            generation,
            prepared: HashMap::new(),
            in_tx: false,
            closed: false,
        })
    }
}

/// A connection to a [`ScriptedSql`] backend.
#[derive(Debug)]
pub struct ScriptedConnection {
    script: ScriptedSql,
    id: u64,
    generation: u64,
    prepared: HashMap<StatementId, String>,
    in_tx: bool,
    closed: bool,
}

impl ScriptedConnection {
    fn enter(&self, ctx: &Context) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.script.inner.faults.gate(ctx, self.generation)
    }

    fn record(&self, kind: StatementKind, sql: &str, params: &[WireValue], prepared: Option<StatementId>) {
        self.script.record(Statement {
            connection: self.id,
            kind,
            sql: sql.to_string(),
            params: params.to_vec(),
            prepared,
        });
    }

    fn prepared_sql(&self, id: StatementId) -> DriverResult<String> {
        self.prepared
            .get(&id)
            .cloned()
            .ok_or(DriverError::UnknownStatement(id.0))
    }

    fn run_execute(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[WireValue],
        prepared: Option<StatementId>,
    ) -> DriverResult<ExecResult> {
        self.enter(ctx)?;
        self.record(StatementKind::Execute, sql, params, prepared);
        match self.script.next_reply(sql) {
            Some(Reply::Exec(result)) => Ok(result),
            Some(Reply::Rows(rows) | Reply::RowsThenError(rows, _)) => Ok(ExecResult {
                rows_affected: rows.len() as u64,
                last_insert_id: None,
            }),
            Some(Reply::Error(err)) => Err(err),
            None => Ok(ExecResult::default()),
        }
    }

    fn run_query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[WireValue],
        prepared: Option<StatementId>,
    ) -> DriverResult<Box<dyn RowSource>> {
        self.enter(ctx)?;
        self.record(StatementKind::Query, sql, params, prepared);
        let rows = match self.script.next_reply(sql) {
            Some(Reply::Rows(rows)) => BufferedRows::new(rows),
            Some(Reply::RowsThenError(rows, err)) => BufferedRows::failing_after(rows, err),
            Some(Reply::Exec(_)) | None => BufferedRows::default(),
            Some(Reply::Error(err)) => return Err(err),
        };
        Ok(Box::new(rows))
    }
}

impl SqlConnection for ScriptedConnection {
    fn prepare(&mut self, ctx: &Context, sql: &str) -> DriverResult<StatementId> {
        self.enter(ctx)?;
        let id = StatementId(self.script.inner.next_statement.fetch_add(1, Ordering::SeqCst));
        self.record(StatementKind::Prepare, sql, &[], Some(id));
        self.prepared.insert(id, sql.to_string());
        Ok(id)
    }

    fn close_statement(&mut self, id: StatementId) -> DriverResult<()> {
        let sql = self
            .prepared
            .remove(&id)
            .ok_or(DriverError::UnknownStatement(id.0))?;
        self.record(StatementKind::CloseStatement, &sql, &[], Some(id));
        Ok(())
    }

    fn execute(&mut self, ctx: &Context, sql: &str, params: &[WireValue]) -> DriverResult<ExecResult> {
        self.run_execute(ctx, sql, params, None)
    }

    fn execute_prepared(
        &mut self,
        ctx: &Context,
        id: StatementId,
        params: &[WireValue],
    ) -> DriverResult<ExecResult> {
        let sql = self.prepared_sql(id)?;
        self.run_execute(ctx, &sql, params, Some(id))
    }

    fn query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[WireValue],
    ) -> DriverResult<Box<dyn RowSource>> {
        self.run_query(ctx, sql, params, None)
    }

    fn query_prepared(
        &mut self,
        ctx: &Context,
        id: StatementId,
        params: &[WireValue],
    ) -> DriverResult<Box<dyn RowSource>> {
        let sql = self.prepared_sql(id)?;
        self.run_query(ctx, &sql, params, Some(id))
    }

    fn begin(&mut self, ctx: &Context) -> DriverResult<()> {
        self.enter(ctx)?;
        if self.in_tx {
            return Err(DriverError::TransactionState("transaction already in progress".into()));
        }
        self.record(StatementKind::Begin, "BEGIN", &[], None);
        self.in_tx = true;
        Ok(())
    }

    fn commit(&mut self, ctx: &Context) -> DriverResult<()> {
        self.enter(ctx)?;
        if !self.in_tx {
            return Err(DriverError::TransactionState("no transaction in progress".into()));
        }
        self.in_tx = false;
        self.record(StatementKind::Commit, "COMMIT", &[], None);
        Ok(())
    }

    fn rollback(&mut self, ctx: &Context) -> DriverResult<()> {
        let had_tx = std::mem::replace(&mut self.in_tx, false);
        self.enter(ctx)?;
        if !had_tx {
            return Err(DriverError::TransactionState("no transaction in progress".into()));
        }
        self.record(StatementKind::Rollback, "ROLLBACK", &[], None);
        Ok(())
    }

    fn ping(&mut self, ctx: &Context) -> DriverResult<()> {
        self.enter(ctx)
    }

    fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            self.prepared.clear();
            self.script.inner.faults.close();
        }
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
