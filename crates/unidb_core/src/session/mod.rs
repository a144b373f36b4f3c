//! Sessions.
//!
//! A [`Session`] is a cheap, cloneable handle over a connection pool and an
//! [`Adapter`]. Every operation runs on a pooled connection, or on the
//! transaction's connection when the handle belongs to a [`Tx`].
//!
//! # Broken connections
//!
//! A connection-level driver error outside a transaction discards the
//! connection and retries the operation once on a freshly opened one.
//! Inside a transaction the error is fatal: the transaction is aborted and
//! every later operation on it fails with
//! [`Error::TransactionAborted`](crate::Error::TransactionAborted).

mod pool;
mod tx;

pub use tx::Tx;

use crate::adapter::Adapter;
use crate::collection::Collection;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::{SessionStats, StatsSnapshot};
use pool::Pool;
use std::sync::Arc;
use tracing::{info, warn};
use tx::TxState;
use unidb_driver::Context;
use uuid::Uuid;

pub(crate) struct SessionInner<A: Adapter> {
    id: Uuid,
    pool: Pool<A>,
    config: Config,
    stats: SessionStats,
}

/// Whether an operation reads or writes, for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Read,
    Write,
    Other,
}

/// A leased connection, returned to the pool on drop.
pub(crate) struct Lease<A: Adapter> {
    inner: Arc<SessionInner<A>>,
    conn: Option<A::Conn>,
    epoch: u64,
    broken: bool,
}

impl<A: Adapter> Lease<A> {
    fn acquire(inner: &Arc<SessionInner<A>>, ctx: &Context, fresh: bool) -> Result<Self> {
        let (conn, epoch) = inner.pool.acquire(ctx, fresh, &inner.stats)?;
        Ok(Self {
            inner: Arc::clone(inner),
            conn: Some(conn),
            epoch,
            broken: false,
        })
    }

    /// Runs `f` on the leased connection, marking it broken on a
    /// connection-level error.
    pub(crate) fn run<T>(
        &mut self,
        ctx: &Context,
        f: &dyn Fn(&A, &mut A::Conn, &Context) -> Result<T>,
    ) -> Result<T> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::invalid_operation("connection already released"));
        };
        let result = f(self.inner.pool.adapter(), conn, ctx);
        if matches!(&result, Err(err) if err.is_connection()) {
            self.broken = true;
        }
        result
    }

    pub(crate) fn discard(&mut self) {
        self.broken = true;
    }
}

impl<A: Adapter> Drop for Lease<A> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.inner
                .pool
                .release(conn, self.epoch, !self.broken, &self.inner.stats);
        }
    }
}

/// A handle to a backend through a connection pool.
pub struct Session<A: Adapter> {
    inner: Arc<SessionInner<A>>,
    ctx: Context,
    tx: Option<Arc<TxState<A>>>,
}

impl<A: Adapter> Clone for Session<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ctx: self.ctx.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<A: Adapter> std::fmt::Debug for Session<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("backend", &self.inner.pool.adapter().name())
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl<A: Adapter> Session<A> {
    /// Opens a session and checks connectivity with one ping.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if no connection can be opened or pinged.
    pub fn open(mut adapter: A, config: Config) -> Result<Self> {
        adapter.configure(&config);
        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            pool: Pool::new(adapter, &config),
            config,
            stats: SessionStats::new(),
        });
        let session = Self {
            inner,
            ctx: Context::background(),
            tx: None,
        };
        session.ping()?;
        info!(
            session = %session.inner.id,
            backend = session.adapter().name(),
            max_open = session.inner.config.max_open_connections,
            "session opened"
        );
        Ok(session)
    }

    /// The same session with operations bound to `ctx`.
    #[must_use]
    pub fn with_context(&self, ctx: Context) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ctx,
            tx: self.tx.clone(),
        }
    }

    /// The context operations run under.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The session identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The adapter.
    pub fn adapter(&self) -> &A {
        self.inner.pool.adapter()
    }

    /// The configuration the session was opened with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// True if this handle belongs to a transaction.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// A handle to a table or collection.
    pub fn collection(&self, name: impl Into<String>) -> Collection<A> {
        Collection::new(self.clone(), name.into())
    }

    /// Lists tables or collections.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn collections(&self) -> Result<Vec<String>> {
        self.run(OpKind::Other, &|a, conn, ctx| a.collections(conn, ctx))
    }

    /// Checks connectivity.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn ping(&self) -> Result<()> {
        self.run(OpKind::Other, &|a, conn, ctx| a.ping(conn, ctx))
    }

    /// Drops cached per-connection state such as prepared statements.
    pub fn reset(&self) {
        self.inner.pool.reset();
    }

    /// Closes idle connections and refuses new operations.
    ///
    /// Connections currently leased are closed when returned.
    pub fn close(&self) {
        if !self.inner.pool.is_closed() {
            self.inner.pool.close();
            info!(session = %self.inner.id, "session closed");
        }
    }

    /// True once [`Session::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    /// Pool gauges and operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner
            .stats
            .snapshot(self.inner.pool.gauges(), self.adapter().cache_stats())
    }

    /// Starts a transaction on a dedicated connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when called on a transaction
    /// handle, or the driver's error.
    pub fn begin(&self) -> Result<Tx<A>> {
        if self.tx.is_some() {
            return Err(Error::invalid_operation("nested transactions are not supported"));
        }
        let begun = self.with_retry(&|lease, ctx| lease.run(ctx, &|a, conn, ctx| a.begin(conn, ctx)));
        let lease = match begun {
            Ok((lease, ())) => lease,
            Err(err) => {
                self.inner.stats.record_error();
                return Err(err);
            }
        };
        self.inner.stats.record_transaction_start();
        let state = Arc::new(TxState::new(lease));
        Ok(Tx::new(Self {
            inner: Arc::clone(&self.inner),
            ctx: self.ctx.clone(),
            tx: Some(state),
        }))
    }

    /// Runs `f` in a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. A
    /// panic in `f` rolls back and then resumes unwinding.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or from begin/commit.
    pub fn tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<A>) -> Result<T>,
    {
        let tx = self.begin()?;
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx))) {
            Ok(Ok(value)) => {
                tx.commit()?;
                Ok(value)
            }
            Ok(Err(err)) => {
                // Roll back, but don't mask the original error.
                if let Err(rollback_err) = tx.rollback() {
                    warn!(session = %self.inner.id, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(session = %self.inner.id, error = %rollback_err, "rollback after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Runs an adapter call on the transaction's connection or on a pooled one.
    pub(crate) fn run<T>(
        &self,
        kind: OpKind,
        f: &dyn Fn(&A, &mut A::Conn, &Context) -> Result<T>,
    ) -> Result<T> {
        let result = match &self.tx {
            Some(state) => state.run(&self.ctx, f),
            None => self
                .with_retry(&|lease, ctx| lease.run(ctx, f))
                .map(|(_, value)| value),
        };
        match (&result, kind) {
            (Err(_), _) => self.inner.stats.record_error(),
            (Ok(_), OpKind::Read) => self.inner.stats.record_read(),
            (Ok(_), OpKind::Write) => self.inner.stats.record_write(),
            (Ok(_), OpKind::Other) => {}
        }
        result
    }

    /// Leases a connection and runs `f`, retrying once on a fresh connection
    /// after a connection-level failure. Returns the lease with the result.
    fn with_retry<T>(
        &self,
        f: &dyn Fn(&mut Lease<A>, &Context) -> Result<T>,
    ) -> Result<(Lease<A>, T)> {
        let mut lease = Lease::acquire(&self.inner, &self.ctx, false)?;
        match f(&mut lease, &self.ctx) {
            Ok(value) => Ok((lease, value)),
            Err(err) if err.is_connection() && self.inner.config.retry_on_broken_connection => {
                lease.discard();
                drop(lease);
                warn!(
                    session = %self.inner.id,
                    backend = self.adapter().name(),
                    error = %err,
                    "connection broken, retrying on a fresh connection"
                );
                self.inner.stats.record_retry();
                let mut lease = Lease::acquire(&self.inner, &self.ctx, true)?;
                let value = f(&mut lease, &self.ctx)?;
                Ok((lease, value))
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) fn stats_handle(&self) -> &SessionStats {
        &self.inner.stats
    }

    pub(crate) fn tx_state(&self) -> Option<&Arc<TxState<A>>> {
        self.tx.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DocumentAdapter, SqlAdapter};
    use crate::compile::Postgres;
    use crate::cond::Condition;
    use std::time::Duration;
    use unidb_codec::Document;
    use unidb_driver::{DriverError, MemoryDriver, MemoryStore, ScriptedDriver, ScriptedSql, StatementKind};

    fn memory(config: Config) -> (MemoryStore, Session<DocumentAdapter<MemoryDriver>>) {
        let store = MemoryStore::new();
        let session = Session::open(DocumentAdapter::new(store.driver()), config).unwrap();
        (store, session)
    }

    fn scripted(config: Config) -> (ScriptedSql, Session<SqlAdapter<ScriptedDriver>>) {
        let script = ScriptedSql::new("postgres");
        let session = Session::open(SqlAdapter::new(script.driver(), Postgres), config).unwrap();
        (script, session)
    }

    #[test]
    fn open_pings_one_connection() {
        let (store, session) = memory(Config::default());
        assert_eq!(store.opened_total(), 1);
        let stats = session.stats();
        assert_eq!((stats.open, stats.idle, stats.in_use), (1, 1, 0));
    }

    #[test]
    fn open_fails_when_backend_is_down() {
        let store = MemoryStore::new();
        store.fail_next_open(DriverError::connection("refused"));
        let err = Session::open(DocumentAdapter::new(store.driver()), Config::default()).unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn broken_connection_is_retried_once() {
        let (script, session) = scripted(Config::default());
        script.break_connections();
        session.collection("users").find(Condition::all()).count().unwrap();
        assert_eq!(session.stats().retries, 1);
        assert_eq!(script.opened_total(), 2);
        assert_eq!(session.stats().connections_discarded, 1);
    }

    #[test]
    fn retry_gives_up_after_one_attempt() {
        let (script, session) = scripted(Config::default());
        script.fail_next(DriverError::connection("reset"));
        script.fail_next(DriverError::connection("reset again"));
        let err = session.collection("users").find(Condition::all()).count().unwrap_err();
        assert!(err.is_connection());
        assert_eq!(session.stats().retries, 1);
    }

    #[test]
    fn retry_can_be_disabled() {
        let (script, session) = scripted(Config::default().retry_on_broken_connection(false));
        script.fail_next(DriverError::connection("reset"));
        assert!(session.ping().is_err());
        assert_eq!(session.stats().retries, 0);
    }

    #[test]
    fn backend_errors_are_not_retried() {
        let (script, session) = scripted(Config::default());
        script.fail_next(DriverError::backend("postgres", "42P01", "relation does not exist"));
        let err = session.collection("nope").find(Condition::all()).count().unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::Backend { .. })));
        assert_eq!(session.stats().retries, 0);
    }

    #[test]
    fn exhausted_pool_waits_for_the_context() {
        let (_store, session) = memory(Config::default().max_open_connections(1));
        let tx = session.begin().unwrap();
        let short = session.with_context(Context::background().with_timeout(Duration::from_millis(30)));
        let err = short.ping().unwrap_err();
        assert!(err.is_canceled());
        tx.rollback().unwrap();
        session.ping().unwrap();
    }

    #[test]
    fn canceled_context_aborts_a_waiting_acquire() {
        let (_store, session) = memory(Config::default().max_open_connections(1));
        let tx = session.begin().unwrap();
        let (ctx, cancel) = Context::background().with_cancel();
        let waiting = session.with_context(ctx);
        let handle = std::thread::spawn(move || waiting.ping());
        std::thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::Canceled)));
        drop(tx);
    }

    #[test]
    fn acquire_timeout_bounds_the_wait() {
        let config = Config::default()
            .max_open_connections(1)
            .acquire_timeout(Duration::from_millis(20));
        let (_store, session) = memory(config);
        let _tx = session.begin().unwrap();
        let err = session.ping().unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::DeadlineExceeded)));
    }

    #[test]
    fn closed_session_refuses_work() {
        let (store, session) = memory(Config::default());
        session.close();
        assert!(session.is_closed());
        assert!(matches!(session.ping(), Err(Error::SessionClosed)));
        assert_eq!(store.open_connections(), 0);
    }

    #[test]
    fn reset_closes_prepared_statements() {
        let (script, session) = scripted(Config::default());
        session.collection("t").find(Condition::all()).count().unwrap();
        session.reset();
        assert_eq!(script.statements_of(StatementKind::CloseStatement).len(), 1);
    }

    #[test]
    fn statement_cache_size_comes_from_config() {
        let (script, session) = scripted(Config::default().statement_cache_size(0));
        session.collection("t").find(Condition::all()).count().unwrap();
        assert!(script.statements_of(StatementKind::Prepare).is_empty());
        assert_eq!(session.stats().statement_cache_misses, 0);
    }

    #[test]
    fn idle_connections_are_capped() {
        let (store, session) = memory(Config::default().max_idle_connections(1));
        let a = session.begin().unwrap();
        let b = session.begin().unwrap();
        assert_eq!(session.stats().in_use, 2);
        a.commit().unwrap();
        b.commit().unwrap();
        let stats = session.stats();
        assert_eq!((stats.open, stats.idle), (1, 1));
        assert_eq!(store.open_connections(), 1);
    }

    #[test]
    fn panic_with_failing_rollback_still_unwinds() {
        let (store, session) = memory(Config::default());
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            session.tx(|tx| -> Result<()> {
                tx.collection("t").insert_doc(Document::new().with("n", 1i64))?;
                store.break_connections();
                panic!("closure failed");
            })
        }));
        assert!(outcome.is_err());
        assert_eq!(store.len("t"), 0);
        session.ping().unwrap();
    }

    #[test]
    fn collections_are_listed() {
        let (store, session) = memory(Config::default());
        store.seed("a", [Document::new().with("x", 1i64)]);
        assert_eq!(session.collections().unwrap(), ["a"]);
    }
}
