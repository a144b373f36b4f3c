//! Connection pool.

use crate::adapter::Adapter;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::{PoolGauges, SessionStats};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;
use unidb_driver::{Context, DriverError};

/// Longest single wait before re-checking the caller's context.
const WAIT_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct PoolState<C> {
    idle: Vec<(C, u64)>,
    open: usize,
    waiting: usize,
    epoch: u64,
    closed: bool,
}

/// A bounded set of adapter connections.
///
/// Connections are created lazily up to `max_open_connections` and kept
/// idle up to `max_idle_connections`. Callers beyond the limit wait until
/// a connection is returned, their context ends, or `acquire_timeout`
/// passes.
pub(crate) struct Pool<A: Adapter> {
    adapter: A,
    max_open: usize,
    max_idle: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState<A::Conn>>,
    available: Condvar,
}

impl<A: Adapter> Pool<A> {
    pub(crate) fn new(adapter: A, config: &Config) -> Self {
        Self {
            adapter,
            max_open: config.max_open_connections,
            max_idle: config.max_idle_connections,
            acquire_timeout: config.acquire_timeout,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open: 0,
                waiting: 0,
                epoch: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub(crate) fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Takes a connection, opening one if the limit allows.
    ///
    /// With `fresh`, idle connections are not reused; one may be closed to
    /// make room for the new connection. Driver calls run with the pool
    /// unlocked.
    pub(crate) fn acquire(&self, ctx: &Context, fresh: bool, stats: &SessionStats) -> Result<(A::Conn, u64)> {
        let give_up = (!self.acquire_timeout.is_zero()).then(|| Instant::now() + self.acquire_timeout);
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::SessionClosed);
            }
            ctx.check()?;
            if !fresh {
                if let Some(entry) = state.idle.pop() {
                    return Ok(entry);
                }
            } else if self.at_limit(&state) {
                if let Some((stale, _)) = state.idle.pop() {
                    state.open -= 1;
                    MutexGuard::unlocked(&mut state, || self.adapter.close(stale));
                    continue;
                }
            }
            if !self.at_limit(&state) {
                state.open += 1;
                let epoch = state.epoch;
                drop(state);
                return match self.adapter.connect(ctx) {
                    Ok(conn) => {
                        stats.record_connection_opened();
                        debug!(backend = self.adapter.name(), "opened connection");
                        Ok((conn, epoch))
                    }
                    Err(err) => {
                        let mut state = self.state.lock();
                        state.open -= 1;
                        self.available.notify_one();
                        Err(err)
                    }
                };
            }

            let mut slice = WAIT_SLICE;
            if let Some(remaining) = ctx.remaining() {
                slice = slice.min(remaining);
            }
            if let Some(limit) = give_up {
                let now = Instant::now();
                if now >= limit {
                    return Err(DriverError::DeadlineExceeded.into());
                }
                slice = slice.min(limit - now);
            }
            state.waiting += 1;
            let _ = self.available.wait_for(&mut state, slice);
            state.waiting -= 1;
        }
    }

    /// Returns a connection; broken ones and overflow are closed.
    pub(crate) fn release(&self, mut conn: A::Conn, epoch: u64, reusable: bool, stats: &SessionStats) {
        if !reusable {
            stats.record_connection_discarded();
        }
        let mut state = self.state.lock();
        let current = state.epoch;
        if reusable && epoch != current {
            MutexGuard::unlocked(&mut state, || self.adapter.reset(&mut conn));
        }
        if reusable && !state.closed && state.idle.len() < self.max_idle {
            state.idle.push((conn, current));
        } else {
            state.open = state.open.saturating_sub(1);
            drop(state);
            self.adapter.close(conn);
        }
        self.available.notify_one();
    }

    /// Clears per-connection state; connections in use are reset on return.
    pub(crate) fn reset(&self) {
        let (idle, epoch) = {
            let mut state = self.state.lock();
            state.epoch += 1;
            (std::mem::take(&mut state.idle), state.epoch)
        };
        let mut refreshed = Vec::with_capacity(idle.len());
        for (mut conn, _) in idle {
            self.adapter.reset(&mut conn);
            refreshed.push((conn, epoch));
        }
        // Connections returned meanwhile may have filled the idle list.
        let mut surplus = Vec::new();
        {
            let mut state = self.state.lock();
            for entry in refreshed {
                if !state.closed && state.idle.len() < self.max_idle {
                    state.idle.push(entry);
                } else {
                    state.open = state.open.saturating_sub(1);
                    surplus.push(entry.0);
                }
            }
        }
        for conn in surplus {
            self.adapter.close(conn);
        }
        self.available.notify_all();
    }

    /// Closes idle connections and refuses further acquires.
    pub(crate) fn close(&self) {
        let idle = {
            let mut state = self.state.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.open = state.open.saturating_sub(idle.len());
            idle
        };
        for (conn, _) in idle {
            self.adapter.close(conn);
        }
        self.available.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn gauges(&self) -> PoolGauges {
        let state = self.state.lock();
        PoolGauges {
            open: state.open,
            idle: state.idle.len(),
            waiting: state.waiting,
        }
    }

    fn at_limit(&self, state: &PoolState<A::Conn>) -> bool {
        self.max_open != 0 && state.open >= self.max_open
    }
}

impl<A: Adapter> Drop for Pool<A> {
    fn drop(&mut self) {
        for (conn, _) in std::mem::take(&mut self.state.get_mut().idle) {
            self.adapter.close(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DocumentAdapter, InsertOutcome};
    use crate::query::Query;
    use std::sync::Arc;
    use std::thread;
    use unidb_codec::Document;
    use unidb_driver::{MemoryDriver, MemoryStore, RowSource};

    type Conn = <DocumentAdapter<MemoryDriver> as Adapter>::Conn;

    /// Memory adapter whose close and reset take `delay`.
    struct SlowTeardown {
        inner: DocumentAdapter<MemoryDriver>,
        delay: Duration,
    }

    impl Adapter for SlowTeardown {
        type Conn = Conn;

        fn name(&self) -> &str {
            self.inner.name()
        }
        fn connect(&self, ctx: &Context) -> Result<Conn> {
            self.inner.connect(ctx)
        }
        fn ping(&self, conn: &mut Conn, ctx: &Context) -> Result<()> {
            self.inner.ping(conn, ctx)
        }
        fn reset(&self, conn: &mut Conn) {
            thread::sleep(self.delay);
            self.inner.reset(conn);
        }
        fn close(&self, conn: Conn) {
            thread::sleep(self.delay);
            self.inner.close(conn);
        }
        fn begin(&self, conn: &mut Conn, ctx: &Context) -> Result<()> {
            self.inner.begin(conn, ctx)
        }
        fn commit(&self, conn: &mut Conn, ctx: &Context) -> Result<()> {
            self.inner.commit(conn, ctx)
        }
        fn rollback(&self, conn: &mut Conn, ctx: &Context) -> Result<()> {
            self.inner.rollback(conn, ctx)
        }
        fn select(&self, conn: &mut Conn, ctx: &Context, query: &Query) -> Result<Box<dyn RowSource>> {
            self.inner.select(conn, ctx, query)
        }
        fn count(&self, conn: &mut Conn, ctx: &Context, query: &Query) -> Result<u64> {
            self.inner.count(conn, ctx, query)
        }
        fn insert(
            &self,
            conn: &mut Conn,
            ctx: &Context,
            collection: &str,
            rows: &[Document],
            returning: Option<&str>,
        ) -> Result<InsertOutcome> {
            self.inner.insert(conn, ctx, collection, rows, returning)
        }
        fn update(&self, conn: &mut Conn, ctx: &Context, query: &Query, set: &Document) -> Result<u64> {
            self.inner.update(conn, ctx, query, set)
        }
        fn delete(&self, conn: &mut Conn, ctx: &Context, query: &Query) -> Result<u64> {
            self.inner.delete(conn, ctx, query)
        }
        fn truncate(&self, conn: &mut Conn, ctx: &Context, collection: &str) -> Result<()> {
            self.inner.truncate(conn, ctx, collection)
        }
        fn collections(&self, conn: &mut Conn, ctx: &Context) -> Result<Vec<String>> {
            self.inner.collections(conn, ctx)
        }
    }

    const DELAY: Duration = Duration::from_millis(200);

    fn slow_pool(max_open: usize) -> (MemoryStore, Arc<Pool<SlowTeardown>>, Arc<SessionStats>) {
        let store = MemoryStore::new();
        let adapter = SlowTeardown {
            inner: DocumentAdapter::new(store.driver()),
            delay: DELAY,
        };
        let config = Config::default().max_open_connections(max_open).max_idle_connections(4);
        (store, Arc::new(Pool::new(adapter, &config)), Arc::new(SessionStats::default()))
    }

    fn fill_idle(pool: &Pool<SlowTeardown>, stats: &SessionStats, count: usize) {
        let ctx = Context::background();
        let conns: Vec<_> = (0..count).map(|_| pool.acquire(&ctx, false, stats).unwrap()).collect();
        for (conn, epoch) in conns {
            pool.release(conn, epoch, true, stats);
        }
    }

    /// Runs `f` on another thread and measures how long `gauges` blocks meanwhile.
    fn gauges_wait_during(
        pool: &Arc<Pool<SlowTeardown>>,
        f: impl FnOnce(&Pool<SlowTeardown>) + Send + 'static,
    ) -> Duration {
        let busy = Arc::clone(pool);
        let handle = thread::spawn(move || f(&busy));
        thread::sleep(DELAY / 4);
        let start = Instant::now();
        pool.gauges();
        let waited = start.elapsed();
        handle.join().unwrap();
        waited
    }

    #[test]
    fn fresh_acquire_closes_the_stale_connection_unlocked() {
        let (store, pool, stats) = slow_pool(1);
        fill_idle(&pool, &stats, 1);
        let acquirer = Arc::clone(&stats);
        let waited = gauges_wait_during(&pool, move |pool| {
            let (conn, epoch) = pool.acquire(&Context::background(), true, &acquirer).unwrap();
            pool.release(conn, epoch, true, &acquirer);
        });
        assert!(waited < DELAY / 2, "gauges blocked for {waited:?}");
        assert_eq!(store.opened_total(), 2);
        assert_eq!(store.open_connections(), 1);
        assert_eq!(pool.gauges().open, 1);
    }

    #[test]
    fn reset_runs_unlocked_and_keeps_idle_connections() {
        let (store, pool, stats) = slow_pool(0);
        fill_idle(&pool, &stats, 2);
        let waited = gauges_wait_during(&pool, |pool| pool.reset());
        assert!(waited < DELAY / 2, "gauges blocked for {waited:?}");
        let gauges = pool.gauges();
        assert_eq!((gauges.open, gauges.idle), (2, 2));
        assert_eq!(store.open_connections(), 2);
    }
}
