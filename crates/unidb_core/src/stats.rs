//! Session statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//!
//! # Usage
//!
//! ```rust,ignore
//! let session = Session::open(adapter, Config::default())?;
//! // ...
//! let stats = session.stats();
//! println!("open: {} idle: {} in use: {}", stats.open, stats.idle, stats.in_use);
//! println!("retries: {}", stats.retries);
//! ```

use crate::adapter::CacheStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic session counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    reads: AtomicU64,
    writes: AtomicU64,
    retries: AtomicU64,
    connections_opened: AtomicU64,
    connections_discarded: AtomicU64,
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    errors: AtomicU64,
}

impl SessionStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_discarded(&self) {
        self.connections_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read operations (selects and counts).
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Write operations (inserts, updates, deletes, truncates).
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Operations retried on a fresh connection.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns a snapshot combining counters with pool gauges.
    pub(crate) fn snapshot(&self, pool: PoolGauges, cache: CacheStats) -> StatsSnapshot {
        StatsSnapshot {
            open: pool.open,
            idle: pool.idle,
            in_use: pool.open.saturating_sub(pool.idle),
            waiting: pool.waiting,
            reads: self.reads(),
            writes: self.writes(),
            retries: self.retries(),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_discarded: self.connections_discarded.load(Ordering::Relaxed),
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            statement_cache_hits: cache.hits,
            statement_cache_misses: cache.misses,
        }
    }
}

/// Pool occupancy at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PoolGauges {
    pub(crate) open: usize,
    pub(crate) idle: usize,
    pub(crate) waiting: usize,
}

/// A point-in-time snapshot of session statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Connections currently open.
    pub open: usize,
    /// Open connections sitting idle in the pool.
    pub idle: usize,
    /// Open connections leased to callers.
    pub in_use: usize,
    /// Callers waiting for a connection.
    pub waiting: usize,
    /// Read operations.
    pub reads: u64,
    /// Write operations.
    pub writes: u64,
    /// Operations retried after a broken connection.
    pub retries: u64,
    /// Connections opened over the session's lifetime.
    pub connections_opened: u64,
    /// Connections discarded as broken.
    pub connections_discarded: u64,
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions rolled back, explicitly or on failure.
    pub transactions_rolled_back: u64,
    /// Operations that returned an error.
    pub errors: u64,
    /// Prepared statements found in a connection's cache.
    pub statement_cache_hits: u64,
    /// Statements prepared on a cache miss.
    pub statement_cache_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = SessionStats::new();
        assert_eq!(stats.reads(), 0);
        assert_eq!(stats.writes(), 0);
        assert_eq!(stats.retries(), 0);
    }

    #[test]
    fn snapshot_derives_in_use() {
        let stats = SessionStats::new();
        stats.record_read();
        stats.record_write();
        stats.record_transaction_start();
        stats.record_transaction_rollback();
        let snap = stats.snapshot(
            PoolGauges {
                open: 3,
                idle: 1,
                waiting: 0,
            },
            CacheStats::default(),
        );
        assert_eq!(snap.in_use, 2);
        assert_eq!(snap.reads, 1);
        assert_eq!(snap.transactions_rolled_back, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(SessionStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_read();
                        s.record_retry();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.reads(), 800);
        assert_eq!(stats.retries(), 800);
    }
}
