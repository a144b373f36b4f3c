//! Stress runs against a session.
//!
//! These runs exercise the pool, batch pipeline and transactions under
//! heavy load and concurrent access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use unidb_codec::Document;
use unidb_core::{cond, Adapter, Comparison, Error, Session};

/// Collection written by the stress runs.
pub const STRESS: &str = "stress";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Logs a summary of the run.
    pub fn log_summary(&self, name: &str) {
        tracing::info!(
            run = name,
            total = self.total_ops,
            successful = self.successful_ops,
            failed = self.failed_ops,
            duration_ms = self.duration.as_millis() as u64,
            ops_per_second = %format_args!("{:.2}", self.ops_per_second),
            "stress run finished"
        );
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Rows per batch chunk.
    pub chunk_size: usize,
    /// Number of distinct rows.
    pub row_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            chunk_size: 100,
            row_count: 1_000,
        }
    }
}

fn row(n: usize) -> Document {
    Document::new().with("n", n as i64).with("label", format!("row {n}"))
}

fn tally(result: Result<(), Error>, successful: &mut usize, failed: &mut usize) {
    match result {
        Ok(()) => *successful += 1,
        Err(_) => *failed += 1,
    }
}

/// Inserts `row_count` rows through one batch.
pub fn stress_batch_insert<A: Adapter>(session: &Session<A>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut batch = session.collection(STRESS).batch(config.chunk_size);
    let mut queued = 0usize;
    for n in 0..config.row_count {
        if batch.values_doc(row(n)).is_err() {
            break;
        }
        queued += 1;
    }
    match batch.wait() {
        Ok(summary) => {
            let written = summary.rows as usize;
            StressTestResult::new(written, config.row_count - written, start.elapsed())
        }
        Err(_) => StressTestResult::new(0, queued.max(1), start.elapsed()),
    }
}

/// Runs point reads from many threads sharing one session.
pub fn stress_concurrent_reads<A: Adapter>(session: &Session<A>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let threads = config.threads.max(1);
    let ops_per_thread = config.operations / threads;
    let row_count = config.row_count.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let session = session.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                let collection = session.collection(STRESS);
                for i in 0..ops_per_thread {
                    let n = ((t * ops_per_thread + i) % row_count) as i64;
                    match collection.find(cond! { "n" => n }).count() {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs an insert/read/update mix on one thread.
pub fn stress_mixed_operations<A: Adapter>(session: &Session<A>, config: &StressConfig) -> StressTestResult {
    let collection = session.collection(STRESS);
    let row_count = config.row_count.max(1);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let n = (i % row_count) as i64;
        let result = match i % 3 {
            0 => collection.insert_doc(row(n as usize)).map(|_| ()),
            1 => collection.find(cond! { "n" => n }).all_documents().map(|_| ()),
            _ => collection
                .find(cond! { "n" => Comparison::gte(n) })
                .update(Document::new().with("label", "touched"))
                .map(|_| ()),
        };
        tally(result, &mut successful, &mut failed);
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Alternates committed and rolled-back transactions.
pub fn stress_transaction_aborts<A: Adapter>(session: &Session<A>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        // Every other transaction will fail intentionally
        let should_fail = i % 2 == 0;

        let result = session.tx(|tx| {
            tx.collection(STRESS).insert_doc(row(i))?;
            if should_fail {
                Err(Error::invalid_operation("intentional"))
            } else {
                Ok(())
            }
        });
        tally(result, &mut successful, &mut failed);
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{memory_session, memory_session_with};
    use unidb_core::Config;

    #[test]
    fn test_batch_insert() {
        let (store, session) = memory_session();
        let config = StressConfig {
            row_count: 1_000,
            chunk_size: 64,
            ..Default::default()
        };

        let result = stress_batch_insert(&session, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(store.len(STRESS), 1_000);
    }

    #[test]
    fn test_concurrent_reads_share_a_small_pool() {
        let (store, session) = memory_session_with(Config::default().max_open_connections(2));
        store.seed(STRESS, (0..100).map(row));
        let config = StressConfig {
            operations: 1_000,
            threads: 8,
            row_count: 100,
            ..Default::default()
        };

        let result = stress_concurrent_reads(&session, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
        assert!(session.stats().open <= 2);
    }

    #[test]
    fn test_mixed_operations() {
        let (store, session) = memory_session();
        store.seed(STRESS, (0..100).map(row));
        let config = StressConfig {
            operations: 999,
            row_count: 100,
            ..Default::default()
        };

        let result = stress_mixed_operations(&session, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(store.len(STRESS), 100 + 333);
    }

    #[test]
    fn test_transaction_aborts() {
        let (store, session) = memory_session();
        let config = StressConfig {
            operations: 100,
            ..Default::default()
        };

        let result = stress_transaction_aborts(&session, &config);
        // Half should succeed, half should fail (intentionally)
        assert_eq!(result.successful_ops, 50);
        assert_eq!(result.failed_ops, 50);
        assert_eq!(store.len(STRESS), 50);
    }
}
