//! Fault injection shared by the in-process drivers.

use crate::context::Context;
use crate::error::{DriverError, DriverResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted failures, latency and connection accounting.
#[derive(Debug, Default)]
pub(crate) struct Faults {
    fail_next: Mutex<VecDeque<DriverError>>,
    fail_open: Mutex<VecDeque<DriverError>>,
    latency: Mutex<Option<Duration>>,
    generation: AtomicU64,
    open: AtomicUsize,
    opened: AtomicU64,
}

impl Faults {
    pub(crate) fn push_failure(&self, err: DriverError) {
        self.fail_next.lock().push_back(err);
    }

    pub(crate) fn push_open_failure(&self, err: DriverError) {
        self.fail_open.lock().push_back(err);
    }

    pub(crate) fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Marks every connection opened so far as broken.
    pub(crate) fn break_connections(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Accounts for a new connection, returning its generation.
    pub(crate) fn open(&self, ctx: &Context) -> DriverResult<u64> {
        ctx.check()?;
        if let Some(err) = self.fail_open.lock().pop_front() {
            return Err(err);
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.generation.load(Ordering::SeqCst))
    }

    pub(crate) fn close(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    /// Runs before every connection operation.
    pub(crate) fn gate(&self, ctx: &Context, generation: u64) -> DriverResult<()> {
        ctx.check()?;
        if generation != self.generation.load(Ordering::SeqCst) {
            return Err(DriverError::connection("connection reset by peer"));
        }
        if let Some(err) = self.fail_next.lock().pop_front() {
            return Err(err);
        }
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            ctx.sleep(latency)?;
        }
        Ok(())
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn opened_total(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }
}
