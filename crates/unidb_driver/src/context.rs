//! Cancellation and deadlines.

use crate::error::{DriverError, DriverResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Carries cancellation and a deadline into every driver call.
///
/// Contexts are cheap to clone. A derived context observes its parent's
/// cancellation and never outlives the parent's deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Vec<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Context {
    /// A context that is never canceled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context that expires at `deadline` (or earlier, if the
    /// parent's deadline comes first).
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// Derives a cancelable context.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let mut cancel = self.cancel.clone();
        cancel.push(Arc::clone(&flag));
        (
            Self {
                cancel,
                deadline: self.deadline,
            },
            CancelHandle { flag },
        )
    }

    /// Returns true if this context or any ancestor was canceled.
    pub fn is_canceled(&self) -> bool {
        self.cancel.iter().any(|flag| flag.load(Ordering::SeqCst))
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails if the context is done.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Canceled`] or [`DriverError::DeadlineExceeded`].
    pub fn check(&self) -> DriverResult<()> {
        if self.is_canceled() {
            return Err(DriverError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DriverError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleeps for `duration`, waking early if the context is done.
    ///
    /// # Errors
    ///
    /// Returns the context error if it fires before the sleep completes.
    pub fn sleep(&self, duration: Duration) -> DriverResult<()> {
        let until = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(until - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_fires() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn cancel_propagates_to_children_only() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();

        child_handle.cancel();
        assert_eq!(child.check(), Err(DriverError::Canceled));
        assert!(parent.check().is_ok());

        let (other_child, _) = parent.with_cancel();
        handle.cancel();
        assert_eq!(other_child.check(), Err(DriverError::Canceled));
    }

    #[test]
    fn child_deadline_never_outlives_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let start = Instant::now();
        assert_eq!(
            ctx.sleep(Duration::from_secs(5)),
            Err(DriverError::DeadlineExceeded)
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let (ctx, handle) = Context::background().with_cancel();
        let canceler = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.cancel();
        });
        assert_eq!(ctx.sleep(Duration::from_secs(5)), Err(DriverError::Canceled));
        canceler.join().unwrap();
    }
}
