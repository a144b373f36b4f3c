//! Transactions.

use super::{Lease, Session};
use crate::adapter::Adapter;
use crate::collection::Collection;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use tracing::warn;
use unidb_driver::Context;

/// State of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TxStatus {
    /// Operations may run.
    Active,
    /// Committed.
    Committed,
    /// Rolled back.
    RolledBack,
    /// Failed on a broken connection; only rollback is accepted.
    Aborted(String),
}

struct Slot<A: Adapter> {
    lease: Option<Lease<A>>,
    status: TxStatus,
}

/// Connection and status shared by every handle of one transaction.
pub(crate) struct TxState<A: Adapter> {
    slot: Mutex<Slot<A>>,
}

impl<A: Adapter> TxState<A> {
    pub(crate) fn new(lease: Lease<A>) -> Self {
        Self {
            slot: Mutex::new(Slot {
                lease: Some(lease),
                status: TxStatus::Active,
            }),
        }
    }

    fn ensure_active(status: &TxStatus) -> Result<()> {
        match status {
            TxStatus::Active => Ok(()),
            TxStatus::Committed => Err(Error::invalid_operation("transaction already committed")),
            TxStatus::RolledBack => Err(Error::invalid_operation("transaction already rolled back")),
            TxStatus::Aborted(reason) => Err(Error::transaction_aborted(reason.clone())),
        }
    }

    pub(crate) fn status(&self) -> TxStatus {
        self.slot.lock().status.clone()
    }

    /// Runs `f` on the transaction's connection.
    ///
    /// A connection-level failure aborts the transaction; the failing
    /// operation still reports its own error.
    pub(crate) fn run<T>(
        &self,
        ctx: &Context,
        f: &dyn Fn(&A, &mut A::Conn, &Context) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.slot.lock();
        Self::ensure_active(&slot.status)?;
        let Some(lease) = slot.lease.as_mut() else {
            return Err(Error::invalid_operation("transaction has no connection"));
        };
        let result = lease.run(ctx, f);
        if let Err(err) = &result {
            if err.is_connection() {
                slot.status = TxStatus::Aborted(err.to_string());
                slot.lease = None;
            }
        }
        result
    }

    /// Commits or rolls back, releasing the connection either way.
    pub(crate) fn finish(&self, ctx: &Context, commit: bool) -> Result<()> {
        let mut slot = self.slot.lock();
        match slot.status.clone() {
            TxStatus::Active => {}
            TxStatus::Aborted(_) if !commit => {
                slot.status = TxStatus::RolledBack;
                slot.lease = None;
                return Ok(());
            }
            status => return Self::ensure_active(&status),
        }
        let Some(mut lease) = slot.lease.take() else {
            return Err(Error::invalid_operation("transaction has no connection"));
        };
        let result = if commit {
            lease.run(ctx, &|a, conn, ctx| a.commit(conn, ctx))
        } else {
            lease.run(ctx, &|a, conn, ctx| a.rollback(conn, ctx))
        };
        slot.status = match (&result, commit) {
            (Ok(()), true) => TxStatus::Committed,
            (Err(err), true) => TxStatus::Aborted(err.to_string()),
            (_, false) => TxStatus::RolledBack,
        };
        if result.is_err() {
            // The backend may still hold the transaction open.
            lease.discard();
        }
        result
    }
}

/// A transaction guard.
///
/// Collections obtained from the guard run on the transaction's
/// connection. Dropping an active guard rolls back.
pub struct Tx<A: Adapter> {
    session: Session<A>,
}

impl<A: Adapter> Tx<A> {
    pub(crate) fn new(session: Session<A>) -> Self {
        Self { session }
    }

    fn state(&self) -> Result<&TxState<A>> {
        self.session
            .tx_state()
            .map(|state| &**state)
            .ok_or_else(|| Error::invalid_operation("not a transaction handle"))
    }

    /// The session handle bound to this transaction.
    pub fn session(&self) -> &Session<A> {
        &self.session
    }

    /// A handle to a table or collection inside the transaction.
    pub fn collection(&self, name: impl Into<String>) -> Collection<A> {
        self.session.collection(name)
    }

    /// True until the transaction commits, rolls back or aborts.
    pub fn is_active(&self) -> bool {
        self.state()
            .map(|s| s.status() == TxStatus::Active)
            .unwrap_or(false)
    }

    /// True if a broken connection aborted the transaction.
    pub fn is_aborted(&self) -> bool {
        self.state()
            .map(|s| matches!(s.status(), TxStatus::Aborted(_)))
            .unwrap_or(false)
    }

    /// Commits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionAborted`] if the transaction was aborted,
    /// or the driver's error.
    pub fn commit(self) -> Result<()> {
        let result = self.state()?.finish(self.session.context(), true);
        let stats = self.session.stats_handle();
        match &result {
            Ok(()) => stats.record_transaction_commit(),
            Err(_) => stats.record_error(),
        }
        result
    }

    /// Rolls back.
    ///
    /// # Errors
    ///
    /// Returns the driver's error; the connection is discarded in that case.
    pub fn rollback(self) -> Result<()> {
        self.rollback_in_place()
    }

    fn rollback_in_place(&self) -> Result<()> {
        let result = self.state()?.finish(self.session.context(), false);
        self.session.stats_handle().record_transaction_rollback();
        result
    }
}

impl<A: Adapter> std::fmt::Debug for Tx<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("session", &self.session.id())
            .field("active", &self.is_active())
            .finish()
    }
}

impl<A: Adapter> Drop for Tx<A> {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(err) = self.rollback_in_place() {
                warn!(session = %self.session.id(), error = %err, "rollback on drop failed");
            }
        }
    }
}
