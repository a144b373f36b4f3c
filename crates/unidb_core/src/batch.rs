//! Batch inserts.
//!
//! A [`BatchInserter`] streams rows through a bounded channel to one
//! consumer thread, which writes them as multi-row `INSERT`s of a fixed
//! chunk size. Producers block while the channel is full.
//!
//! ```rust,ignore
//! let mut batch = session.collection("events").batch(500);
//! for event in events {
//!     batch.values(&event)?;
//! }
//! let summary = batch.wait()?;
//! assert_eq!(summary.rows, events.len() as u64);
//! ```
//!
//! The first failing chunk stops the batch: later chunks are dropped and
//! the error is returned from the next `values` call and from `wait`.

use crate::adapter::Adapter;
use crate::collection::Collection;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};
use unidb_codec::{Document, EncodeMode, FieldMapping, Record, WireValue};

/// What a finished batch wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Insert statements executed.
    pub statements: u64,
    /// Rows sent to the backend.
    pub rows: u64,
    /// Generated keys in row order, when asked for.
    pub keys: Vec<WireValue>,
}

#[derive(Debug, Default)]
struct Shared {
    error: Mutex<Option<Error>>,
    summary: Mutex<BatchSummary>,
}

impl Shared {
    fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }

    fn fail(&self, err: Error) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

/// A concurrent batch insert into one collection.
pub struct BatchInserter<A: Adapter> {
    collection: Collection<A>,
    chunk_size: usize,
    returning: Option<String>,
    sender: Option<SyncSender<Document>>,
    worker: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    done: bool,
}

impl<A: Adapter> BatchInserter<A> {
    pub(crate) fn new(collection: Collection<A>, chunk_size: usize) -> Self {
        Self {
            collection,
            chunk_size: chunk_size.max(1),
            returning: None,
            sender: None,
            worker: None,
            shared: Arc::new(Shared::default()),
            done: false,
        }
    }

    /// Collects the generated value of `key_column` for every row.
    #[must_use]
    pub fn with_returning(mut self, key_column: impl Into<String>) -> Self {
        self.returning = Some(key_column.into());
        self
    }

    /// Queues a record.
    ///
    /// # Errors
    ///
    /// Returns codec errors for the record, or the error that stopped the
    /// batch.
    pub fn values<T: Record>(&mut self, record: &T) -> Result<()> {
        let row = FieldMapping::<T>::of()?.encode_with(record, EncodeMode::Insert)?;
        self.values_doc(row)
    }

    /// Queues a raw row, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the batch, or
    /// [`Error::InvalidOperation`] after [`BatchInserter::done`].
    pub fn values_doc(&mut self, row: Document) -> Result<()> {
        if let Some(err) = self.shared.error() {
            return Err(err);
        }
        if self.done {
            return Err(Error::invalid_operation("batch already marked done"));
        }
        if self.sender.is_none() {
            self.start()?;
        }
        let Some(sender) = self.sender.as_ref() else {
            return Err(Error::invalid_operation("batch worker is not running"));
        };
        if sender.send(row).is_err() {
            return Err(self
                .shared
                .error()
                .unwrap_or_else(|| Error::invalid_operation("batch worker stopped")));
        }
        Ok(())
    }

    /// Signals that no more rows follow.
    pub fn done(&mut self) {
        self.done = true;
        self.sender = None;
    }

    /// The error that stopped the batch, if any.
    pub fn err(&self) -> Option<Error> {
        self.shared.error()
    }

    /// Waits for every queued row to be written.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the batch.
    pub fn wait(mut self) -> Result<BatchSummary> {
        self.finish();
        match self.shared.error() {
            Some(err) => Err(err),
            None => Ok(std::mem::take(&mut *self.shared.summary.lock())),
        }
    }

    fn finish(&mut self) {
        self.done();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                self.shared
                    .fail(Error::invalid_operation("batch worker panicked"));
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        let capacity = self.collection.session().config().batch_queue_capacity.max(1);
        let (sender, receiver) = sync_channel(capacity);
        let consumer = Consumer {
            collection: self.collection.clone(),
            chunk_size: self.chunk_size,
            returning: self.returning.clone(),
            shared: Arc::clone(&self.shared),
        };
        let worker = std::thread::Builder::new()
            .name(format!("unidb-batch-{}", self.collection.name()))
            .spawn(move || consumer.run(receiver))
            .map_err(|err| Error::invalid_operation(format!("cannot start batch worker: {err}")))?;
        self.sender = Some(sender);
        self.worker = Some(worker);
        Ok(())
    }
}

impl<A: Adapter> std::fmt::Debug for BatchInserter<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchInserter")
            .field("collection", &self.collection.name())
            .field("chunk_size", &self.chunk_size)
            .field("done", &self.done)
            .finish()
    }
}

impl<A: Adapter> Drop for BatchInserter<A> {
    fn drop(&mut self) {
        self.finish();
    }
}

struct Consumer<A: Adapter> {
    collection: Collection<A>,
    chunk_size: usize,
    returning: Option<String>,
    shared: Arc<Shared>,
}

impl<A: Adapter> Consumer<A> {
    fn run(self, receiver: Receiver<Document>) {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        for row in receiver {
            // Keep draining after a failure so producers never block.
            if self.shared.error.lock().is_some() {
                continue;
            }
            chunk.push(row);
            if chunk.len() >= self.chunk_size {
                self.flush(&mut chunk);
            }
        }
        if !chunk.is_empty() && self.shared.error.lock().is_none() {
            self.flush(&mut chunk);
        }
    }

    fn flush(&self, chunk: &mut Vec<Document>) {
        let rows = std::mem::take(chunk);
        match self.collection.insert_rows(&rows, self.returning.as_deref()) {
            Ok(outcome) => {
                debug!(collection = self.collection.name(), rows = rows.len(), "batch chunk written");
                let mut summary = self.shared.summary.lock();
                summary.statements += 1;
                summary.rows += rows.len() as u64;
                summary.keys.extend(outcome.keys);
            }
            Err(err) => {
                warn!(collection = self.collection.name(), error = %err, "batch chunk failed, abandoning batch");
                self.shared.fail(err);
            }
        }
    }
}
