//! In-memory document store.
//!
//! A complete [`DocumentDriver`] over process memory, suitable for:
//! - Unit tests
//! - Integration tests
//! - Ephemeral stores that don't need persistence
//!
//! Transactions read and write a private snapshot of the store and log
//! each write. Commit replays the log against the shared state, so writes
//! other connections committed meanwhile are kept. Faults (failed operations, broken connections,
//! latency) can be injected to exercise retry and cancellation paths.
//!
//! # Example
//!
//! ```rust
//! use unidb_codec::Document;
//! use unidb_driver::{Context, DocumentConnection, DocumentDriver, FindCommand, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let ctx = Context::background();
//! let mut conn = store.driver().open(&ctx).unwrap();
//! conn.insert(&ctx, "artists", vec![Document::new().with("name", "Ozzie")]).unwrap();
//! assert_eq!(conn.count(&ctx, "artists", &Document::new()).unwrap(), 1);
//! ```

mod filter;

pub use filter::matches;

use crate::context::Context;
use crate::document::{DocumentConnection, DocumentDriver, FindCommand, SortOrder};
use crate::error::{DriverError, DriverResult};
use crate::faults::Faults;
use crate::rows::{BufferedRows, RowSource};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use unidb_codec::{Document, WireValue};

const BACKEND: &str = "memory";

/// Primary key field of every stored document.
pub const ID_FIELD: &str = "_id";

type Collections = BTreeMap<String, Vec<Document>>;

/// One logged write, replayable against any collection map.
#[derive(Debug, Clone)]
enum Write {
    Insert {
        collection: String,
        documents: Vec<Document>,
    },
    Update {
        collection: String,
        filter: Document,
        set: Document,
    },
    Delete {
        collection: String,
        filter: Document,
    },
    Truncate {
        collection: String,
    },
}

impl Write {
    /// Applies the write and returns the rows it touched.
    fn apply(&self, cols: &mut Collections) -> DriverResult<u64> {
        match self {
            Write::Insert {
                collection,
                documents,
            } => {
                let docs = cols.entry(collection.clone()).or_default();
                let mut staged: Vec<Document> = Vec::with_capacity(documents.len());
                for doc in documents {
                    let id = doc.get(ID_FIELD);
                    let taken = docs
                        .iter()
                        .chain(staged.iter())
                        .any(|existing| existing.get(ID_FIELD) == id);
                    if taken {
                        return Err(DriverError::constraint(
                            BACKEND,
                            format!("duplicate key {ID_FIELD} in {collection}"),
                        ));
                    }
                    staged.push(doc.clone());
                }
                docs.extend(staged);
                Ok(documents.len() as u64)
            }
            Write::Update {
                collection,
                filter,
                set,
            } => {
                let Some(docs) = cols.get_mut(collection) else {
                    return Ok(0);
                };
                let hits = select(docs, filter)?;
                for &pos in &hits {
                    for (key, value) in set.iter() {
                        docs[pos].insert(key, value.clone());
                    }
                }
                Ok(hits.len() as u64)
            }
            Write::Delete { collection, filter } => {
                let Some(docs) = cols.get_mut(collection) else {
                    return Ok(0);
                };
                let hits = select(docs, filter)?;
                for &pos in hits.iter().rev() {
                    docs.remove(pos);
                }
                Ok(hits.len() as u64)
            }
            Write::Truncate { collection } => Ok(cols
                .get_mut(collection)
                .map_or(0, |docs| std::mem::take(docs).len() as u64)),
        }
    }
}

#[derive(Debug)]
struct Transaction {
    snapshot: Collections,
    log: Vec<Write>,
}

#[derive(Debug, Default)]
struct StoreInner {
    collections: RwLock<Collections>,
    faults: Faults,
}

/// Shared in-memory document store.
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a driver opening connections to this store.
    #[must_use]
    pub fn driver(&self) -> MemoryDriver {
        MemoryDriver {
            store: self.clone(),
        }
    }

    /// Appends documents to a collection without going through a connection.
    ///
    /// Documents without an `_id` get a generated one.
    pub fn seed(&self, collection: &str, documents: impl IntoIterator<Item = Document>) {
        let mut collections = self.inner.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        for mut doc in documents {
            ensure_id(&mut doc);
            docs.push(doc);
        }
    }

    /// Returns a copy of a collection's documents in storage order.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .collections
            .read()
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Returns true if the collection is empty or missing.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Makes the next connection operation fail with `err`.
    ///
    /// Failures queue up; each operation consumes at most one.
    pub fn fail_next(&self, err: DriverError) {
        self.inner.faults.push_failure(err);
    }

    /// Makes the next connection attempt fail with `err`.
    pub fn fail_next_open(&self, err: DriverError) {
        self.inner.faults.push_open_failure(err);
    }

    /// Breaks every connection opened so far.
    ///
    /// Their next operation returns [`DriverError::Connection`].
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

    /// Connections opened over the store's lifetime.
    #[must_use]
    pub fn opened_total(&self) -> u64 {
        self.inner.faults.opened_total()
    }
}

fn ensure_id(doc: &mut Document) -> WireValue {
    if let Some(id) = doc.get(ID_FIELD) {
        if !id.is_null() {
            return id.clone();
        }
    }
    let id = WireValue::Text(uuid::Uuid::new_v4().to_string());
    // Keep `_id` first, the way document stores return it.
    let mut with_id = Document::with_capacity(doc.len() + 1);
    with_id.insert(ID_FIELD, id.clone());
    for (key, value) in std::mem::take(doc) {
        if key != ID_FIELD {
            with_id.insert(key, value);
        }
    }
    *doc = with_id;
    id
}

/// Driver for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    store: MemoryStore,
}

impl DocumentDriver for MemoryDriver {
    type Conn = MemoryConnection;

    fn name(&self) -> &str {
        BACKEND
    }

    fn open(&self, ctx: &Context) -> DriverResult<MemoryConnection> {
        let generation = self.store.inner.faults.open(ctx)?;
        Ok(MemoryConnection {
            store: self.store.clone(),
            generation,
            tx: None,
            closed: false,
        })
    }
}

/// A connection to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    generation: u64,
    tx: Option<Transaction>,
    closed: bool,
}

impl MemoryConnection {
    fn enter(&self, ctx: &Context) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.store.inner.faults.gate(ctx, self.generation)
    }

    fn read<R>(&self, f: impl FnOnce(&Collections) -> R) -> R {
        match &self.tx {
            Some(tx) => f(&tx.snapshot),
            None => f(&*self.store.inner.collections.read()),
        }
    }

    fn write(&mut self, write: Write) -> DriverResult<u64> {
        match &mut self.tx {
            Some(tx) => {
                let touched = write.apply(&mut tx.snapshot)?;
                tx.log.push(write);
                Ok(touched)
            }
            None => write.apply(&mut *self.store.inner.collections.write()),
        }
    }
}

fn select(docs: &[Document], filter: &Document) -> DriverResult<Vec<usize>> {
    let mut hits = Vec::new();
    for (pos, doc) in docs.iter().enumerate() {
        if matches(doc, filter)? {
            hits.push(pos);
        }
    }
    Ok(hits)
}

fn sort_documents(docs: &mut [Document], sort: &[(String, SortOrder)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, order) in sort {
            let av = a.get_path(field).unwrap_or(&WireValue::Null);
            let bv = b.get_path(field).unwrap_or(&WireValue::Null);
            let ord = match order {
                SortOrder::Ascending => av.sort_cmp(bv),
                SortOrder::Descending => bv.sort_cmp(av),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn project(doc: &Document, projection: &[String]) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }
    let mut out = Document::with_capacity(projection.len() + 1);
    if let Some(id) = doc.get(ID_FIELD) {
        out.insert(ID_FIELD, id.clone());
    }
    for field in projection {
        if let Some(value) = doc.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}

fn usize_of(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

impl DocumentConnection for MemoryConnection {
    fn find(
        &mut self,
        ctx: &Context,
        collection: &str,
        command: &FindCommand,
    ) -> DriverResult<Box<dyn RowSource>> {
        self.enter(ctx)?;
        trace!(collection, filter = ?command.filter, "memory find");
        let mut docs = self.read(|cols| -> DriverResult<Vec<Document>> {
            let Some(docs) = cols.get(collection) else {
                return Ok(Vec::new());
            };
            let hits = select(docs, &command.filter)?;
            Ok(hits.into_iter().map(|pos| docs[pos].clone()).collect())
        })?;
        sort_documents(&mut docs, &command.sort);
        let limit = command.limit.map_or(usize::MAX, usize_of);
        let rows = docs
            .iter()
            .skip(usize_of(command.skip))
            .take(limit)
            .map(|doc| project(doc, &command.projection))
            .collect();
        Ok(Box::new(BufferedRows::new(rows)))
    }

    fn count(&mut self, ctx: &Context, collection: &str, filter: &Document) -> DriverResult<u64> {
        self.enter(ctx)?;
        self.read(|cols| match cols.get(collection) {
            Some(docs) => Ok(select(docs, filter)?.len() as u64),
            None => Ok(0),
        })
    }

    fn insert(
        &mut self,
        ctx: &Context,
        collection: &str,
        mut documents: Vec<Document>,
    ) -> DriverResult<Vec<WireValue>> {
        self.enter(ctx)?;
        let ids: Vec<WireValue> = documents.iter_mut().map(ensure_id).collect();
        self.write(Write::Insert {
            collection: collection.to_string(),
            documents,
        })?;
        Ok(ids)
    }

    fn update(
        &mut self,
        ctx: &Context,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> DriverResult<u64> {
        self.enter(ctx)?;
        if set.contains_key(ID_FIELD) {
            return Err(DriverError::backend(
                BACKEND,
                "ImmutableField",
                "the _id field cannot be modified",
            ));
        }
        self.write(Write::Update {
            collection: collection.to_string(),
            filter: filter.clone(),
            set: set.clone(),
        })
    }

    fn delete(&mut self, ctx: &Context, collection: &str, filter: &Document) -> DriverResult<u64> {
        self.enter(ctx)?;
        self.write(Write::Delete {
            collection: collection.to_string(),
            filter: filter.clone(),
        })
    }

    fn truncate(&mut self, ctx: &Context, collection: &str) -> DriverResult<()> {
        self.enter(ctx)?;
        self.write(Write::Truncate {
            collection: collection.to_string(),
        })?;
        Ok(())
    }

    fn collection_names(&mut self, ctx: &Context) -> DriverResult<Vec<String>> {
        self.enter(ctx)?;
        Ok(self.read(|cols| cols.keys().cloned().collect()))
    }

    fn begin(&mut self, ctx: &Context) -> DriverResult<()> {
        self.enter(ctx)?;
        if self.tx.is_some() {
            return Err(DriverError::TransactionState("transaction already in progress".into()));
        }
        self.tx = Some(Transaction {
            snapshot: self.store.inner.collections.read().clone(),
            log: Vec::new(),
        });
        Ok(())
    }

    fn commit(&mut self, ctx: &Context) -> DriverResult<()> {
        self.enter(ctx)?;
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DriverError::TransactionState("no transaction in progress".into()))?;
        if tx.log.is_empty() {
            return Ok(());
        }
        // Replay onto a copy so a failing write leaves the store untouched.
        let mut live = self.store.inner.collections.write();
        let mut next = live.clone();
        for write in &tx.log {
            write.apply(&mut next)?;
        }
        *live = next;
        trace!(writes = tx.log.len(), "memory commit");
        Ok(())
    }

    fn rollback(&mut self, ctx: &Context) -> DriverResult<()> {
        // Dropping the snapshot is the rollback; it must happen even when the
        // connection itself is failing.
        let had_tx = self.tx.take().is_some();
        self.enter(ctx)?;
        if had_tx {
            Ok(())
        } else {
            Err(DriverError::TransactionState("no transaction in progress".into()))
        }
    }

    fn ping(&mut self, ctx: &Context) -> DriverResult<()> {
        self.enter(ctx)
    }

    fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            self.tx = None;
            self.store.inner.faults.close();
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::background()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            "people",
            (1..=5i64).map(|n| Document::new().with("n", n).with("name", format!("p{n}"))),
        );
        store
    }

    fn collect(mut rows: Box<dyn RowSource>) -> Vec<Document> {
        let mut out = Vec::new();
        while let Some(row) = rows.next_row(&ctx()).unwrap() {
            out.push(row);
        }
        out
    }

    #[test]
    fn seeded_documents_get_ids_first() {
        let store = seeded();
        let docs = store.documents("people");
        assert_eq!(docs.len(), 5);
        assert_eq!(docs[0].keys().next(), Some(ID_FIELD));
    }

    #[test]
    fn find_sorts_skips_limits_and_projects() {
        let store = seeded();
        let mut conn = store.driver().open(&ctx()).unwrap();
        let cmd = FindCommand {
            filter: Document::new().with(
                "n",
                WireValue::Document(Document::new().with("$gte", 2i64)),
            ),
            projection: vec!["n".into()],
            sort: vec![("n".into(), SortOrder::Descending)],
            skip: 1,
            limit: Some(2),
        };
        let rows = collect(conn.find(&ctx(), "people", &cmd).unwrap());
        let ns: Vec<_> = rows.iter().map(|d| d.get("n").cloned().unwrap()).collect();
        assert_eq!(ns, vec![WireValue::Integer(4), WireValue::Integer(3)]);
        assert!(rows[0].get("name").is_none());
        assert!(rows[0].get(ID_FIELD).is_some());
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let mut conn = store.driver().open(&ctx()).unwrap();
        let doc = Document::new().with(ID_FIELD, 1i64);
        conn.insert(&ctx(), "c", vec![doc.clone()]).unwrap();
        let err = conn.insert(&ctx(), "c", vec![doc]).unwrap_err();
        assert!(matches!(err, DriverError::Constraint { .. }));
        assert_eq!(store.len("c"), 1);
    }

    #[test]
    fn update_and_delete_report_counts() {
        let store = seeded();
        let mut conn = store.driver().open(&ctx()).unwrap();
        let filter = Document::new().with(
            "n",
            WireValue::Document(Document::new().with("$lte", 2i64)),
        );
        let set = Document::new().with("name", "low");
        assert_eq!(conn.update(&ctx(), "people", &filter, &set).unwrap(), 2);
        assert_eq!(
            conn.count(&ctx(), "people", &Document::new().with("name", "low")).unwrap(),
            2
        );
        assert_eq!(conn.delete(&ctx(), "people", &filter).unwrap(), 2);
        assert_eq!(store.len("people"), 3);
    }

    #[test]
    fn rollback_discards_snapshot() {
        let store = seeded();
        let mut conn = store.driver().open(&ctx()).unwrap();
        conn.begin(&ctx()).unwrap();
        conn.truncate(&ctx(), "people").unwrap();
        assert_eq!(conn.count(&ctx(), "people", &Document::new()).unwrap(), 0);
        assert_eq!(store.len("people"), 5);
        conn.rollback(&ctx()).unwrap();
        assert_eq!(conn.count(&ctx(), "people", &Document::new()).unwrap(), 5);
    }

    #[test]
    fn commit_publishes_snapshot() {
        let store = seeded();
        let mut conn = store.driver().open(&ctx()).unwrap();
        conn.begin(&ctx()).unwrap();
        conn.insert(&ctx(), "people", vec![Document::new().with("n", 6i64)]).unwrap();
        assert_eq!(store.len("people"), 5);
        conn.commit(&ctx()).unwrap();
        assert_eq!(store.len("people"), 6);
    }

    #[test]
    fn commit_keeps_writes_committed_by_other_connections() {
        let store = seeded();
        let mut a = store.driver().open(&ctx()).unwrap();
        let mut b = store.driver().open(&ctx()).unwrap();
        a.begin(&ctx()).unwrap();
        a.insert(&ctx(), "t", vec![Document::new().with("n", 1i64)]).unwrap();
        a.delete(&ctx(), "people", &Document::new().with("n", 1i64)).unwrap();
        b.insert(&ctx(), "other", vec![Document::new().with("n", 2i64)]).unwrap();
        b.insert(&ctx(), "people", vec![Document::new().with("n", 9i64)]).unwrap();
        a.commit(&ctx()).unwrap();
        assert_eq!(store.len("t"), 1);
        assert_eq!(store.len("other"), 1);
        assert_eq!(store.len("people"), 5);
    }

    #[test]
    fn conflicting_commit_leaves_the_store_untouched() {
        let store = MemoryStore::new();
        let mut a = store.driver().open(&ctx()).unwrap();
        let mut b = store.driver().open(&ctx()).unwrap();
        a.begin(&ctx()).unwrap();
        a.insert(&ctx(), "c", vec![Document::new().with("n", 1i64)]).unwrap();
        a.insert(&ctx(), "c", vec![Document::new().with(ID_FIELD, 7i64)]).unwrap();
        b.insert(&ctx(), "c", vec![Document::new().with(ID_FIELD, 7i64)]).unwrap();
        let err = a.commit(&ctx()).unwrap_err();
        assert!(matches!(err, DriverError::Constraint { .. }));
        assert_eq!(store.len("c"), 1);
        assert!(a.commit(&ctx()).is_err());
    }

    #[test]
    fn broken_connections_stay_broken() {
        let store = seeded();
        let mut old = store.driver().open(&ctx()).unwrap();
        store.break_connections();
        assert!(old.ping(&ctx()).unwrap_err().is_connection());
        assert!(old.ping(&ctx()).unwrap_err().is_connection());
        let mut fresh = store.driver().open(&ctx()).unwrap();
        assert!(fresh.ping(&ctx()).is_ok());
    }

    #[test]
    fn injected_failures_are_consumed_once() {
        let store = seeded();
        let mut conn = store.driver().open(&ctx()).unwrap();
        store.fail_next(DriverError::backend("memory", "E1", "boom"));
        assert!(conn.ping(&ctx()).is_err());
        assert!(conn.ping(&ctx()).is_ok());
    }

    #[test]
    fn latency_honors_cancellation() {
        let store = seeded();
        store.set_latency(Some(Duration::from_secs(5)));
        let mut conn = store.driver().open(&ctx()).unwrap();
        let deadline = ctx().with_timeout(Duration::from_millis(20));
        assert_eq!(
            conn.count(&deadline, "people", &Document::new()).unwrap_err(),
            DriverError::DeadlineExceeded
        );
    }

    #[test]
    fn connection_accounting() {
        let store = MemoryStore::new();
        let a = store.driver().open(&ctx()).unwrap();
        let mut b = store.driver().open(&ctx()).unwrap();
        assert_eq!(store.open_connections(), 2);
        b.close().unwrap();
        drop(b);
        drop(a);
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.opened_total(), 2);
    }
}
