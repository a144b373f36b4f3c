//! Document store adapter.

use super::{Adapter, InsertOutcome};
use crate::compile::DocumentCompiler;
use crate::error::{CompileError, Result};
use crate::query::Query;
use tracing::debug;
use unidb_codec::Document;
use unidb_driver::{Context, DocumentConnection, DocumentDriver, FindCommand, RowSource, SortOrder};

/// Adapter for document store drivers.
#[derive(Debug)]
pub struct DocumentAdapter<D: DocumentDriver> {
    driver: D,
    compiler: DocumentCompiler,
}

impl<D: DocumentDriver> DocumentAdapter<D> {
    /// Creates an adapter over `driver`.
    pub fn new(driver: D) -> Self {
        let compiler = DocumentCompiler::new(driver.name());
        Self { driver, compiler }
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn filter(&self, query: &Query) -> Result<Document> {
        if !query.group.is_empty() {
            return Err(CompileError::unsupported("group by", self.driver.name()).into());
        }
        let filter = self.compiler.compile(&query.condition)?;
        debug!(backend = self.driver.name(), collection = %query.collection, filter = ?filter, "document filter");
        Ok(filter)
    }
}

impl<D: DocumentDriver> Adapter for DocumentAdapter<D> {
    type Conn = D::Conn;

    fn name(&self) -> &str {
        self.driver.name()
    }

    fn connect(&self, ctx: &Context) -> Result<Self::Conn> {
        Ok(self.driver.open(ctx)?)
    }

    fn ping(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.ping(ctx)?)
    }

    fn reset(&self, _conn: &mut Self::Conn) {}

    fn close(&self, mut conn: Self::Conn) {
        if let Err(err) = conn.close() {
            debug!(backend = self.driver.name(), error = %err, "closing connection failed");
        }
    }

    fn begin(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.begin(ctx)?)
    }

    fn commit(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.commit(ctx)?)
    }

    fn rollback(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.rollback(ctx)?)
    }

    fn select(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<Box<dyn RowSource>> {
        let command = FindCommand {
            filter: self.filter(query)?,
            projection: query.fields.clone(),
            sort: query
                .order
                .iter()
                .map(|o| {
                    let order = if o.descending {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    };
                    (o.column.clone(), order)
                })
                .collect(),
            skip: query.offset,
            limit: query.limit,
        };
        Ok(conn.find(ctx, &query.collection, &command)?)
    }

    fn count(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<u64> {
        let filter = self.filter(query)?;
        Ok(conn.count(ctx, &query.collection, &filter)?)
    }

    fn insert(
        &self,
        conn: &mut Self::Conn,
        ctx: &Context,
        collection: &str,
        rows: &[Document],
        returning: Option<&str>,
    ) -> Result<InsertOutcome> {
        debug!(backend = self.driver.name(), collection, rows = rows.len(), "document insert");
        let ids = conn.insert(ctx, collection, rows.to_vec())?;
        let keys = match returning {
            None => Vec::new(),
            // A row that carries its own key reports it; otherwise the store's id.
            Some(column) => rows
                .iter()
                .zip(ids.iter())
                .map(|(row, id)| row.get(column).cloned().unwrap_or_else(|| id.clone()))
                .collect(),
        };
        Ok(InsertOutcome {
            rows_affected: ids.len() as u64,
            keys,
        })
    }

    fn update(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query, set: &Document) -> Result<u64> {
        if set.is_empty() {
            return Err(CompileError::malformed("update without columns").into());
        }
        let filter = self.filter(query)?;
        Ok(conn.update(ctx, &query.collection, &filter, set)?)
    }

    fn delete(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<u64> {
        let filter = self.filter(query)?;
        Ok(conn.delete(ctx, &query.collection, &filter)?)
    }

    fn truncate(&self, conn: &mut Self::Conn, ctx: &Context, collection: &str) -> Result<()> {
        Ok(conn.truncate(ctx, collection)?)
    }

    fn collections(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<Vec<String>> {
        Ok(conn.collection_names(ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cond::{Comparison, Cond};
    use crate::error::Error;
    use crate::query::OrderBy;
    use unidb_codec::WireValue;
    use unidb_driver::MemoryStore;

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

    #[test]
    fn select_applies_filter_sort_and_paging() {
        let store = seeded();
        let adapter = DocumentAdapter::new(store.driver());
        let mut conn = adapter.connect(&ctx()).unwrap();
        let mut q = Query::new("people");
        q.condition = Cond::new().with("n", Comparison::between(2, 5)).into();
        q.order = vec![OrderBy::desc("n")];
        q.limit = Some(2);
        q.offset = 1;
        let mut rows = adapter.select(&mut conn, &ctx(), &q).unwrap();
        let mut seen = Vec::new();
        while let Some(row) = rows.next_row(&ctx()).unwrap() {
            seen.push(row.get("n").and_then(WireValue::as_integer).unwrap());
        }
        assert_eq!(seen, [4, 3]);
        assert_eq!(adapter.count(&mut conn, &ctx(), &q).unwrap(), 4);
    }

    #[test]
    fn grouping_is_unsupported() {
        let adapter = DocumentAdapter::new(seeded().driver());
        let mut conn = adapter.connect(&ctx()).unwrap();
        let mut q = Query::new("people");
        q.group = vec!["name".into()];
        assert!(matches!(
            adapter.count(&mut conn, &ctx(), &q),
            Err(Error::Compile(CompileError::Unsupported { .. }))
        ));
    }

    #[test]
    fn insert_reports_keys_when_asked() {
        let store = MemoryStore::new();
        let adapter = DocumentAdapter::new(store.driver());
        let mut conn = adapter.connect(&ctx()).unwrap();
        let rows = vec![Document::new().with("_id", "k1"), Document::new().with("x", 1i64)];
        let out = adapter.insert(&mut conn, &ctx(), "c", &rows, Some("_id")).unwrap();
        assert_eq!(out.rows_affected, 2);
        assert_eq!(out.keys[0], WireValue::Text("k1".into()));
        assert!(out.keys[1].as_text().is_some());
        assert_eq!(store.len("c"), 2);
    }

    #[test]
    fn update_and_delete_use_the_filter() {
        let store = seeded();
        let adapter = DocumentAdapter::new(store.driver());
        let mut conn = adapter.connect(&ctx()).unwrap();
        let mut q = Query::new("people");
        q.condition = Cond::new().with("n <=", 2).into();
        let set = Document::new().with("name", "low");
        assert_eq!(adapter.update(&mut conn, &ctx(), &q, &set).unwrap(), 2);
        assert_eq!(adapter.delete(&mut conn, &ctx(), &q).unwrap(), 2);
        assert_eq!(store.len("people"), 3);
    }
}
