//! SQL adapter.

use super::cache::StatementCache;
use super::{Adapter, CacheStats, InsertOutcome};
use crate::compile::{statement, Dialect, KeyReturn, Statement};
use crate::config::Config;
use crate::error::Result;
use crate::query::Query;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use unidb_codec::{Document, WireValue};
use unidb_driver::{Context, DriverResult, ExecResult, RowSource, SqlConnection, SqlDriver, StatementId};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Adapter for SQL drivers.
#[derive(Debug)]
pub struct SqlAdapter<D: SqlDriver> {
    driver: D,
    dialect: Box<dyn Dialect>,
    cache_size: usize,
    counters: Arc<Counters>,
}

impl<D: SqlDriver> SqlAdapter<D> {
    /// Creates an adapter rendering statements for `dialect`.
    pub fn new(driver: D, dialect: impl Dialect) -> Self {
        Self {
            driver,
            dialect: Box::new(dialect),
            cache_size: 128,
            counters: Arc::default(),
        }
    }

    /// The dialect in use.
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn log(&self, stmt: &Statement) {
        debug!(backend = self.dialect.name(), sql = %stmt.sql, args = stmt.args.len(), "sql statement");
    }
}

/// A pooled SQL connection with its statement cache.
#[derive(Debug)]
pub struct SqlConn<C: SqlConnection> {
    raw: C,
    cache: StatementCache,
    counters: Arc<Counters>,
}

impl<C: SqlConnection> SqlConn<C> {
    /// The driver connection.
    pub fn raw(&mut self) -> &mut C {
        &mut self.raw
    }

    fn prepared(&mut self, ctx: &Context, sql: &str) -> DriverResult<Option<StatementId>> {
        if !self.cache.is_enabled() {
            return Ok(None);
        }
        if let Some(id) = self.cache.get(sql) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(id));
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let id = self.raw.prepare(ctx, sql)?;
        if let Some(evicted) = self.cache.insert(sql.to_string(), id) {
            self.close_statement(evicted);
        }
        Ok(Some(id))
    }

    fn close_statement(&mut self, id: StatementId) {
        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.raw.close_statement(id) {
            debug!(statement = id.0, error = %err, "closing prepared statement failed");
        }
    }

    fn execute(&mut self, ctx: &Context, stmt: &Statement) -> DriverResult<ExecResult> {
        match self.prepared(ctx, &stmt.sql)? {
            Some(id) => self.raw.execute_prepared(ctx, id, &stmt.args),
            None => self.raw.execute(ctx, &stmt.sql, &stmt.args),
        }
    }

    fn query(&mut self, ctx: &Context, stmt: &Statement) -> DriverResult<Box<dyn RowSource>> {
        match self.prepared(ctx, &stmt.sql)? {
            Some(id) => self.raw.query_prepared(ctx, id, &stmt.args),
            None => self.raw.query(ctx, &stmt.sql, &stmt.args),
        }
    }

    fn clear(&mut self) {
        for id in self.cache.drain() {
            self.close_statement(id);
        }
    }
}

/// First column of the first row, read as a count.
fn scalar_count(row: Option<Document>) -> u64 {
    let Some(row) = row else {
        return 0;
    };
    let value = row
        .get("count")
        .cloned()
        .or_else(|| row.into_iter().next().map(|(_, v)| v));
    match value {
        Some(WireValue::Integer(n)) => u64::try_from(n).unwrap_or(0),
        Some(WireValue::Float(f)) if f >= 0.0 => f as u64,
        Some(WireValue::Text(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn generated_keys(first: i64, count: usize) -> Vec<WireValue> {
    (0..count as i64).map(|i| WireValue::Integer(first + i)).collect()
}

impl<D: SqlDriver> Adapter for SqlAdapter<D> {
    type Conn = SqlConn<D::Conn>;

    fn name(&self) -> &str {
        self.driver.name()
    }

    fn connect(&self, ctx: &Context) -> Result<Self::Conn> {
        Ok(SqlConn {
            raw: self.driver.open(ctx)?,
            cache: StatementCache::new(self.cache_size),
            counters: Arc::clone(&self.counters),
        })
    }

    fn ping(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.raw.ping(ctx)?)
    }

    fn reset(&self, conn: &mut Self::Conn) {
        conn.clear();
    }

    fn close(&self, mut conn: Self::Conn) {
        conn.clear();
        if let Err(err) = conn.raw.close() {
            debug!(backend = self.driver.name(), error = %err, "closing connection failed");
        }
    }

    fn begin(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.raw.begin(ctx)?)
    }

    fn commit(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.raw.commit(ctx)?)
    }

    fn rollback(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<()> {
        Ok(conn.raw.rollback(ctx)?)
    }

    fn select(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<Box<dyn RowSource>> {
        let stmt = statement::select(self.dialect(), query)?;
        self.log(&stmt);
        Ok(conn.query(ctx, &stmt)?)
    }

    fn count(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<u64> {
        let stmt = statement::count(self.dialect(), query)?;
        self.log(&stmt);
        let mut rows = conn.query(ctx, &stmt)?;
        Ok(scalar_count(rows.next_row(ctx)?))
    }

    fn insert(
        &self,
        conn: &mut Self::Conn,
        ctx: &Context,
        collection: &str,
        rows: &[Document],
        returning: Option<&str>,
    ) -> Result<InsertOutcome> {
        let stmt = statement::insert(self.dialect(), collection, rows, returning)?;
        self.log(&stmt);
        let Some(column) = returning else {
            let result = conn.execute(ctx, &stmt)?;
            return Ok(InsertOutcome {
                rows_affected: result.rows_affected,
                keys: Vec::new(),
            });
        };
        match self.dialect.key_return() {
            KeyReturn::Returning | KeyReturn::Output => {
                let mut source = conn.query(ctx, &stmt)?;
                let mut keys = Vec::with_capacity(rows.len());
                while let Some(row) = source.next_row(ctx)? {
                    let key = row
                        .get(column)
                        .cloned()
                        .or_else(|| row.into_iter().next().map(|(_, v)| v))
                        .unwrap_or(WireValue::Null);
                    keys.push(key);
                }
                Ok(InsertOutcome {
                    rows_affected: keys.len() as u64,
                    keys,
                })
            }
            KeyReturn::FirstInsertId => {
                let result = conn.execute(ctx, &stmt)?;
                let keys = result
                    .last_insert_id
                    .map(|first| generated_keys(first, rows.len()))
                    .unwrap_or_default();
                Ok(InsertOutcome {
                    rows_affected: result.rows_affected,
                    keys,
                })
            }
            KeyReturn::LastInsertId => {
                let result = conn.execute(ctx, &stmt)?;
                let keys = result
                    .last_insert_id
                    .map(|last| generated_keys(last - rows.len() as i64 + 1, rows.len()))
                    .unwrap_or_default();
                Ok(InsertOutcome {
                    rows_affected: result.rows_affected,
                    keys,
                })
            }
        }
    }

    fn update(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query, set: &Document) -> Result<u64> {
        let stmt = statement::update(self.dialect(), query, set)?;
        self.log(&stmt);
        Ok(conn.execute(ctx, &stmt)?.rows_affected)
    }

    fn delete(&self, conn: &mut Self::Conn, ctx: &Context, query: &Query) -> Result<u64> {
        let stmt = statement::delete(self.dialect(), query)?;
        self.log(&stmt);
        Ok(conn.execute(ctx, &stmt)?.rows_affected)
    }

    fn truncate(&self, conn: &mut Self::Conn, ctx: &Context, collection: &str) -> Result<()> {
        let stmt = statement::truncate(self.dialect(), collection);
        self.log(&stmt);
        conn.raw.execute(ctx, &stmt.sql, &stmt.args)?;
        Ok(())
    }

    fn collections(&self, conn: &mut Self::Conn, ctx: &Context) -> Result<Vec<String>> {
        let stmt = statement::collections(self.dialect());
        let mut rows = conn.raw.query(ctx, &stmt.sql, &stmt.args)?;
        let mut names = Vec::new();
        while let Some(row) = rows.next_row(ctx)? {
            let name = row
                .get("name")
                .or_else(|| row.iter().next().map(|(_, v)| v))
                .and_then(WireValue::as_text)
                .map(str::to_string);
            names.extend(name);
        }
        Ok(names)
    }

    fn configure(&mut self, config: &Config) {
        self.cache_size = config.statement_cache_size;
    }

    fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}
