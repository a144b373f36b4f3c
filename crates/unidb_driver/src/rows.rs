//! Row sources.

use crate::context::Context;
use crate::error::{DriverError, DriverResult};
use std::collections::VecDeque;
use unidb_codec::Document;

/// An incremental stream of rows produced by a query.
///
/// Row sources do not borrow the connection that produced them; a driver
/// that streams from the network keeps whatever shared state it needs.
pub trait RowSource: Send {
    /// Returns the next row, or `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns a driver error if the stream fails mid-way; that error is
    /// distinct from exhaustion.
    fn next_row(&mut self, ctx: &Context) -> DriverResult<Option<Document>>;
}

/// A row source over rows already held in memory.
///
/// An optional trailing error is reported after the buffered rows, which is
/// how scripted drivers simulate a stream that breaks part way.
#[derive(Debug, Default)]
pub struct BufferedRows {
    rows: VecDeque<Document>,
    trailing_error: Option<DriverError>,
}

impl BufferedRows {
    /// Creates a source yielding `rows` in order.
    #[must_use]
    pub fn new(rows: Vec<Document>) -> Self {
        Self {
            rows: rows.into(),
            trailing_error: None,
        }
    }

    /// Creates a source yielding `rows` and then failing with `error`.
    #[must_use]
    pub fn failing_after(rows: Vec<Document>, error: DriverError) -> Self {
        Self {
            rows: rows.into(),
            trailing_error: Some(error),
        }
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for BufferedRows {
    fn next_row(&mut self, ctx: &Context) -> DriverResult<Option<Document>> {
        ctx.check()?;
        match self.rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None => match self.trailing_error.take() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_rows_then_none() {
        let ctx = Context::background();
        let mut rows = BufferedRows::new(vec![Document::new().with("a", 1i64)]);
        assert!(rows.next_row(&ctx).unwrap().is_some());
        assert!(rows.next_row(&ctx).unwrap().is_none());
        assert!(rows.next_row(&ctx).unwrap().is_none());
    }

    #[test]
    fn trailing_error_follows_rows() {
        let ctx = Context::background();
        let mut rows = BufferedRows::failing_after(
            vec![Document::new()],
            DriverError::connection("stream reset"),
        );
        assert!(rows.next_row(&ctx).unwrap().is_some());
        assert!(rows.next_row(&ctx).unwrap_err().is_connection());
    }

    #[test]
    fn canceled_context_stops_iteration() {
        let (ctx, handle) = Context::background().with_cancel();
        let mut rows = BufferedRows::new(vec![Document::new(), Document::new()]);
        handle.cancel();
        assert_eq!(rows.next_row(&ctx).unwrap_err(), DriverError::Canceled);
    }
}
