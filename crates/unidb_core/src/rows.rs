//! Incremental row iteration.

use crate::error::{Error, Result};
use std::iter::FusedIterator;
use unidb_codec::{Document, FieldMapping, Record};
use unidb_driver::{BufferedRows, Context, RowSource};

/// Decodes one row.
pub(crate) type Decoder<T> = fn(Document) -> Result<T>;

pub(crate) fn decode_record<T: Record>(row: Document) -> Result<T> {
    Ok(FieldMapping::<T>::of()?.decode(row)?)
}

pub(crate) fn keep_document(row: Document) -> Result<Document> {
    Ok(row)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Exhausted,
}

/// A lazy cursor over query results.
///
/// [`Rows::fetch`] tells a backend failure apart from the end of the rows:
/// the end is reported once as `Ok(None)`; fetching after that fails with
/// [`Error::CursorExhausted`]. As an [`Iterator`], the cursor yields
/// `Result<T>` items and stops after the end or the first error.
pub struct Rows<T> {
    source: Option<Box<dyn RowSource>>,
    ctx: Context,
    decode: Decoder<T>,
    state: State,
}

impl<T> Rows<T> {
    pub(crate) fn new(source: Box<dyn RowSource>, ctx: Context, decode: Decoder<T>) -> Self {
        Self {
            source: Some(source),
            ctx,
            decode,
            state: State::Open,
        }
    }

    /// A cursor that yields nothing.
    pub(crate) fn empty(ctx: Context, decode: Decoder<T>) -> Self {
        Self::new(Box::new(BufferedRows::default()), ctx, decode)
    }

    /// Reads the whole source now and yields it back to front.
    pub(crate) fn reversed(mut source: Box<dyn RowSource>, ctx: Context, decode: Decoder<T>) -> Result<Self> {
        let mut rows = Vec::new();
        while let Some(row) = source.next_row(&ctx)? {
            rows.push(row);
        }
        rows.reverse();
        Ok(Self::new(Box::new(BufferedRows::new(rows)), ctx, decode))
    }

    /// Advances to the next row.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the stream fails, a codec error if the
    /// row does not decode, or [`Error::CursorExhausted`] when called again
    /// after the end was reported.
    pub fn fetch(&mut self) -> Result<Option<T>> {
        if self.state == State::Exhausted {
            return Err(Error::CursorExhausted);
        }
        let Some(source) = self.source.as_mut() else {
            return Err(Error::CursorExhausted);
        };
        match source.next_row(&self.ctx) {
            Ok(Some(row)) => (self.decode)(row).map(Some),
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(err) => {
                self.finish();
                Err(err.into())
            }
        }
    }

    /// True once the end was reported or the stream failed.
    pub fn is_exhausted(&self) -> bool {
        self.state == State::Exhausted
    }

    fn finish(&mut self) {
        self.state = State::Exhausted;
        self.source = None;
    }
}

impl<T> Iterator for Rows<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_exhausted() {
            return None;
        }
        self.fetch().transpose()
    }
}

impl<T> FusedIterator for Rows<T> {}

impl<T> std::fmt::Debug for Rows<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows").field("state", &self.state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unidb_codec::WireValue;
    use unidb_driver::DriverError;

    fn rows(n: i64) -> Vec<Document> {
        (1..=n).map(|i| Document::new().with("n", i)).collect()
    }

    #[test]
    fn end_is_reported_once() {
        let mut cursor = Rows::new(
            Box::new(BufferedRows::new(rows(2))),
            Context::background(),
            keep_document,
        );
        assert!(cursor.fetch().unwrap().is_some());
        assert!(cursor.fetch().unwrap().is_some());
        assert!(cursor.fetch().unwrap().is_none());
        assert!(matches!(cursor.fetch(), Err(Error::CursorExhausted)));
    }

    #[test]
    fn stream_errors_differ_from_the_end() {
        let source = BufferedRows::failing_after(rows(1), DriverError::connection("reset"));
        let mut cursor = Rows::new(Box::new(source), Context::background(), keep_document);
        assert!(cursor.fetch().unwrap().is_some());
        let err = cursor.fetch().unwrap_err();
        assert!(err.is_connection());
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn iterator_is_fused() {
        let source = BufferedRows::failing_after(rows(2), DriverError::connection("reset"));
        let mut cursor = Rows::new(Box::new(source), Context::background(), keep_document);
        assert_eq!(cursor.by_ref().filter(Result::is_ok).count(), 2);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn reversed_yields_back_to_front() {
        let cursor = Rows::reversed(
            Box::new(BufferedRows::new(rows(3))),
            Context::background(),
            keep_document,
        )
        .unwrap();
        let seen: Vec<i64> = cursor
            .map(|r| r.unwrap().get("n").and_then(WireValue::as_integer).unwrap())
            .collect();
        assert_eq!(seen, [3, 2, 1]);
    }

    #[test]
    fn empty_cursor_ends_immediately() {
        let mut cursor = Rows::empty(Context::background(), keep_document);
        assert!(cursor.fetch().unwrap().is_none());
    }
}
