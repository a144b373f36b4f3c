//! Pagination.
//!
//! Two styles are supported:
//!
//! - **Offset**: `paginate(size)` then `page(n)`, 1-based. Pages past the
//!   end are empty.
//! - **Keyset**: `paginate(size)` then `cursor("id")` (or `"-id"` for
//!   descending) and `next_page(last_seen)` / `prev_page(first_seen)`.
//!   Keyset pages stay stable while rows are inserted ahead of the reader.
//!
//! Every fetched [`Page`] carries [`PageCursor`]s for its neighbours, which
//! can be turned into opaque tokens and resumed with `ResultSet::at`.

use crate::cond::{Cond, Condition};
use crate::error::{Error, Result};
use crate::query::{OrderBy, Query};
use serde::{Deserialize, Serialize};
use unidb_codec::{json, CodecError, Document, WireValue};

/// A position from which a page can be fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCursor {
    /// An offset page.
    Offset {
        /// Rows skipped.
        offset: u64,
        /// Page size.
        limit: u64,
    },
    /// A keyset page.
    Keyset {
        /// Cursor term, `-column` when descending.
        column: String,
        /// Seek value.
        value: WireValue,
        /// Read past `value` in cursor order, or back before it.
        forward: bool,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Token {
    Offset {
        offset: u64,
        limit: u64,
    },
    Keyset {
        column: String,
        value: serde_json::Value,
        forward: bool,
    },
}

impl PageCursor {
    /// Encodes the cursor as a JSON token.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the seek value has no JSON form.
    pub fn to_token(&self) -> Result<String> {
        let token = match self {
            Self::Offset { offset, limit } => Token::Offset {
                offset: *offset,
                limit: *limit,
            },
            Self::Keyset {
                column,
                value,
                forward,
            } => Token::Keyset {
                column: column.clone(),
                value: json::to_json(value)?,
                forward: *forward,
            },
        };
        Ok(serde_json::to_string(&token).map_err(CodecError::from)?)
    }

    /// Decodes a token produced by [`PageCursor::to_token`].
    ///
    /// # Errors
    ///
    /// Returns a codec error for malformed tokens.
    pub fn from_token(token: &str) -> Result<Self> {
        let token: Token = serde_json::from_str(token).map_err(CodecError::from)?;
        Ok(match token {
            Token::Offset { offset, limit } => Self::Offset { offset, limit },
            Token::Keyset {
                column,
                value,
                forward,
            } => Self::Keyset {
                column,
                value: json::from_json(value),
                forward,
            },
        })
    }
}

/// One fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Rows in cursor order.
    pub items: Vec<T>,
    /// 1-based page number for offset pages.
    pub number: Option<u64>,
    /// Where the following page starts, if the page is not empty.
    pub next_cursor: Option<PageCursor>,
    /// Where the preceding page ends; `None` on a first page.
    pub prev_cursor: Option<PageCursor>,
}

impl<T> Page<T> {
    /// True if the page holds no rows.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of rows on the page.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// How a result set is paged.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Paging {
    #[default]
    Off,
    Offset {
        size: u64,
        page: u64,
    },
    Keyset {
        term: Option<String>,
        size: u64,
        seek: Option<(WireValue, bool)>,
    },
}

impl Paging {
    pub(crate) fn size(&self) -> Option<u64> {
        match self {
            Self::Off => None,
            Self::Offset { size, .. } | Self::Keyset { size, .. } => Some(*size),
        }
    }

    #[must_use]
    pub(crate) fn with_size(self, size: u64) -> Self {
        match self {
            Self::Keyset { term, seek, .. } => Self::Keyset { term, size, seek },
            Self::Offset { page, .. } => Self::Offset { size, page },
            Self::Off => Self::Offset { size, page: 1 },
        }
    }

    #[must_use]
    pub(crate) fn with_page(self, page: u64) -> Self {
        Self::Offset {
            size: self.size().unwrap_or(0),
            page: page.max(1),
        }
    }

    #[must_use]
    pub(crate) fn with_cursor(self, term: &str) -> Self {
        Self::Keyset {
            term: Some(term.to_string()),
            size: self.size().unwrap_or(0),
            seek: None,
        }
    }

    #[must_use]
    pub(crate) fn with_seek(self, value: WireValue, forward: bool) -> Self {
        let (term, size) = match self {
            Self::Keyset { term, size, .. } => (term, size),
            other => (None, other.size().unwrap_or(0)),
        };
        Self::Keyset {
            term,
            size,
            seek: Some((value, forward)),
        }
    }

    #[must_use]
    pub(crate) fn at(self, cursor: &PageCursor) -> Self {
        match cursor {
            PageCursor::Offset { offset, limit } if *limit > 0 => Self::Offset {
                size: *limit,
                page: offset / limit + 1,
            },
            PageCursor::Offset { .. } => Self::Offset { size: 0, page: 1 },
            PageCursor::Keyset {
                column,
                value,
                forward,
            } => Self::Keyset {
                term: Some(column.clone()),
                size: self.size().unwrap_or(0),
                seek: Some((value.clone(), *forward)),
            },
        }
    }

    /// Applies paging to `base`.
    pub(crate) fn plan(&self, base: &Query) -> Result<Plan> {
        let mut query = base.clone();
        match self {
            Self::Off => Ok(Plan::new(query)),
            Self::Offset { size: 0, page } => {
                let mut plan = Plan::new(query);
                plan.empty = *page > 1;
                Ok(plan)
            }
            Self::Offset { size, page } => {
                query.limit = Some(*size);
                query.offset = size.saturating_mul(page - 1);
                Ok(Plan::new(query))
            }
            Self::Keyset { term, size, seek } => {
                let term = term
                    .as_deref()
                    .ok_or_else(|| Error::invalid_operation("keyset paging needs a cursor column"))?;
                let order = OrderBy::parse(term);
                query.order.retain(|o| o.column != order.column);
                query.order.insert(0, order.clone());
                query.offset = 0;
                if *size > 0 {
                    query.limit = Some(*size);
                }
                let mut reverse = false;
                if let Some((value, forward)) = seek {
                    let op = if *forward != order.descending { ">" } else { "<" };
                    let seek: Condition = Cond::new()
                        .with(format!("{} {op}", order.column), value.clone())
                        .into();
                    query.condition = query.condition.and_also(seek);
                    if !forward {
                        query.order = query.order.iter().map(OrderBy::reversed).collect();
                        reverse = true;
                    }
                }
                Ok(Plan {
                    query,
                    reverse,
                    empty: false,
                })
            }
        }
    }

    /// Cursors for the neighbours of a page holding `rows`.
    pub(crate) fn neighbours(&self, rows: &[Document]) -> (Option<u64>, Option<PageCursor>, Option<PageCursor>) {
        match self {
            Self::Off => (None, None, None),
            Self::Offset { size, page } => {
                let next = (*size > 0 && rows.len() as u64 == *size).then(|| PageCursor::Offset {
                    offset: size.saturating_mul(*page),
                    limit: *size,
                });
                let prev = (*size > 0 && *page > 1).then(|| PageCursor::Offset {
                    offset: size.saturating_mul(page - 2),
                    limit: *size,
                });
                (Some(*page), next, prev)
            }
            Self::Keyset {
                term: Some(term),
                seek,
                ..
            } => {
                let column = OrderBy::parse(term).column;
                let at = |row: Option<&Document>, forward: bool| {
                    row.and_then(|r| r.get(&column)).map(|value| PageCursor::Keyset {
                        column: term.clone(),
                        value: value.clone(),
                        forward,
                    })
                };
                let prev = if seek.is_some() { at(rows.first(), false) } else { None };
                (None, at(rows.last(), true), prev)
            }
            Self::Keyset { term: None, .. } => (None, None, None),
        }
    }
}

/// A query ready to run, with post-processing flags.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub(crate) query: Query,
    /// Rows come back in reverse cursor order.
    pub(crate) reverse: bool,
    /// Known to match nothing; skip the backend.
    pub(crate) empty: bool,
}

impl Plan {
    fn new(query: Query) -> Self {
        Self {
            query,
            reverse: false,
            empty: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Query {
        let mut q = Query::new("items");
        q.condition = Cond::new().with("kind", "book").into();
        q
    }

    #[test]
    fn offset_pages_skip_whole_pages() {
        let plan = Paging::Off.with_size(13).with_page(3).plan(&base()).unwrap();
        assert_eq!(plan.query.limit, Some(13));
        assert_eq!(plan.query.offset, 26);
    }

    #[test]
    fn size_zero_is_a_single_page() {
        let first = Paging::Off.with_size(0).plan(&base()).unwrap();
        assert_eq!(first.query.limit, None);
        assert!(!first.empty);
        let second = Paging::Off.with_size(0).with_page(2).plan(&base()).unwrap();
        assert!(second.empty);
    }

    #[test]
    fn keyset_forward_seeks_past_the_value() {
        let plan = Paging::Off
            .with_size(10)
            .with_cursor("id")
            .with_seek(WireValue::Integer(50), true)
            .plan(&base())
            .unwrap();
        let expected: Condition = Cond::new().with("kind", "book").into();
        let seek: Condition = Cond::new().with("id >", 50i64).into();
        assert_eq!(plan.query.condition, expected.and_also(seek));
        assert_eq!(plan.query.order, [OrderBy::asc("id")]);
        assert_eq!(plan.query.limit, Some(10));
        assert!(!plan.reverse);
    }

    #[test]
    fn keyset_backward_reverses_descending_order() {
        let plan = Paging::Off
            .with_cursor("-id")
            .with_seek(WireValue::Integer(50), false)
            .plan(&base())
            .unwrap();
        assert_eq!(plan.query.order, [OrderBy::asc("id")]);
        assert!(plan.reverse);
        let Condition::And(children) = &plan.query.condition else {
            panic!("expected a conjunction");
        };
        assert_eq!(children[1], Condition::from(Cond::new().with("id >", 50i64)));
    }

    #[test]
    fn seeking_without_a_cursor_column_fails() {
        let err = Paging::Off
            .with_seek(WireValue::Integer(1), true)
            .plan(&base())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn neighbours_of_offset_pages() {
        let rows = vec![Document::new(); 5];
        let (number, next, prev) = Paging::Off.with_size(5).with_page(2).neighbours(&rows);
        assert_eq!(number, Some(2));
        assert_eq!(next, Some(PageCursor::Offset { offset: 10, limit: 5 }));
        assert_eq!(prev, Some(PageCursor::Offset { offset: 0, limit: 5 }));
        let (_, next, _) = Paging::Off.with_size(5).with_page(2).neighbours(&rows[..3]);
        assert_eq!(next, None);
    }

    #[test]
    fn neighbours_of_keyset_pages() {
        let rows: Vec<Document> = (3..6i64).map(|n| Document::new().with("id", n)).collect();
        let first = Paging::Off.with_cursor("-id");
        assert_eq!(first.neighbours(&rows).2, None);
        let (_, next, prev) = first.with_seek(WireValue::Integer(6), true).neighbours(&rows);
        assert_eq!(
            next,
            Some(PageCursor::Keyset {
                column: "-id".into(),
                value: WireValue::Integer(5),
                forward: true,
            })
        );
        assert_eq!(
            prev,
            Some(PageCursor::Keyset {
                column: "-id".into(),
                value: WireValue::Integer(3),
                forward: false,
            })
        );
        assert_eq!(Paging::Off.with_cursor("id").neighbours(&[]), (None, None, None));
    }

    #[test]
    fn cursor_tokens_survive_the_trip() {
        let cursor = PageCursor::Keyset {
            column: "created".into(),
            value: WireValue::Text("2024-01-01".into()),
            forward: false,
        };
        let token = cursor.to_token().unwrap();
        assert_eq!(PageCursor::from_token(&token).unwrap(), cursor);
        assert!(PageCursor::from_token("not a token").is_err());
    }

    #[test]
    fn resuming_an_offset_cursor() {
        let paging = Paging::Off.at(&PageCursor::Offset { offset: 26, limit: 13 });
        assert_eq!(paging, Paging::Offset { size: 13, page: 3 });
    }
}
