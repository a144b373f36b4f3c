//! Result sets.
//!
//! A [`ResultSet`] describes a read without running it. Modifiers return a
//! new result set, so a base set can be shared and refined:
//!
//! ```rust,ignore
//! let active = users.find(cond! { "status" => "active" });
//! let newest: Vec<User> = active.order_by("-created").limit(10).all()?;
//! let total = active.count()?;
//! ```
//!
//! `update` and `delete` act on every row the base filter matches; paging,
//! ordering and projection never narrow a write.

use crate::adapter::Adapter;
use crate::cond::Condition;
use crate::error::{Error, Result};
use crate::paginate::{Page, PageCursor, Paging, Plan};
use crate::query::{OrderBy, Query};
use crate::rows::{decode_record, keep_document, Decoder, Rows};
use crate::session::{OpKind, Session};
use unidb_codec::{Document, EncodeMode, FieldMapping, Record, WireValue};

/// An immutable description of a read.
pub struct ResultSet<A: Adapter> {
    session: Session<A>,
    query: Query,
    paging: Paging,
}

impl<A: Adapter> Clone for ResultSet<A> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            query: self.query.clone(),
            paging: self.paging.clone(),
        }
    }
}

impl<A: Adapter> std::fmt::Debug for ResultSet<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("query", &self.query)
            .field("paging", &self.paging)
            .finish()
    }
}

impl<A: Adapter> ResultSet<A> {
    pub(crate) fn new(session: Session<A>, query: Query) -> Self {
        Self {
            session,
            query,
            paging: Paging::Off,
        }
    }

    fn derive(&self, f: impl FnOnce(&mut Query, &mut Paging)) -> Self {
        let mut next = self.clone();
        f(&mut next.query, &mut next.paging);
        next
    }

    /// The query this set runs, before paging.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Narrows the filter with another condition.
    #[must_use]
    pub fn and(&self, condition: impl Into<Condition>) -> Self {
        let condition = condition.into();
        self.derive(|q, _| q.condition = std::mem::take(&mut q.condition).and_also(condition))
    }

    /// Restricts the returned columns.
    #[must_use]
    pub fn select<S: Into<String>>(&self, fields: impl IntoIterator<Item = S>) -> Self {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.derive(|q, _| q.fields = fields)
    }

    /// Adds a sort term, `"-column"` for descending. Earlier terms take
    /// priority.
    #[must_use]
    pub fn order_by(&self, term: &str) -> Self {
        let order = OrderBy::parse(term);
        self.derive(|q, _| q.order.push(order))
    }

    /// Groups rows by `columns`.
    #[must_use]
    pub fn group_by<S: Into<String>>(&self, columns: impl IntoIterator<Item = S>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.derive(|q, _| q.group = columns)
    }

    /// Returns at most `n` rows.
    #[must_use]
    pub fn limit(&self, n: u64) -> Self {
        self.derive(|q, _| q.limit = Some(n))
    }

    /// Skips the first `n` rows.
    #[must_use]
    pub fn offset(&self, n: u64) -> Self {
        self.derive(|q, _| q.offset = n)
    }

    /// Pages the results, `size` rows per page; zero means one page.
    #[must_use]
    pub fn paginate(&self, size: u64) -> Self {
        self.derive(|_, p| *p = std::mem::take(p).with_size(size))
    }

    /// Selects a 1-based offset page.
    #[must_use]
    pub fn page(&self, n: u64) -> Self {
        self.derive(|_, p| *p = std::mem::take(p).with_page(n))
    }

    /// Switches to keyset paging on `term` (`"-column"` for descending).
    #[must_use]
    pub fn cursor(&self, term: &str) -> Self {
        self.derive(|_, p| *p = std::mem::take(p).with_cursor(term))
    }

    /// The keyset page after the row whose cursor column holds `value`.
    #[must_use]
    pub fn next_page(&self, value: impl Into<WireValue>) -> Self {
        let value = value.into();
        self.derive(|_, p| *p = std::mem::take(p).with_seek(value, true))
    }

    /// The keyset page before the row whose cursor column holds `value`.
    /// Rows still come back in cursor order.
    #[must_use]
    pub fn prev_page(&self, value: impl Into<WireValue>) -> Self {
        let value = value.into();
        self.derive(|_, p| *p = std::mem::take(p).with_seek(value, false))
    }

    /// Resumes from a cursor taken from a [`Page`].
    #[must_use]
    pub fn at(&self, cursor: &PageCursor) -> Self {
        self.derive(|_, p| *p = std::mem::take(p).at(cursor))
    }

    /// Counts matching rows, ignoring limit, offset and paging.
    ///
    /// With grouping, counts groups.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn count(&self) -> Result<u64> {
        let query = self.query.filter_only();
        self.session
            .run(OpKind::Read, &|a, conn, ctx| a.count(conn, ctx, &query))
    }

    /// Same as [`ResultSet::count`].
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn total_entries(&self) -> Result<u64> {
        self.count()
    }

    /// Number of pages at the current page size; 1 when not paged.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn total_pages(&self) -> Result<u64> {
        match self.paging.size() {
            None | Some(0) => Ok(1),
            Some(size) => Ok(self.count()?.div_ceil(size)),
        }
    }

    /// True if at least one row matches.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn exists(&self) -> Result<bool> {
        match self.one_document() {
            Ok(_) => Ok(true),
            Err(Error::NoRows) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The first matching row as a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRows`] when nothing matches.
    pub fn one<T: Record>(&self) -> Result<T> {
        self.first(decode_record::<T>)
    }

    /// The first matching row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRows`] when nothing matches.
    pub fn one_document(&self) -> Result<Document> {
        self.first(keep_document)
    }

    fn first<T>(&self, decode: Decoder<T>) -> Result<T> {
        let mut plan = self.paging.plan(&self.query)?;
        plan.query.limit = Some(plan.query.limit.map_or(1, |n| n.min(1)));
        self.open(plan, decode)?.fetch()?.ok_or(Error::NoRows)
    }

    /// Every matching row as records.
    ///
    /// # Errors
    ///
    /// Returns compile, codec or driver errors.
    pub fn all<T: Record>(&self) -> Result<Vec<T>> {
        self.iter::<T>()?.collect()
    }

    /// Every matching row.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn all_documents(&self) -> Result<Vec<Document>> {
        self.iter_documents()?.collect()
    }

    /// A lazy cursor decoding rows into records.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors raised before the first row.
    pub fn iter<T: Record>(&self) -> Result<Rows<T>> {
        self.open(self.paging.plan(&self.query)?, decode_record::<T>)
    }

    /// A lazy cursor over raw rows.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors raised before the first row.
    pub fn iter_documents(&self) -> Result<Rows<Document>> {
        self.open(self.paging.plan(&self.query)?, keep_document)
    }

    fn open<T>(&self, plan: Plan, decode: Decoder<T>) -> Result<Rows<T>> {
        let ctx = self.session.context().clone();
        if plan.empty {
            return Ok(Rows::empty(ctx, decode));
        }
        let source = self
            .session
            .run(OpKind::Read, &|a, conn, ctx| a.select(conn, ctx, &plan.query))?;
        if plan.reverse {
            Rows::reversed(source, ctx, decode)
        } else {
            Ok(Rows::new(source, ctx, decode))
        }
    }

    /// Fetches the current page with cursors to its neighbours.
    ///
    /// # Errors
    ///
    /// Returns compile, codec or driver errors.
    pub fn fetch_page<T: Record>(&self) -> Result<Page<T>> {
        let page = self.fetch_page_documents()?;
        let mapping = FieldMapping::<T>::of()?;
        let items = page
            .items
            .into_iter()
            .map(|row| mapping.decode(row))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            number: page.number,
            next_cursor: page.next_cursor,
            prev_cursor: page.prev_cursor,
        })
    }

    /// Fetches the current page of raw rows with cursors to its neighbours.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn fetch_page_documents(&self) -> Result<Page<Document>> {
        let items = self.all_documents()?;
        let (number, next_cursor, prev_cursor) = self.paging.neighbours(&items);
        Ok(Page {
            items,
            number,
            next_cursor,
            prev_cursor,
        })
    }

    /// Sets columns on every matching row and returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn update(&self, set: Document) -> Result<u64> {
        let query = self.query.filter_only();
        self.session
            .run(OpKind::Write, &|a, conn, ctx| a.update(conn, ctx, &query, &set))
    }

    /// Writes a record's updatable fields to every matching row.
    ///
    /// The primary key and read-only fields are left out.
    ///
    /// # Errors
    ///
    /// Returns codec, compile or driver errors.
    pub fn update_record<T: Record>(&self, record: &T) -> Result<u64> {
        let set = FieldMapping::<T>::of()?.encode_with(record, EncodeMode::Update)?;
        self.update(set)
    }

    /// Deletes every matching row and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns compile or driver errors.
    pub fn delete(&self) -> Result<u64> {
        let query = self.query.filter_only();
        self.session
            .run(OpKind::Write, &|a, conn, ctx| a.delete(conn, ctx, &query))
    }
}

#[cfg(test)]
mod tests {
    use crate::adapter::{DocumentAdapter, SqlAdapter};
    use crate::compile::{MsSql, Postgres};
    use crate::cond::{Comparison, Cond};
    use crate::config::Config;
    use crate::error::Error;
    use crate::paginate::PageCursor;
    use crate::session::Session;
    use unidb_codec::{Describer, Document, Record, WireValue};
    use unidb_driver::{MemoryDriver, MemoryStore, Reply, ScriptedDriver, ScriptedSql};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Item {
        n: i64,
        label: String,
    }

    impl Record for Item {
        fn describe(d: &mut Describer<Self>) {
            d.field("n", |i| &i.n, |i| &mut i.n).primary_key();
            d.field("label", |i| &i.label, |i| &mut i.label);
        }
    }

    fn items(n: i64) -> (MemoryStore, Session<DocumentAdapter<MemoryDriver>>) {
        let store = MemoryStore::new();
        store.seed(
            "items",
            (1..=n).map(|i| Document::new().with("n", i).with("label", format!("item {i}"))),
        );
        let session = Session::open(DocumentAdapter::new(store.driver()), Config::default()).unwrap();
        (store, session)
    }

    fn scripted() -> (ScriptedSql, Session<SqlAdapter<ScriptedDriver>>) {
        let script = ScriptedSql::new("postgres");
        let session = Session::open(SqlAdapter::new(script.driver(), Postgres), Config::default()).unwrap();
        (script, session)
    }

    fn numbers(rows: &[Item]) -> Vec<i64> {
        rows.iter().map(|i| i.n).collect()
    }

    #[test]
    fn modifiers_leave_the_base_untouched() {
        let (_store, session) = items(10);
        let base = session.collection("items").find(Cond::new().with("n >", 5));
        let limited = base.order_by("-n").limit(2);
        assert_eq!(numbers(&limited.all::<Item>().unwrap()), [10, 9]);
        assert_eq!(base.all::<Item>().unwrap().len(), 5);
        assert_eq!(limited.count().unwrap(), 5);
    }

    #[test]
    fn and_narrows_the_filter() {
        let (_store, session) = items(10);
        let set = session
            .collection("items")
            .find(Cond::new().with("n >=", 3))
            .and(Cond::new().with("n", Comparison::lte(4)));
        assert_eq!(set.count().unwrap(), 2);
    }

    #[test]
    fn one_reports_no_rows() {
        let (_store, session) = items(3);
        let missing = session.collection("items").find(Cond::new().with("n", 99));
        assert!(matches!(missing.one::<Item>(), Err(Error::NoRows)));
        assert!(!missing.exists().unwrap());
        let found: Item = session
            .collection("items")
            .find(Cond::new().with("n", 2))
            .one()
            .unwrap();
        assert_eq!(found.label, "item 2");
    }

    #[test]
    fn offset_pages_cover_every_row() {
        let (_store, session) = items(999);
        let pages = session.collection("items").find_all().order_by("n").paginate(13);
        assert_eq!(pages.total_pages().unwrap(), 77);
        assert_eq!(pages.total_entries().unwrap(), 999);
        assert_eq!(pages.page(1).all::<Item>().unwrap().len(), 13);
        let last = pages.page(77).all::<Item>().unwrap();
        assert_eq!(last.len(), 11);
        assert_eq!(last.last().map(|i| i.n), Some(999));
        assert!(pages.page(78).all::<Item>().unwrap().is_empty());
    }

    #[test]
    fn unpaged_sets_have_one_page() {
        let (_store, session) = items(5);
        let all = session.collection("items").find_all();
        assert_eq!(all.total_pages().unwrap(), 1);
        assert_eq!(all.paginate(0).total_pages().unwrap(), 1);
        assert_eq!(all.paginate(0).all_documents().unwrap().len(), 5);
        assert!(all.paginate(0).page(2).all_documents().unwrap().is_empty());
    }

    #[test]
    fn keyset_pages_walk_both_ways() {
        let (_store, session) = items(10);
        let set = session.collection("items").find_all().paginate(3).cursor("n");
        let first = set.fetch_page::<Item>().unwrap();
        assert_eq!(numbers(&first.items), [1, 2, 3]);
        assert_eq!(first.prev_cursor, None);

        let second = set.next_page(3i64).fetch_page::<Item>().unwrap();
        assert_eq!(numbers(&second.items), [4, 5, 6]);

        let back = set.prev_page(4i64).fetch_page::<Item>().unwrap();
        assert_eq!(numbers(&back.items), [1, 2, 3]);

        let Some(next) = second.next_cursor else {
            panic!("second page has a successor");
        };
        let token = next.to_token().unwrap();
        let third = set.at(&PageCursor::from_token(&token).unwrap()).all::<Item>().unwrap();
        assert_eq!(numbers(&third), [7, 8, 9]);
    }

    #[test]
    fn descending_keyset_pages() {
        let (_store, session) = items(10);
        let set = session.collection("items").find_all().paginate(4).cursor("-n");
        assert_eq!(numbers(&set.all::<Item>().unwrap()), [10, 9, 8, 7]);
        assert_eq!(numbers(&set.next_page(7i64).all::<Item>().unwrap()), [6, 5, 4, 3]);
        assert_eq!(numbers(&set.prev_page(6i64).all::<Item>().unwrap()), [10, 9, 8, 7]);
    }

    #[test]
    fn iteration_is_lazy_and_reports_the_end_once() {
        let (_store, session) = items(2);
        let mut rows = session.collection("items").find_all().iter::<Item>().unwrap();
        assert!(rows.fetch().unwrap().is_some());
        assert!(rows.fetch().unwrap().is_some());
        assert!(rows.fetch().unwrap().is_none());
        assert!(matches!(rows.fetch(), Err(Error::CursorExhausted)));
    }

    #[test]
    fn writes_ignore_paging() {
        let (store, session) = items(10);
        let set = session
            .collection("items")
            .find(Cond::new().with("n <=", 4))
            .order_by("n")
            .limit(1)
            .offset(2);
        let changed = set.update(Document::new().with("label", "low")).unwrap();
        assert_eq!(changed, 4);
        assert_eq!(set.delete().unwrap(), 4);
        assert_eq!(store.len("items"), 6);
    }

    #[test]
    fn update_record_skips_the_key() {
        let (script, session) = scripted();
        let item = Item {
            n: 5,
            label: "five".into(),
        };
        session
            .collection("items")
            .find(Cond::new().with("n", 5))
            .update_record(&item)
            .unwrap();
        assert_eq!(
            script.executed_sql(),
            [r#"UPDATE "items" SET "label" = $1 WHERE "n" = $2"#]
        );
    }

    #[test]
    fn sql_paging_uses_the_dialect() {
        let script = ScriptedSql::new("mssql");
        let session = Session::open(SqlAdapter::new(script.driver(), MsSql), Config::default()).unwrap();
        session
            .collection("items")
            .find(Cond::new().with("n >", 1))
            .paginate(10)
            .page(3)
            .all_documents()
            .unwrap();
        assert_eq!(
            script.executed_sql(),
            ["SELECT * FROM [items] WHERE [n] > @p1 ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"]
        );
    }

    #[test]
    fn grouped_count_uses_a_subquery() {
        let (script, session) = scripted();
        script.reply(Reply::Rows(vec![Document::new().with("count", 3i64)]));
        let groups = session
            .collection("items")
            .find(Cond::new().with("n >", 0))
            .group_by(["label"])
            .count()
            .unwrap();
        assert_eq!(groups, 3);
        assert_eq!(
            script.executed_sql(),
            [r#"SELECT COUNT(*) AS count FROM (SELECT "label" FROM "items" WHERE "n" > $1 GROUP BY "label") AS grouped"#]
        );
    }

    #[test]
    fn exists_on_sql() {
        let (script, session) = scripted();
        script.reply(Reply::Rows(vec![Document::new().with("n", WireValue::Integer(1))]));
        assert!(session.collection("items").find_all().exists().unwrap());
        assert_eq!(script.executed_sql(), [r#"SELECT * FROM "items" LIMIT 1"#]);
    }
}
