//! End-to-end tests across the codec, driver and core crates.

use std::thread;
use std::time::Duration;
use unidb_codec::{Document, WireValue};
use unidb_core::{MsSql, MySql, Page, PageCursor, Postgres, Sqlite};
use unidb_driver::{Context, DriverError, ExecResult, Reply, StatementKind};
use unidb_testkit::prelude::*;

fn numbers(count: i64) -> (unidb_driver::MemoryStore, MemorySession) {
    init_tracing();
    let (store, session) = memory_session();
    seed_numbers(&store, count);
    (store, session)
}

fn n_of(doc: &Document) -> i64 {
    doc.get("n").and_then(WireValue::as_integer).expect("row has n")
}

// ============================================================================
// Querying
// ============================================================================

#[test]
fn records_round_trip_through_the_document_store() {
    let (_store, session) = memory_session();
    let seeded = seed_people(&session, 12);

    let adults: Vec<Person> = session
        .collection(PEOPLE)
        .find(cond! { "age >=" => 18 })
        .order_by("id")
        .all()
        .unwrap();
    let expected: Vec<Person> = seeded.into_iter().filter(|p| p.age >= 18).collect();
    assert_eq!(adults, expected);
}

#[test]
fn or_trees_select_the_union() {
    let (_store, session) = numbers(20);
    let rows = session
        .collection(NUMBERS)
        .find(Condition::or([
            cond! { "n <" => 3 }.into(),
            cond! { "n" => Comparison::between(18, 19) }.into(),
        ]))
        .order_by("n")
        .all_documents()
        .unwrap();
    let seen: Vec<i64> = rows.iter().map(n_of).collect();
    assert_eq!(seen, [1, 2, 18, 19]);
}

#[test]
fn not_between_excludes_the_bounds() {
    let (_store, session) = numbers(10);
    let count = session
        .collection(NUMBERS)
        .find(cond! { "n" => Comparison::not_between(3, 8) })
        .count()
        .unwrap();
    assert_eq!(count, 4);
}

#[test]
fn one_reports_no_rows() {
    let (_store, session) = numbers(3);
    let err = session
        .collection(NUMBERS)
        .find(cond! { "n" => 42 })
        .one_document()
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!session.collection(NUMBERS).find(cond! { "n" => 42 }).exists().unwrap());
}

#[test]
fn cursor_end_differs_from_failure() {
    let (_store, session) = numbers(2);
    let mut rows = session.collection(NUMBERS).find_all().iter_documents().unwrap();
    assert!(rows.fetch().unwrap().is_some());
    assert!(rows.fetch().unwrap().is_some());
    assert!(rows.fetch().unwrap().is_none());
    assert!(matches!(rows.fetch(), Err(Error::CursorExhausted)));
}

#[test]
fn mid_stream_failure_surfaces_from_the_cursor() {
    let (script, session) = scripted_session(Postgres);
    script.reply(Reply::RowsThenError(
        vec![Document::new().with("n", 1i64)],
        DriverError::connection("server closed the connection"),
    ));
    let mut rows = session.collection("t").find_all().iter_documents().unwrap();
    assert!(rows.fetch().unwrap().is_some());
    assert!(rows.fetch().unwrap_err().is_connection());
    assert!(rows.is_exhausted());
}

#[test]
fn update_and_delete_report_affected_rows() {
    let (store, session) = numbers(10);
    let numbers = session.collection(NUMBERS);
    let touched = numbers
        .find(cond! { "n >" => 7 })
        .update(Document::new().with("label", "big"))
        .unwrap();
    assert_eq!(touched, 3);
    assert_eq!(numbers.find(cond! { "label" => "big" }).count().unwrap(), 3);

    let removed = numbers.find(cond! { "n <=" => 2 }).delete().unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.len(NUMBERS), 8);
}

// ============================================================================
// Pagination
// ============================================================================

#[test]
fn offset_pages_cover_every_row_once() {
    let (_store, session) = numbers(999);
    let paged = session.collection(NUMBERS).find_all().order_by("n").paginate(13);
    assert_eq!(paged.total_pages().unwrap(), 77);
    assert_eq!(paged.total_entries().unwrap(), 999);

    let mut seen = Vec::new();
    for page in 1..=77 {
        let rows = paged.page(page).all_documents().unwrap();
        assert_eq!(rows.len(), if page == 77 { 11 } else { 13 });
        seen.extend(rows.iter().map(n_of));
    }
    assert_eq!(seen, (1..=999).collect::<Vec<_>>());
    assert!(paged.page(78).all_documents().unwrap().is_empty());
}

#[test]
fn keyset_pages_follow_their_cursors() {
    let (_store, session) = numbers(50);
    let base = session.collection(NUMBERS).find_all().cursor("n").paginate(10);

    let mut seen = Vec::new();
    let mut page: Page<Numbered> = base.fetch_page().unwrap();
    while !page.is_empty() {
        seen.extend(page.items.iter().map(|r| r.n));
        let Some(next) = page.next_cursor.take() else { break };
        let token = next.to_token().unwrap();
        page = base.at(&PageCursor::from_token(&token).unwrap()).fetch_page().unwrap();
    }
    assert_eq!(seen, (1..=50).collect::<Vec<_>>());
}

#[test]
fn keyset_prev_page_walks_backwards() {
    let (_store, session) = numbers(30);
    let base = session.collection(NUMBERS).find_all().cursor("n").paginate(5);
    let rows: Vec<i64> = base.prev_page(21).all_documents().unwrap().iter().map(n_of).collect();
    assert_eq!(rows, [16, 17, 18, 19, 20]);
    let rows: Vec<i64> = base.next_page(21).all_documents().unwrap().iter().map(n_of).collect();
    assert_eq!(rows, [22, 23, 24, 25, 26]);
}

#[test]
fn dialects_render_their_own_paging() {
    let (pg, session) = scripted_session(Postgres);
    session.collection("t").find_all().order_by("id").paginate(5).page(3).all_documents().unwrap();
    assert_eq!(pg.executed_sql(), [r#"SELECT * FROM "t" ORDER BY "id" LIMIT 5 OFFSET 10"#]);

    let (ms, session) = scripted_session(MsSql);
    session.collection("t").find_all().order_by("id").paginate(5).page(3).all_documents().unwrap();
    assert_eq!(
        ms.executed_sql(),
        ["SELECT * FROM [t] ORDER BY [id] OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"]
    );
}

#[test]
fn question_mark_operators_survive_placeholder_numbering() {
    let (pg, session) = scripted_session(Postgres);
    session
        .collection("docs")
        .find(cond! { "tags ?|" => vec!["a", "b"], "age >" => 1 })
        .count()
        .unwrap();
    let sql = pg.executed_sql();
    assert_eq!(
        sql,
        [r#"SELECT COUNT(*) AS count FROM "docs" WHERE "tags" ?| $1 AND "age" > $2"#]
    );
    assert_eq!(pg.statements_of(StatementKind::Query)[0].params.len(), 2);

    let (_my, session) = scripted_session(MySql);
    let err = session
        .collection("docs")
        .find(cond! { "tags ?" => "a" })
        .count()
        .unwrap_err();
    assert!(matches!(err, Error::Compile(_)));
}

// ============================================================================
// Batches
// ============================================================================

#[test]
fn batch_writes_ceil_chunks() {
    init_tracing();
    let (store, session) = memory_session();
    let mut batch = session.collection(NUMBERS).batch(64);
    for n in 0..1_000i64 {
        batch.values_doc(Document::new().with("n", n)).unwrap();
    }
    let summary = batch.wait().unwrap();
    assert_eq!(summary.statements, 16);
    assert_eq!(summary.rows, 1_000);
    assert_eq!(store.len(NUMBERS), 1_000);
}

#[test]
fn batch_of_records_uses_multi_row_inserts() {
    let (script, session) = scripted_session(MySql);
    let mut batch = session.collection(PEOPLE).batch(3);
    for person in people(7) {
        batch.values(&person).unwrap();
    }
    assert_eq!(batch.wait().unwrap().statements, 3);
    let inserts = script.statements_of(StatementKind::Execute);
    assert_eq!(inserts.len(), 3);
    assert!(inserts.iter().all(|s| s.sql.starts_with("INSERT INTO `people`")));
}

#[test]
fn batch_returning_generated_keys() {
    let (script, session) = scripted_session(Sqlite);
    script.reply(Reply::Exec(ExecResult {
        rows_affected: 2,
        last_insert_id: Some(101),
    }));
    script.reply(Reply::Exec(ExecResult {
        rows_affected: 1,
        last_insert_id: Some(102),
    }));
    let mut batch = session.collection("t").batch(2).with_returning("id");
    for n in 0..3i64 {
        batch.values_doc(Document::new().with("n", n)).unwrap();
    }
    let keys = batch.wait().unwrap().keys;
    assert_eq!(keys, [100i64, 101, 102].map(WireValue::Integer).to_vec());
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn failed_closure_rolls_back() {
    let (store, session) = memory_session();
    let err = session
        .tx(|tx| {
            tx.collection(NUMBERS).insert_doc(Document::new().with("n", 1i64))?;
            Err::<(), _>(Error::invalid_operation("stop"))
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOperation { .. }));
    assert_eq!(store.len(NUMBERS), 0);
}

#[test]
fn committed_writes_are_published() {
    let (store, session) = memory_session();
    let tx = session.begin().unwrap();
    tx.collection(NUMBERS).insert_doc(Document::new().with("n", 1i64)).unwrap();
    assert_eq!(store.len(NUMBERS), 0);
    tx.commit().unwrap();
    assert_eq!(store.len(NUMBERS), 1);
}

#[test]
fn commit_keeps_writes_from_other_connections() {
    let (store, session) = numbers(3);
    let tx = session.begin().unwrap();
    tx.collection(NUMBERS).insert_doc(Document::new().with("n", 4i64)).unwrap();

    let other = session.clone();
    thread::spawn(move || {
        other.collection("other").insert_doc(Document::new().with("n", 1i64)).unwrap();
        other.collection(NUMBERS).insert_doc(Document::new().with("n", 5i64)).unwrap();
    })
    .join()
    .unwrap();
    assert_eq!(tx.collection("other").count().unwrap(), 0);

    tx.commit().unwrap();
    assert_eq!(store.len("other"), 1);
    assert_eq!(store.len(NUMBERS), 5);
}

#[test]
fn dropped_transaction_rolls_back() {
    let (script, session) = scripted_session(Postgres);
    {
        let tx = session.begin().unwrap();
        tx.collection("t").find_all().count().unwrap();
    }
    assert_eq!(script.statements_of(StatementKind::Begin).len(), 1);
    assert_eq!(script.statements_of(StatementKind::Rollback).len(), 1);
    assert!(script.statements_of(StatementKind::Commit).is_empty());
}

#[test]
fn broken_connection_inside_a_transaction_is_not_retried() {
    let (store, session) = numbers(3);
    let err = session
        .tx(|tx| {
            store.break_connections();
            tx.collection(NUMBERS).count()
        })
        .unwrap_err();
    assert!(err.is_connection());
    assert_eq!(session.stats().retries, 0);
    assert_eq!(session.collection(NUMBERS).count().unwrap(), 3);
}

// ============================================================================
// Pool, cancellation and retry
// ============================================================================

#[test]
fn broken_pool_recovers_with_one_retry() {
    let (store, session) = numbers(5);
    store.break_connections();
    assert_eq!(session.collection(NUMBERS).count().unwrap(), 5);
    assert_eq!(session.stats().retries, 1);
}

#[test]
fn cancel_interrupts_an_in_flight_call() {
    let (store, session) = numbers(5);
    store.set_latency(Some(Duration::from_secs(5)));
    let (ctx, cancel) = Context::background().with_cancel();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
    });
    let err = session.with_context(ctx).collection(NUMBERS).count().unwrap_err();
    canceller.join().unwrap();
    assert!(err.is_canceled());

    store.set_latency(None);
    assert_eq!(session.collection(NUMBERS).count().unwrap(), 5);
}

#[test]
fn deadline_bounds_a_waiting_acquire() {
    let (_store, session) = memory_session_with(Config::default().max_open_connections(1));
    let held = session.begin().unwrap();
    let ctx = Context::background().with_timeout(Duration::from_millis(30));
    let err = session.with_context(ctx).collection(NUMBERS).count().unwrap_err();
    assert!(err.is_canceled());
    held.rollback().unwrap();
    assert_eq!(session.collection(NUMBERS).count().unwrap(), 0);
}

#[test]
fn prepared_statements_are_reused() {
    let (script, session) = scripted_session(Postgres);
    let numbers = session.collection("t");
    for n in 0..3i64 {
        numbers.find(cond! { "n" => n }).count().unwrap();
    }
    assert_eq!(script.statements_of(StatementKind::Prepare).len(), 1);
    let stats = session.stats();
    assert_eq!(stats.statement_cache_hits, 2);
}
