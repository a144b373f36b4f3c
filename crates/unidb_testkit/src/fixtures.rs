//! Test fixtures and session helpers.
//!
//! Provides sessions over the in-process drivers and a few sample records
//! with seeded collections.

use unidb_codec::{Describer, Document, Format, Record};
use unidb_core::{Config, Dialect, DocumentAdapter, Session, SqlAdapter};
use unidb_driver::{MemoryDriver, MemoryStore, ScriptedDriver, ScriptedSql};

/// A session over the in-memory document store.
pub type MemorySession = Session<DocumentAdapter<MemoryDriver>>;

/// A session over the scripted SQL driver.
pub type ScriptedSession = Session<SqlAdapter<ScriptedDriver>>;

/// Collection used by [`seed_people`].
pub const PEOPLE: &str = "people";

/// Collection used by [`seed_numbers`].
pub const NUMBERS: &str = "numbers";

/// Opens a session on a fresh in-memory store with default settings.
pub fn memory_session() -> (MemoryStore, MemorySession) {
    memory_session_with(Config::default())
}

/// Opens a session on a fresh in-memory store.
pub fn memory_session_with(config: Config) -> (MemoryStore, MemorySession) {
    let store = MemoryStore::new();
    let session = Session::open(DocumentAdapter::new(store.driver()), config)
        .expect("Failed to open memory session");
    (store, session)
}

/// Opens a session on a scripted SQL backend speaking `dialect`.
pub fn scripted_session(dialect: impl Dialect) -> (ScriptedSql, ScriptedSession) {
    scripted_session_with(dialect, Config::default())
}

/// Opens a session on a scripted SQL backend with explicit settings.
pub fn scripted_session_with(dialect: impl Dialect, config: Config) -> (ScriptedSql, ScriptedSession) {
    let script = ScriptedSql::new(dialect.name());
    let session = Session::open(SqlAdapter::new(script.driver(), dialect), config)
        .expect("Failed to open scripted session");
    (script, session)
}

/// Runs a test with a session over a fresh in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use unidb_testkit::with_memory_session;
///
/// #[test]
/// fn my_test() {
///     with_memory_session(|store, session| {
///         session.collection("c").insert_doc(Document::new()).unwrap();
///         assert_eq!(store.len("c"), 1);
///     });
/// }
/// ```
pub fn with_memory_session<F, R>(f: F) -> R
where
    F: FnOnce(&MemoryStore, &MemorySession) -> R,
{
    let (store, session) = memory_session();
    f(&store, &session)
}

/// A postal address stored as a nested document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City.
    pub city: String,
}

impl Record for Address {
    fn describe(d: &mut Describer<Self>) {
        d.field("street", |a| &a.street, |a| &mut a.street);
        d.field("city", |a| &a.city, |a| &mut a.city);
    }
}

/// Audit columns flattened into their owner's row.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Audit {
    /// Creation time, seconds since the epoch.
    pub created: i64,
    /// Last editor.
    pub editor: Option<String>,
}

impl Record for Audit {
    fn describe(d: &mut Describer<Self>) {
        d.field("created", |a| &a.created, |a| &mut a.created);
        d.field("editor", |a| &a.editor, |a| &mut a.editor).omit_empty();
    }
}

/// A sample record touching most field options.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    /// Primary key; left out of inserts while zero.
    pub id: i64,
    /// Name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Optional e-mail address.
    pub email: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Home address, stored as a nested document.
    pub address: Address,
    /// Audit columns.
    pub audit: Audit,
}

impl Record for Person {
    fn describe(d: &mut Describer<Self>) {
        d.field("id", |p| &p.id, |p| &mut p.id).primary_key().omit_empty();
        d.field("name", |p| &p.name, |p| &mut p.name);
        d.field("age", |p| &p.age, |p| &mut p.age);
        d.field("email", |p| &p.email, |p| &mut p.email);
        d.field("tags", |p| &p.tags, |p| &mut p.tags).format(Format::StringArray);
        d.nested("address", |p| &p.address, |p| &mut p.address);
        d.inline("audit", |p| &p.audit, |p| &mut p.audit);
    }
}

/// A small numbered row used for paging tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Numbered {
    /// Sequence number, starting at 1.
    pub n: i64,
    /// Display label.
    pub label: String,
}

impl Record for Numbered {
    fn describe(d: &mut Describer<Self>) {
        d.field("n", |r| &r.n, |r| &mut r.n).primary_key();
        d.field("label", |r| &r.label, |r| &mut r.label);
    }
}

/// Deterministic sample people, ids 1 through `count`.
pub fn people(count: usize) -> Vec<Person> {
    const NAMES: [&str; 6] = ["Ada", "Brian", "Carmen", "Dmitri", "Eun-ji", "Farah"];
    (1..=count)
        .map(|i| {
            let n = i as i64;
            Person {
                id: n,
                name: format!("{} {i}", NAMES[i % NAMES.len()]),
                age: 10 + (n * 7) % 60,
                email: (i % 3 != 0).then(|| format!("person{i}@example.com")),
                tags: (0..i % 3).map(|t| format!("tag{t}")).collect(),
                address: Address {
                    street: format!("{i} Main St"),
                    city: if i % 2 == 0 { "Springfield" } else { "Shelbyville" }.into(),
                },
                audit: Audit {
                    created: 1_700_000_000 + n,
                    editor: None,
                },
            }
        })
        .collect()
}

/// Inserts [`people`] into [`PEOPLE`] and returns them.
pub fn seed_people<A: unidb_core::Adapter>(session: &Session<A>, count: usize) -> Vec<Person> {
    let rows = people(count);
    let collection = session.collection(PEOPLE);
    for person in &rows {
        collection.insert(person).expect("Failed to insert person");
    }
    rows
}

/// Seeds [`NUMBERS`] with rows `n = 1..=count` directly into the store.
pub fn seed_numbers(store: &MemoryStore, count: i64) {
    store.seed(
        NUMBERS,
        (1..=count).map(|n| Document::new().with("n", n).with("label", format!("#{n}"))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use unidb_core::{Postgres, StatsSnapshot};

    #[test]
    fn memory_session_starts_with_one_idle_connection() {
        let (_store, session) = memory_session();
        let stats: StatsSnapshot = session.stats();
        assert_eq!((stats.open, stats.idle), (1, 1));
    }

    #[test]
    fn scripted_session_is_named_after_the_dialect() {
        let (script, session) = scripted_session(Postgres);
        session.ping().unwrap();
        assert_eq!(session.adapter().dialect().name(), "postgres");
        assert!(script.executed_sql().is_empty());
    }

    #[test]
    fn seeded_people_round_trip() {
        with_memory_session(|store, session| {
            let seeded = seed_people(session, 6);
            assert_eq!(store.len(PEOPLE), 6);
            let read: Vec<Person> = session.collection(PEOPLE).find_all().order_by("id").all().unwrap();
            assert_eq!(read, seeded);
        });
    }

    #[test]
    fn numbers_are_seeded_in_order() {
        let (store, session) = memory_session();
        seed_numbers(&store, 5);
        let first: Numbered = session.collection(NUMBERS).find_all().order_by("n").one().unwrap();
        assert_eq!(first.n, 1);
        assert_eq!(first.label, "#1");
    }
}
