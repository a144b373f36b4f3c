//! # unidb Core
//!
//! One query and marshaling API over SQL engines and document stores.
//!
//! This crate provides:
//! - a backend-agnostic condition model ([`Cond`], [`Comparison`], [`Condition`])
//! - condition compilers for PostgreSQL, MySQL, SQLite and SQL Server
//!   dialects and for document stores ([`compile`])
//! - result sets with lazy cursors and offset or keyset pagination
//! - a concurrent batch insert pipeline with backpressure
//! - sessions with a connection pool, prepared statement caching,
//!   transactions, cancellation and broken-connection retry
//!
//! ## Design Principles
//!
//! - Backends are reached only through the driver traits of `unidb_driver`
//! - Filters compile deterministically, so prepared statements are reused
//! - Unsupported operators fail with an error, never a weaker query
//! - Every driver call carries a cancellable [`Context`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use unidb_core::{cond, Config, Comparison, Postgres, Session, SqlAdapter};
//!
//! let session = Session::open(SqlAdapter::new(driver, Postgres), Config::default())?;
//! let people = session.collection("people");
//!
//! let adults: Vec<Person> = people
//!     .find(cond! { "age >=" => 18, "name" => Comparison::like("A%") })
//!     .order_by("-age")
//!     .paginate(20)
//!     .page(2)
//!     .all()?;
//!
//! session.tx(|tx| {
//!     tx.collection("people").find(cond! { "age <" => 0 }).delete()?;
//!     Ok(())
//! })?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
mod batch;
mod collection;
pub mod compile;
mod cond;
mod config;
mod error;
mod paginate;
mod query;
mod result;
mod rows;
mod session;
mod stats;

pub use adapter::{Adapter, CacheStats, DocumentAdapter, InsertOutcome, SqlAdapter};
pub use batch::{BatchInserter, BatchSummary};
pub use collection::Collection;
pub use compile::{Dialect, MsSql, MySql, Postgres, Sqlite};
pub use cond::{Comparison, Cond, Condition, Operand, Operator};
pub use config::Config;
pub use error::{CompileError, Error, Result};
pub use paginate::{Page, PageCursor};
pub use query::{OrderBy, Query};
pub use result::ResultSet;
pub use rows::Rows;
pub use session::{Session, Tx};
pub use stats::{SessionStats, StatsSnapshot};

pub use unidb_codec::{Describer, Document, Format, Record, WireValue};
pub use unidb_driver::{CancelHandle, Context, DriverError};
