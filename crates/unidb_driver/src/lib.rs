//! # unidb Driver
//!
//! The boundary between the unidb core and backend drivers.
//!
//! Drivers are **opaque executors**: SQL drivers receive statement text in
//! its final dialect form with positional parameters, document drivers
//! receive compiled filter documents. Neither knows about records, field
//! mappings or conditions.
//!
//! ## Design Principles
//!
//! - Every call takes a [`Context`] and returns promptly once it is canceled
//! - Connection-level failures are reported as [`DriverError::Connection`] so
//!   callers can discard the connection
//! - Backend errors pass through verbatim with backend name and code
//! - Drivers must be `Send + Sync`; connections must be `Send`
//!
//! ## Available Drivers
//!
//! - [`MemoryStore`] - In-memory document store for tests and ephemeral data
//! - [`ScriptedSql`] - SQL driver that records statements and replays scripted results
//!
//! ## Example
//!
//! ```rust
//! use unidb_codec::Document;
//! use unidb_driver::{Context, Reply, ScriptedSql, SqlConnection, SqlDriver};
//!
//! let script = ScriptedSql::new("postgres");
//! script.reply(Reply::Rows(vec![Document::new().with("id", 1i64)]));
//!
//! let ctx = Context::background();
//! let mut conn = script.driver().open(&ctx).unwrap();
//! let mut rows = conn.query(&ctx, "SELECT id FROM t", &[]).unwrap();
//! assert!(rows.next_row(&ctx).unwrap().is_some());
//! assert_eq!(script.executed_sql(), vec!["SELECT id FROM t".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod document;
mod error;
mod faults;
pub mod memory;
mod rows;
mod scripted;
mod sql;

pub use context::{CancelHandle, Context};
pub use document::{DocumentConnection, DocumentDriver, FindCommand, SortOrder};
pub use error::{DriverError, DriverResult};
pub use memory::{MemoryConnection, MemoryDriver, MemoryStore};
pub use rows::{BufferedRows, RowSource};
pub use scripted::{Reply, ScriptedConnection, ScriptedDriver, ScriptedSql, Statement, StatementKind};
pub use sql::{ExecResult, SqlConnection, SqlDriver, StatementId};
