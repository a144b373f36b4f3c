//! Condition compilation.
//!
//! - [`SqlCompiler`] turns a [`Condition`](crate::Condition) into a `WHERE`
//!   fragment with positional parameters.
//! - [`DocumentCompiler`] turns it into a document-store filter.
//! - [`statement`] assembles complete SQL statements for a [`Dialect`].

mod dialect;
mod document;
mod sql;
pub mod statement;

pub use dialect::{Dialect, KeyReturn, MsSql, MySql, Postgres, Sqlite};
pub use document::{like_to_regex, DocumentCompiler};
pub use sql::{Predicate, SqlCompiler};
pub use statement::Statement;
