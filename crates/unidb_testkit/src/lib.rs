//! # unidb Testkit
//!
//! Test utilities for unidb.
//!
//! This crate provides:
//! - Sessions over the in-memory document store and the scripted SQL driver
//! - Sample records and seeded collections
//! - Property-based test generators using proptest
//! - Concurrent workload helpers for pool and batch tests
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use unidb_testkit::prelude::*;
//!
//! #[test]
//! fn adults_only() {
//!     init_tracing();
//!     let (_store, session) = memory_session();
//!     seed_people(&session, 20);
//!     let adults = session.collection(PEOPLE).find(cond! { "age >=" => 18 }).count().unwrap();
//!     assert!(adults > 0);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod trace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::trace::*;
    pub use unidb_core::{cond, Comparison, Cond, Condition, Config, Error};
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use trace::*;
