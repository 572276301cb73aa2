//! Database module for the coverage audit
//!
//! One connection per run, no pool. Queries go through the `CoverageStore`
//! seam so the checker can run against a fake in tests.

pub mod connection;
pub mod store;

pub use connection::connect;
pub use store::{CoverageStore, SqlStore};
