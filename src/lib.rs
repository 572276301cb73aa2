//! Referential coverage audit for instruction references.
//!
//! For every distinct reference in the primary table, checks that each
//! dependent table holds at least one matching row and reports the gaps.

pub mod checks;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod db;
pub mod error;
pub mod report;

pub use checks::{CheckTable, DependencyCheck};
pub use config::{ConnectionSettings, Driver};
pub use coverage::{audit, CoverageChecker, CoverageResult, CoverageSummary, ReportSink, Verdict};
pub use db::{CoverageStore, SqlStore};
pub use error::{AuditError, Result};
