//! Command-line surface
//!
//! Argument parsing and the run outcome: what goes to stdout, what goes to
//! stderr, and which exit status the process ends with.

use crate::checks::CheckTable;
use crate::config::ConnectionSettings;
use crate::coverage::{audit, CoverageChecker, CoverageSummary};
use crate::db::SqlStore;
use crate::report::{JsonReport, TextReport, DEFAULT_TITLE};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info};

/// Run finished; no reference missing, or `--strict` not given.
pub const EXIT_OK: u8 = 0;
/// Run finished with `--strict` and at least one reference missing.
pub const EXIT_MISSING: u8 = 1;
/// Configuration, connection or query failure; the report is incomplete.
pub const EXIT_ABORTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "coverage-audit", version)]
#[command(about = "Report instruction references that are missing dependent records")]
pub struct Args {
    #[command(flatten)]
    pub connection: ConnectionSettings,

    /// JSON check table replacing the built-in instruction checks
    #[arg(long, env = "COVERAGE_CHECKS_FILE")]
    pub checks: Option<PathBuf>,

    /// Audit only this reference (repeatable)
    #[arg(short = 'r', long = "reference")]
    pub references: Vec<String>,

    /// Output a single JSON document instead of text lines
    #[arg(long)]
    pub json: bool,

    /// Hide references with no missing dependencies
    #[arg(long)]
    pub only_missing: bool,

    /// Exit with status 1 when any reference is missing a dependency
    #[arg(long)]
    pub strict: bool,

    /// Report banner title
    #[arg(long, default_value = DEFAULT_TITLE)]
    pub title: String,
}

pub fn exit_code(outcome: &Result<CoverageSummary>, strict: bool) -> u8 {
    match outcome {
        Ok(summary) if strict && summary.missing > 0 => EXIT_MISSING,
        Ok(_) => EXIT_OK,
        Err(_) => EXIT_ABORTED,
    }
}

/// Run the audit, report failures on `err` and return the exit status.
pub async fn execute<W: Write, E: Write>(args: &Args, out: W, mut err: E) -> u8 {
    let outcome = run(args, out).await;
    if let Err(e) = &outcome {
        error!(error = %e, "Coverage audit failed");
        let _ = writeln!(err, "Report aborted: {:#}", e);
        let _ = err.flush();
    }
    exit_code(&outcome, args.strict)
}

/// Connect, audit and write the report to `out`.
///
/// The banner is written only once the connection is up, and the completion
/// marker only after the last reference.
pub async fn run<W: Write>(args: &Args, out: W) -> Result<CoverageSummary> {
    let table = match &args.checks {
        Some(path) => CheckTable::from_json_file(path)
            .with_context(|| format!("loading check table {}", path.display()))?,
        None => CheckTable::default(),
    };
    table.validate()?;

    let url = args.connection.database_url()?;
    info!(db = %args.connection.redacted(), "Connecting");
    let store = SqlStore::connect(&url)
        .await
        .with_context(|| format!("connecting to {}", args.connection.redacted()))?;

    let checker = CoverageChecker::new(&table).with_references(args.references.iter().cloned());

    if args.json {
        let mut report = JsonReport::new(&args.title).only_missing(args.only_missing);
        let summary = audit(store, &checker, &mut report).await?;
        report.finish(out, &summary)?;
        return Ok(summary);
    }

    let mut report = TextReport::new(out).only_missing(args.only_missing);
    report.banner(&args.title)?;
    let summary = audit(store, &checker, &mut report).await?;
    report.finish(&summary)?;
    Ok(summary)
}
