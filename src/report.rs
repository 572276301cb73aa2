//! Console rendering of coverage results.

use crate::coverage::{CoverageResult, CoverageSummary, ReportSink};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

pub const DEFAULT_TITLE: &str = "Instruction coverage report";

/// Line-oriented report: banner, one line per reference, completion marker.
pub struct TextReport<W: Write> {
    out: W,
    only_missing: bool,
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            only_missing: false,
        }
    }

    pub fn only_missing(mut self, only_missing: bool) -> Self {
        self.only_missing = only_missing;
        self
    }

    pub fn banner(&mut self, title: &str) -> Result<()> {
        writeln!(self.out, "{}", title)?;
        writeln!(self.out, "{}", "=".repeat(title.chars().count()))?;
        self.out.flush()?;
        Ok(())
    }

    /// Written only when the run reached the last reference.
    pub fn finish(&mut self, summary: &CoverageSummary) -> Result<()> {
        writeln!(
            self.out,
            "Report complete: {} references checked, {} complete, {} missing",
            summary.checked, summary.complete, summary.missing
        )?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn verdict(&mut self, result: &CoverageResult) -> Result<()> {
        if self.only_missing && result.verdict.is_complete() {
            return Ok(());
        }
        writeln!(self.out, "{}", result)?;
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonOut<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    title: &'a str,
    generated_at: DateTime<Utc>,
    results: &'a [CoverageResult],
    summary: &'a CoverageSummary,
}

/// Collects every verdict and writes a single JSON document at the end.
pub struct JsonReport {
    title: String,
    only_missing: bool,
    results: Vec<CoverageResult>,
}

impl JsonReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            only_missing: false,
            results: Vec::new(),
        }
    }

    pub fn only_missing(mut self, only_missing: bool) -> Self {
        self.only_missing = only_missing;
        self
    }

    pub fn finish<W: Write>(&self, mut out: W, summary: &CoverageSummary) -> Result<()> {
        let doc = JsonDocument {
            title: &self.title,
            generated_at: Utc::now(),
            results: &self.results,
            summary,
        };
        serde_json::to_writer_pretty(&mut out, &JsonOut { ok: true, data: doc })?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }
}

impl ReportSink for JsonReport {
    fn verdict(&mut self, result: &CoverageResult) -> Result<()> {
        if !(self.only_missing && result.verdict.is_complete()) {
            self.results.push(result.clone());
        }
        Ok(())
    }
}
