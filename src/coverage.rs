//! Coverage Checker
//!
//! Enumerates reference identifiers from the primary table and probes every
//! dependency check for each one. A verdict is handed to the report sink only
//! once all checks for that reference have run, so an aborted run never leaves
//! a half-evaluated line behind.

use crate::checks::CheckTable;
use crate::db::CoverageStore;
use crate::error::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "missing", rename_all = "lowercase")]
pub enum Verdict {
    Complete,
    Missing(Vec<String>),
}

impl Verdict {
    fn from_missing(missing: Vec<String>) -> Self {
        if missing.is_empty() {
            Verdict::Complete
        } else {
            Verdict::Missing(missing)
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Verdict::Complete)
    }

    /// Missing labels in check-table order; empty when complete.
    pub fn missing(&self) -> &[String] {
        match self {
            Verdict::Complete => &[],
            Verdict::Missing(labels) => labels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageResult {
    pub reference: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl fmt::Display for CoverageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verdict {
            Verdict::Complete => write!(f, "{}: COMPLETE", self.reference),
            Verdict::Missing(labels) => {
                write!(f, "{}: MISSING -> {}", self.reference, labels.iter().join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub missing: usize,
}

/// Totals for one audit run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub checked: usize,
    pub complete: usize,
    pub missing: usize,
    pub by_label: Vec<LabelCount>,
}

impl CoverageSummary {
    pub fn new(table: &CheckTable) -> Self {
        Self {
            checked: 0,
            complete: 0,
            missing: 0,
            by_label: table
                .labels()
                .map(|label| LabelCount {
                    label: label.to_string(),
                    missing: 0,
                })
                .collect(),
        }
    }

    pub fn record(&mut self, result: &CoverageResult) {
        self.checked += 1;
        if result.verdict.is_complete() {
            self.complete += 1;
            return;
        }
        self.missing += 1;
        for label in result.verdict.missing() {
            if let Some(count) = self.by_label.iter_mut().find(|c| &c.label == label) {
                count.missing += 1;
            }
        }
    }
}

/// Receives verdicts as references finish evaluating.
pub trait ReportSink {
    fn verdict(&mut self, result: &CoverageResult) -> Result<()>;
}

impl ReportSink for Vec<CoverageResult> {
    fn verdict(&mut self, result: &CoverageResult) -> Result<()> {
        self.push(result.clone());
        Ok(())
    }
}

pub struct CoverageChecker<'a> {
    table: &'a CheckTable,
    only: Option<BTreeSet<String>>,
}

impl<'a> CoverageChecker<'a> {
    pub fn new(table: &'a CheckTable) -> Self {
        Self { table, only: None }
    }

    /// Restrict the run to these references. References absent from the
    /// primary table are skipped with a warning.
    pub fn with_references<I, T>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let only: BTreeSet<String> = references.into_iter().map(Into::into).collect();
        self.only = if only.is_empty() { None } else { Some(only) };
        self
    }

    /// Distinct references from the primary table, sorted lexicographically.
    pub async fn references<S: CoverageStore>(&self, store: &mut S) -> Result<Vec<String>> {
        let distinct: BTreeSet<String> = store
            .fetch_references(&self.table.references)
            .await?
            .into_iter()
            .collect();

        let Some(only) = &self.only else {
            return Ok(distinct.into_iter().collect());
        };
        for absent in only.difference(&distinct) {
            warn!(reference = %absent, "Requested reference not found in primary table");
        }
        Ok(distinct.intersection(only).cloned().collect())
    }

    /// Run every dependency check for one reference, in table order.
    pub async fn evaluate<S: CoverageStore>(
        &self,
        store: &mut S,
        reference: &str,
    ) -> Result<CoverageResult> {
        let mut missing = Vec::new();
        for check in &self.table.checks {
            if !store.has_rows(check, reference).await? {
                missing.push(check.label.clone());
            }
        }
        Ok(CoverageResult {
            reference: reference.to_string(),
            verdict: Verdict::from_missing(missing),
        })
    }

    pub async fn run<S, K>(&self, store: &mut S, sink: &mut K) -> Result<CoverageSummary>
    where
        S: CoverageStore,
        K: ReportSink + ?Sized,
    {
        let references = self.references(store).await?;
        info!(count = references.len(), "Auditing references");

        let mut summary = CoverageSummary::new(self.table);
        for reference in &references {
            let result = self.evaluate(store, reference).await?;
            summary.record(&result);
            sink.verdict(&result)?;
        }

        info!(
            checked = summary.checked,
            complete = summary.complete,
            missing = summary.missing,
            "Audit finished"
        );
        Ok(summary)
    }
}

/// Run the checker and close the store on every exit path.
///
/// When both the run and the close fail, the run's error is returned.
pub async fn audit<S, K>(
    mut store: S,
    checker: &CoverageChecker<'_>,
    sink: &mut K,
) -> Result<CoverageSummary>
where
    S: CoverageStore,
    K: ReportSink + ?Sized,
{
    let outcome = checker.run(&mut store, sink).await;
    let closed = store.close().await;

    match (outcome, closed) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close connection after aborted run");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::DependencyCheck;
    use crate::error::AuditError;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// In-memory store: references plus the set of labels each one satisfies.
    #[derive(Default)]
    struct FakeStore {
        references: Vec<String>,
        present: HashMap<String, HashSet<String>>,
        broken_label: Option<String>,
        closed: Arc<AtomicBool>,
        queries: usize,
    }

    impl FakeStore {
        fn with(refs: &[(&str, &[&str])]) -> Self {
            let mut store = FakeStore::default();
            for (reference, labels) in refs {
                store.references.push(reference.to_string());
                store.present.insert(
                    reference.to_string(),
                    labels.iter().map(|l| l.to_string()).collect(),
                );
            }
            store
        }
    }

    #[async_trait]
    impl CoverageStore for FakeStore {
        async fn fetch_references(&mut self, _query: &str) -> Result<Vec<String>> {
            Ok(self.references.clone())
        }

        async fn has_rows(&mut self, check: &DependencyCheck, reference: &str) -> Result<bool> {
            self.queries += 1;
            if self.broken_label.as_deref() == Some(check.label.as_str()) {
                return Err(AuditError::query(
                    check.label.clone(),
                    sqlx::Error::Protocol(format!("no such table: {}", check.label)),
                ));
            }
            Ok(self
                .present
                .get(reference)
                .map(|labels| labels.contains(&check.label))
                .unwrap_or(false))
        }

        async fn close(self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    const ALL: &[&str] = &["Deals", "Documents", "RiskAssessment", "IDVerifications"];

    #[tokio::test]
    async fn test_complete_and_missing() {
        let table = CheckTable::default();
        let mut store = FakeStore::with(&[("A1", ALL), ("A2", &["Deals"])]);
        let mut results: Vec<CoverageResult> = Vec::new();

        let summary = CoverageChecker::new(&table)
            .run(&mut store, &mut results)
            .await
            .unwrap();

        let lines: Vec<String> = results.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "A1: COMPLETE",
                "A2: MISSING -> Documents, RiskAssessment, IDVerifications",
            ]
        );
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.complete, 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.by_label[0].missing, 0);
        assert_eq!(summary.by_label[1].missing, 1);
    }

    #[tokio::test]
    async fn test_no_dependencies_lists_all_labels_in_order() {
        let table = CheckTable::default();
        let mut store = FakeStore::with(&[("B9", &[])]);
        let mut results: Vec<CoverageResult> = Vec::new();

        CoverageChecker::new(&table)
            .run(&mut store, &mut results)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].verdict.missing(), ALL);
    }

    #[tokio::test]
    async fn test_duplicates_collapsed_and_sorted() {
        let table = CheckTable::default();
        let mut store = FakeStore::with(&[("C2", ALL), ("A1", ALL), ("C2", ALL), ("B1", ALL)]);
        let mut results: Vec<CoverageResult> = Vec::new();

        CoverageChecker::new(&table)
            .run(&mut store, &mut results)
            .await
            .unwrap();

        let refs: Vec<&str> = results.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["A1", "B1", "C2"]);
    }

    #[tokio::test]
    async fn test_empty_primary_table() {
        let table = CheckTable::default();
        let mut store = FakeStore::default();
        let mut results: Vec<CoverageResult> = Vec::new();

        let summary = CoverageChecker::new(&table)
            .run(&mut store, &mut results)
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(summary.checked, 0);
        assert_eq!(store.queries, 0);
    }

    #[tokio::test]
    async fn test_reference_filter() {
        let table = CheckTable::default();
        let mut store = FakeStore::with(&[("A1", ALL), ("A2", &["Deals"]), ("A3", ALL)]);
        let mut results: Vec<CoverageResult> = Vec::new();

        CoverageChecker::new(&table)
            .with_references(["A3", "A2", "ZZ"])
            .run(&mut store, &mut results)
            .await
            .unwrap();

        let refs: Vec<&str> = results.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["A2", "A3"]);
    }

    #[tokio::test]
    async fn test_substitute_check_table() {
        let table = CheckTable::new(
            "SELECT DISTINCT ref FROM t",
            vec![
                DependencyCheck::new("IDVerifications", "SELECT 1 FROM IDVerifications WHERE ref = $1"),
                DependencyCheck::new("Deals", "SELECT 1 FROM Deals WHERE ref = $1"),
            ],
        );
        let mut store = FakeStore::with(&[("A1", &[])]);
        let mut results: Vec<CoverageResult> = Vec::new();

        CoverageChecker::new(&table)
            .run(&mut store, &mut results)
            .await
            .unwrap();

        assert_eq!(results[0].to_string(), "A1: MISSING -> IDVerifications, Deals");
    }

    #[tokio::test]
    async fn test_failure_aborts_without_partial_verdict() {
        let table = CheckTable::default();
        let mut store = FakeStore::with(&[("A1", ALL), ("A2", ALL)]);
        store.broken_label = Some("RiskAssessment".to_string());
        let closed = store.closed.clone();
        let mut results: Vec<CoverageResult> = Vec::new();

        let checker = CoverageChecker::new(&table);
        let err = audit(store, &checker, &mut results).await.unwrap_err();

        assert!(matches!(err, AuditError::Query { .. }));
        assert!(results.is_empty());
        assert!(closed.load(Ordering::SeqCst), "store must be closed on failure");
    }

    #[tokio::test]
    async fn test_audit_closes_on_success() {
        let table = CheckTable::default();
        let store = FakeStore::with(&[("A1", ALL)]);
        let closed = store.closed.clone();
        let mut results: Vec<CoverageResult> = Vec::new();

        let checker = CoverageChecker::new(&table);
        let summary = audit(store, &checker, &mut results).await.unwrap();

        assert_eq!(summary.complete, 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_verdict_json_shape() {
        let result = CoverageResult {
            reference: "A2".to_string(),
            verdict: Verdict::Missing(vec!["Documents".to_string()]),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["reference"], "A2");
        assert_eq!(value["status"], "missing");
        assert_eq!(value["missing"][0], "Documents");
    }
}
