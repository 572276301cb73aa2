//! Dependency check table
//!
//! A check table pairs the query that enumerates reference identifiers with an
//! ordered list of labelled existence queries. Each existence query takes the
//! reference as its only parameter (`$1`) and returns at least one row when the
//! dependent record exists.

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::BTreeSet;
use std::path::Path;

/// Label used in error context for the reference query.
pub const REFERENCE_QUERY_LABEL: &str = "reference query";

const DEFAULT_REFERENCE_QUERY: &str = "SELECT DISTINCT InstructionRef FROM Instructions \
     WHERE InstructionRef IS NOT NULL ORDER BY InstructionRef";

const DEFAULT_DEPENDENT_TABLES: [&str; 4] = ["Deals", "Documents", "RiskAssessment", "IDVerifications"];

/// A named existence query bound to one reference at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCheck {
    pub label: String,
    pub query: String,
}

impl DependencyCheck {
    pub fn new(label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            query: query.into(),
        }
    }

    /// The check wrapped so the database only reports whether a row exists.
    ///
    /// None of the check's own columns are decoded, so projections of types
    /// the driver cannot map (timestamps, booleans, uuids) still work.
    pub fn existence_query(&self) -> String {
        let inner = self.query.trim().trim_end_matches(';').trim_end();
        format!("SELECT 1 AS present WHERE EXISTS ({})", inner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTable {
    /// Query returning the reference identifiers to audit (one column).
    pub references: String,

    /// Existence checks, in reporting order.
    pub checks: Vec<DependencyCheck>,
}

impl Default for CheckTable {
    /// The instruction table: every instruction must have a deal, documents,
    /// a risk assessment and an ID verification.
    fn default() -> Self {
        Self {
            references: DEFAULT_REFERENCE_QUERY.to_string(),
            checks: DEFAULT_DEPENDENT_TABLES
                .iter()
                .map(|table| {
                    DependencyCheck::new(
                        *table,
                        format!("SELECT 1 FROM {} WHERE InstructionRef = $1", table),
                    )
                })
                .collect(),
        }
    }
}

impl CheckTable {
    pub fn new(references: impl Into<String>, checks: Vec<DependencyCheck>) -> Self {
        Self {
            references: references.into(),
            checks,
        }
    }

    /// Load a check table from a JSON file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("cannot read check file {}: {}", path.display(), e))
        })?;
        let table: CheckTable = serde_json::from_str(&raw)?;
        table.validate()?;
        Ok(table)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.label.as_str())
    }

    /// Reject anything other than plain read queries (including
    /// `SELECT ... INTO`) and queries binding the wrong number of parameters.
    pub fn validate(&self) -> Result<()> {
        if self.checks.is_empty() {
            return Err(AuditError::Config(
                "check table must contain at least one check".to_string(),
            ));
        }

        validate_query(REFERENCE_QUERY_LABEL, &self.references, 0)?;

        let mut seen = BTreeSet::new();
        for check in &self.checks {
            if check.label.trim().is_empty() {
                return Err(AuditError::InvalidCheck {
                    label: check.label.clone(),
                    reason: "label must not be empty".to_string(),
                });
            }
            if !seen.insert(check.label.as_str()) {
                return Err(AuditError::InvalidCheck {
                    label: check.label.clone(),
                    reason: "duplicate label".to_string(),
                });
            }
            validate_query(&check.label, &check.query, 1)?;
        }
        Ok(())
    }
}

fn validate_query(label: &str, sql: &str, expected_params: usize) -> Result<()> {
    let invalid = |reason: String| AuditError::InvalidCheck {
        label: label.to_string(),
        reason,
    };
    let dialect = GenericDialect {};

    let statements =
        Parser::parse_sql(&dialect, sql).map_err(|e| invalid(format!("unparseable SQL: {}", e)))?;
    match statements.as_slice() {
        [Statement::Query(query)] if selects_into(&query.body) => {
            return Err(invalid("SELECT ... INTO is not allowed".to_string()))
        }
        [Statement::Query(_)] => {}
        [_] => return Err(invalid("only SELECT queries are allowed".to_string())),
        _ => {
            return Err(invalid(format!(
                "expected exactly one statement, found {}",
                statements.len()
            )))
        }
    }

    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| invalid(format!("unparseable SQL: {}", e)))?;
    let placeholders: BTreeSet<String> = tokens
        .into_iter()
        .filter_map(|t| match t {
            Token::Placeholder(p) => Some(p),
            _ => None,
        })
        .collect();

    if placeholders.len() != expected_params {
        return Err(invalid(format!(
            "expected {} parameter(s), found {}",
            expected_params,
            placeholders.len()
        )));
    }
    if expected_params == 1 && !placeholders.contains("$1") {
        return Err(invalid("the reference must be bound as $1".to_string()));
    }
    Ok(())
}

fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => selects_into(&query.body),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        _ => false,
    }
}
