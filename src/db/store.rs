//! Query seam between the coverage checker and the database.

use crate::checks::{DependencyCheck, REFERENCE_QUERY_LABEL};
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use sqlx::{AnyConnection, Connection};
use tracing::{debug, warn};

/// Read-only access the coverage checker needs from a database.
#[async_trait]
pub trait CoverageStore: Send {
    /// Run the reference query and return its first column.
    async fn fetch_references(&mut self, query: &str) -> Result<Vec<String>>;

    /// Whether `check` returns at least one row for `reference`.
    async fn has_rows(&mut self, check: &DependencyCheck, reference: &str) -> Result<bool>;

    /// Release the underlying connection.
    async fn close(self) -> Result<()>;
}

/// `CoverageStore` over a single sqlx connection.
pub struct SqlStore {
    conn: AnyConnection,
}

impl SqlStore {
    pub fn new(conn: AnyConnection) -> Self {
        Self { conn }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(super::connection::connect(database_url).await?))
    }
}

#[async_trait]
impl CoverageStore for SqlStore {
    async fn fetch_references(&mut self, query: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, Option<String>>(query)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| AuditError::query(REFERENCE_QUERY_LABEL, e))?;

        let total = rows.len();
        let references: Vec<String> = rows.into_iter().flatten().collect();
        if references.len() < total {
            warn!(
                skipped = total - references.len(),
                "Reference query returned NULL values; they are not audited"
            );
        }
        Ok(references)
    }

    async fn has_rows(&mut self, check: &DependencyCheck, reference: &str) -> Result<bool> {
        let row = sqlx::query(&check.existence_query())
            .bind(reference)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|e| AuditError::query(format!("{} for {}", check.label, reference), e))?;
        debug!(check = %check.label, reference, found = row.is_some(), "Dependency check");
        Ok(row.is_some())
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(AuditError::Connection)
    }
}
