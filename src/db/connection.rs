//! Single-connection acquisition over the sqlx `Any` driver.

use crate::error::{AuditError, Result};
use sqlx::{AnyConnection, Connection};
use tracing::debug;

/// Open one connection to `database_url`.
///
/// The backend is picked from the URL scheme (`postgres://`, `sqlite:`).
pub async fn connect(database_url: &str) -> Result<AnyConnection> {
    sqlx::any::install_default_drivers();
    let conn = AnyConnection::connect(database_url)
        .await
        .map_err(AuditError::Connection)?;
    debug!(backend = conn.backend_name(), "Connection established");
    Ok(conn)
}
