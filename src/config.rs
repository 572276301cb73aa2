//! Connection settings
//!
//! Credentials come from the command line or the environment (optionally via
//! a `.env` file), never from source. A full `DATABASE_URL` wins; otherwise
//! the URL is composed from the `COVERAGE_DB_*` parts.

use crate::error::{AuditError, Result};
use clap::{Args, ValueEnum};
use std::fmt;
use url::Url;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Driver {
    #[default]
    Postgres,
    Sqlite,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Postgres => write!(f, "postgres"),
            Driver::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct ConnectionSettings {
    /// Full connection URL (postgres://... or sqlite:...)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Database driver used when composing the URL from parts
    #[arg(long, env = "COVERAGE_DB_DRIVER", value_enum, default_value_t = Driver::Postgres)]
    pub driver: Driver,

    /// Database server host
    #[arg(long, env = "COVERAGE_DB_HOST")]
    pub host: Option<String>,

    /// Database server port
    #[arg(long, env = "COVERAGE_DB_PORT")]
    pub port: Option<u16>,

    /// Database name (file path for sqlite)
    #[arg(long, env = "COVERAGE_DB_NAME")]
    pub database: Option<String>,

    #[arg(long, env = "COVERAGE_DB_USER")]
    pub user: Option<String>,

    #[arg(long, env = "COVERAGE_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl ConnectionSettings {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            database_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Resolve the URL handed to the driver.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = self.database_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.to_string());
        }

        let database = self
            .database
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                AuditError::Config(
                    "set DATABASE_URL or COVERAGE_DB_NAME (--database-url / --database)"
                        .to_string(),
                )
            })?;

        match self.driver {
            Driver::Sqlite => Ok(format!("sqlite:{}", database)),
            Driver::Postgres => {
                let host = self
                    .host
                    .as_deref()
                    .filter(|h| !h.trim().is_empty())
                    .ok_or_else(|| {
                        AuditError::Config("COVERAGE_DB_HOST (--host) is required".to_string())
                    })?;

                let credentials = match (&self.user, &self.password) {
                    (Some(user), Some(password)) => format!(
                        "{}:{}@",
                        urlencoding::encode(user),
                        urlencoding::encode(password)
                    ),
                    (Some(user), None) => format!("{}@", urlencoding::encode(user)),
                    (None, Some(_)) => {
                        return Err(AuditError::Config(
                            "COVERAGE_DB_PASSWORD given without COVERAGE_DB_USER".to_string(),
                        ))
                    }
                    (None, None) => String::new(),
                };
                let port = self.port.map(|p| format!(":{}", p)).unwrap_or_default();

                Ok(format!(
                    "postgres://{}{}{}/{}",
                    credentials,
                    host,
                    port,
                    urlencoding::encode(database)
                ))
            }
        }
    }

    /// Connection target with credentials stripped, for logs.
    pub fn redacted(&self) -> String {
        match self.database_url() {
            Ok(url) => redact_url(&url),
            Err(_) => "<unconfigured>".to_string(),
        }
    }
}

/// Drops user info and the query string, where drivers also accept passwords.
fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "<unparseable url>".to_string();
    };
    let _ = url.set_password(None);
    let _ = url.set_username("");
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}
