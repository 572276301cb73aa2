use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid check '{label}': {reason}")]
    InvalidCheck { label: String, reason: String },

    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Query error ({context}): {source}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuditError {
    pub fn query(context: impl Into<String>, source: sqlx::Error) -> Self {
        AuditError::Query {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
