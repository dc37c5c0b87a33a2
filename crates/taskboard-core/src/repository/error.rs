//! Storage and feed errors

use thiserror::Error;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Row-level error reported by the remote row-store
    #[error("{context}: {message} (code {code})")]
    Backend {
        context: String,
        code: String,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    /// Non-success HTTP status without a row-level error body
    #[error("{context}: HTTP {status}: {body}")]
    Status {
        context: String,
        status: u16,
        body: String,
    },

    #[error("{context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// Success response whose body is not the expected rows
    #[error("{context}: malformed response: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage quota exceeded: {size} bytes needed, {quota} allowed")]
    QuotaExceeded { size: usize, quota: usize },

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("Realtime channel error: {0}")]
    Realtime(String),
}

impl RepositoryError {
    /// Row-level error code, if the backend sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            RepositoryError::Backend { code, .. } => Some(code),
            _ => None,
        }
    }
}
