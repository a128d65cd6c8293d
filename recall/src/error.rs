use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecallError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Compute error: {0}")]
    Compute(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    ApiAuth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecallError {
    /// Input errors are the only failures that abort a retrieval before any
    /// strategy is dispatched.
    pub fn is_input_error(&self) -> bool {
        matches!(self, RecallError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, RecallError>;
