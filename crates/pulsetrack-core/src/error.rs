use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or malformed required field on an event or rule.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The event log (or a single query against it) failed.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
