//! Dripcast error types.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DripError>;

#[derive(Debug, Error)]
pub enum DripError {
    /// Outbound channel rejected or failed to accept a message.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Record store read or write failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A delivery record for this pair already exists.
    #[error("Duplicate delivery record for recipient {recipient_id} / message {message_id}")]
    DuplicateKey { recipient_id: i64, message_id: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Operator input rejected before reaching the store.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DripError {
    /// True when the error is the idempotent duplicate-insert case.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DripError::DuplicateKey { .. })
    }
}
