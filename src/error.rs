//! Error types for the table store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record not found: {table}/{id}")]
    NotFound { table: String, id: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persist failed (generation {generation}): {message}")]
    Persist { generation: u64, message: String },

    #[error("Backing file is locked by another process")]
    Locked,

    #[error("Backing file does not exist: {0}")]
    NotInitialized(String),
}

impl StoreError {
    pub(crate) fn not_found(table: &str, id: &str) -> Self {
        StoreError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        }
    }

    /// Whether this is the "no such record" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
