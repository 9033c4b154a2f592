//! Error types for the persistence gateway.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PersistenceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistenceError::Database(_))
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
