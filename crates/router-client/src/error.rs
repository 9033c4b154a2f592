//! Error types for the RouterOS API client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterClientError {
    #[error("router I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("router operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("authentication failed for user: {0}")]
    AuthenticationFailed(String),

    #[error("router returned !trap: {0}")]
    TrapReceived(String),

    #[error("dynamic queue edit refused for {username}; CoA then recreate")]
    DynamicQueueConflict { username: String },

    #[error("no matching object found: {0}")]
    NotFound(String),

    #[error("malformed router protocol data: {0}")]
    Protocol(String),

    #[error("NAS configuration is absent or inactive: {0}")]
    ConfigurationAbsent(String),
}

impl RouterClientError {
    /// Network-transient failures are worth a same-tick fallback leg;
    /// everything else is logged and the cascade moves on (§7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, RouterClientError::Io(_) | RouterClientError::Timeout(_))
    }
}
