//! Error types for the notification sink adapter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("notification payload error: {0}")]
    Payload(String),
}

impl NotificationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotificationError::SinkUnavailable(_))
    }
}
