//! Error types for the CoA/Disconnect dispatcher.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoAClientError {
    #[error("UDP I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response from NAS within {0:?}")]
    Timeout(std::time::Duration),

    #[error("NAS rejected the request (NAK)")]
    Rejected,

    #[error("external RADIUS client tool failed: {0}")]
    ExternalToolFailed(String),

    #[error("malformed RADIUS packet: {0}")]
    Protocol(String),
}

impl CoAClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoAClientError::Io(_) | CoAClientError::Timeout(_))
    }
}
