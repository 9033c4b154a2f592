//! Error types for the quota reconciler.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("persistence error: {0}")]
    Persistence(#[from] ispctl_persistence::PersistenceError),

    #[error("router error: {0}")]
    Router(#[from] ispctl_router_client::RouterClientError),

    #[error("cascade error: {0}")]
    Cascade(#[from] ispctl_rate_cascade::CascadeError),
}

impl ReconcilerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcilerError::Persistence(e) => e.is_retryable(),
            ReconcilerError::Router(e) => e.is_retryable(),
            ReconcilerError::Cascade(e) => e.is_retryable(),
        }
    }
}
