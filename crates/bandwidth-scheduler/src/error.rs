//! Error types for the bandwidth-rule scheduler.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("persistence error: {0}")]
    Persistence(#[from] ispctl_persistence::PersistenceError),

    #[error("router error: {0}")]
    Router(#[from] ispctl_router_client::RouterClientError),

    #[error("cascade error: {0}")]
    Cascade(#[from] ispctl_rate_cascade::CascadeError),
}

impl SchedulerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::Persistence(e) => e.is_retryable(),
            SchedulerError::Router(e) => e.is_retryable(),
            SchedulerError::Cascade(e) => e.is_retryable(),
        }
    }
}
