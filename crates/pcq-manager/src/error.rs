//! Error types for the PCQ manager.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcqManagerError {
    #[error("persistence error: {0}")]
    Persistence(#[from] ispctl_persistence::PersistenceError),

    #[error("router error: {0}")]
    Router(#[from] ispctl_router_client::RouterClientError),
}

impl PcqManagerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PcqManagerError::Persistence(e) => e.is_retryable(),
            PcqManagerError::Router(e) => e.is_retryable(),
        }
    }
}
