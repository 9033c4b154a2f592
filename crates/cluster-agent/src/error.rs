//! Error types for the cluster agent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterAgentError {
    #[error("persistence error: {0}")]
    Persistence(#[from] ispctl_persistence::PersistenceError),

    #[error("cluster HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("update package error: {0}")]
    Update(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterAgentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClusterAgentError::Persistence(e) => e.is_retryable(),
            ClusterAgentError::Http(_) => true,
            ClusterAgentError::Update(_) => false,
            ClusterAgentError::Io(_) => false,
        }
    }
}
