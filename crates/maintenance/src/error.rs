//! Error types for the maintenance loops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("persistence error: {0}")]
    Persistence(#[from] ispctl_persistence::PersistenceError),
}

impl MaintenanceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MaintenanceError::Persistence(e) => e.is_retryable(),
        }
    }
}
