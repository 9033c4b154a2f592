//! Error type for the rate-change cascade. Only the RadReply write can
//! fail the whole operation; every in-session leg failure is absorbed and
//! reported through [`crate::CascadeOutcome`] instead (§4.3, §7, §8).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("failed to persist RadReply before attempting the cascade: {0}")]
    Persistence(#[from] ispctl_persistence::PersistenceError),
}

impl CascadeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CascadeError::Persistence(e) => e.is_retryable(),
        }
    }
}
