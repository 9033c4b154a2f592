//! Shared rate-change cascade used by the quota reconciler (§4.3) and the
//! bandwidth-rule scheduler (§4.4): both need the identical
//! router-API → CoA → dynamic-queue-recreate fallback chain.

pub mod cascade;
pub mod error;

pub use cascade::{apply_rate_change, CascadeLeg, CascadeOutcome};
pub use error::CascadeError;
