//! Global time-window bandwidth-rule scheduler (§4.4).

pub mod base_rate;
pub mod error;
pub mod scheduler;

pub use base_rate::base_rate_for_subscriber;
pub use error::SchedulerError;
pub use scheduler::BandwidthRuleScheduler;
