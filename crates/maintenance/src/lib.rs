//! Background housekeeping loops: daily usage snapshot/reset (§4.6) and
//! stale-session reaping (§4.7).

pub mod daily_reset;
pub mod error;
pub mod stale_session_reaper;

pub use daily_reset::DailyResetWorker;
pub use error::MaintenanceError;
pub use stale_session_reaper::StaleSessionReaper;
