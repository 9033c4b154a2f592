//! HA cluster coordination (§4.8): role detection overridden by the
//! database's own recovery state, a main-side heartbeat-staleness monitor,
//! and a secondary-side heartbeat-and-self-update loop.

pub mod docker;
pub mod error;
pub mod heartbeat_server;
pub mod main_loop;
pub mod role;
pub mod secondary_loop;
pub mod stats;
pub mod update;

pub use error::ClusterAgentError;
pub use main_loop::MainLoop;
pub use role::{detect_role, LocalIdentity};
pub use secondary_loop::SecondaryLoop;
pub use update::UpdateConfig;

/// This build's version string, compared against the value a heartbeat
/// peer reports to decide whether a self-update is due.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
