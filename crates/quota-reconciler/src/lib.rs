//! Per-subscriber quota, fair-use-policy and time-boost reconciliation
//! (§4.3): the highest-frequency loop in the system, walking every online
//! subscriber once per tick to update usage counters, cascade FUP rate
//! changes, and keep CDN-override queues in sync.

pub mod accumulate;
pub mod bypass;
pub mod cidr;
pub mod delta;
pub mod error;
pub mod fup;
pub mod notifications;
pub mod reconciler;
pub mod reset_check;
pub mod router_pool;
pub mod static_ip;
pub mod tick;

pub use error::ReconcilerError;
pub use reconciler::QuotaReconciler;
pub use tick::{ReconcilerState, TickClock, TickContext};
