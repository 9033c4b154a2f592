//! Shared domain model for the ISP policy-to-device control plane
//!
//! This crate provides the typed records that flow between the persistence
//! gateway and the reconciliation loops: subscribers, service plans, edge
//! routers (NAS), CDN shaping configuration, global and per-subscriber
//! bandwidth rules, RADIUS reply rows, and HA cluster bookkeeping.
//!
//! It intentionally carries no I/O (no `sqlx`, no `reqwest`) — every other
//! crate in the workspace depends on this one for its vocabulary.

pub mod bandwidth_rule;
pub mod cdn;
pub mod cluster;
pub mod nas;
pub mod rate;
pub mod service;
pub mod subscriber;
pub mod time_window;

pub use bandwidth_rule::{BandwidthRule, RuleType, SubscriberBandwidthRule};
pub use cdn::{Cdn, ServiceCdn};
pub use cluster::{ClusterConfig, ClusterEvent, ClusterEventKind, ClusterNode, ClusterRole};
pub use nas::Nas;
pub use rate::{parse_rate_limit, RateLimit};
pub use service::{FupTier, Service, TimeWindow};
pub use subscriber::{RadReply, Subscriber};
