//! HA cluster bookkeeping: configuration, per-node heartbeat state and the
//! audit-trail event log (§4.8, §11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRole {
    Main,
    Secondary,
    Standalone,
}

/// Cluster-wide identity: shared secret plus this node's role. A single
/// row per cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster_id: Uuid,
    pub cluster_secret: String,
    pub role: ClusterRole,
}

/// One known node's last-observed state, as reported by its own heartbeat
/// or (for `main`) collected from the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub hardware_id: String,
    pub name: String,
    pub ip_address: String,
    pub role: ClusterRole,
    pub version: String,

    pub last_heartbeat: Option<DateTime<Utc>>,
    pub is_online: bool,

    pub db_replication_lag_sec: Option<f64>,
    pub cpu_percent: Option<f32>,
    pub mem_percent: Option<f32>,
    pub disk_percent: Option<f32>,
    pub subscriber_count: Option<i64>,
}

impl ClusterNode {
    /// Offline after 2 missed 30s heartbeat intervals (§4.8 main loop).
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_heartbeat {
            Some(t) => now - t > chrono::Duration::minutes(2),
            None => true,
        }
    }
}

/// A persisted cluster-lifecycle event, giving operators an audit trail
/// for the auto-update state machine and node availability changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterEventKind {
    NodeOffline,
    UpdatePending,
    UpdateApplied,
    UpdateCanceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub hardware_id: String,
    pub kind: ClusterEventKind,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ClusterEvent {
    pub fn new(cluster_id: Uuid, hardware_id: impl Into<String>, kind: ClusterEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster_id,
            hardware_id: hardware_id.into(),
            kind,
            detail: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_after_two_missed_intervals() {
        let mut node = sample_node();
        node.last_heartbeat = Some(Utc::now() - chrono::Duration::minutes(3));
        assert!(node.is_stale(Utc::now()));
    }

    #[test]
    fn fresh_heartbeat_not_stale() {
        let mut node = sample_node();
        node.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(30));
        assert!(!node.is_stale(Utc::now()));
    }

    #[test]
    fn never_heartbeated_is_stale() {
        let node = sample_node();
        assert!(node.is_stale(Utc::now()));
    }

    fn sample_node() -> ClusterNode {
        ClusterNode {
            hardware_id: "hw-1".into(),
            name: "node-a".into(),
            ip_address: "10.0.0.1".into(),
            role: ClusterRole::Secondary,
            version: "1.4.2".into(),
            last_heartbeat: None,
            is_online: true,
            db_replication_lag_sec: None,
            cpu_percent: None,
            mem_percent: None,
            disk_percent: None,
            subscriber_count: None,
        }
    }
}
