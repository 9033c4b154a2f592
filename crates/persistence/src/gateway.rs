//! The typed persistence contract every reconciliation loop depends on.
//! No SQL leaks past this boundary (§6).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ispctl_core_model::{
    BandwidthRule, Cdn, ClusterConfig, ClusterEvent, ClusterNode, Nas, RadReply, RuleType,
    Service, ServiceCdn, Subscriber, SubscriberBandwidthRule,
};
use uuid::Uuid;

use crate::error::PersistenceResult;

/// The subset of a subscriber row the reconciler is allowed to mutate in
/// one atomic write (§3's lifecycle note, §4.3.h).
#[derive(Debug, Clone, Default)]
pub struct SubscriberSessionPatch {
    pub is_online: Option<bool>,
    pub ip_address: Option<Option<String>>,
    pub last_session_download: Option<i64>,
    pub last_session_upload: Option<i64>,
    pub daily_download_used: Option<i64>,
    pub daily_upload_used: Option<i64>,
    pub monthly_download_used: Option<i64>,
    pub monthly_upload_used: Option<i64>,
    pub last_daily_reset: Option<chrono::DateTime<chrono::Utc>>,
    pub last_monthly_reset: Option<chrono::DateTime<chrono::Utc>>,
    pub last_quota_sync: Option<chrono::DateTime<chrono::Utc>>,
    pub last_bypass_cdn_bytes: Option<i64>,
    pub fup_level: Option<u8>,
    pub monthly_fup_level: Option<u8>,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn online_subscribers_grouped_by_nas(
        &self,
    ) -> PersistenceResult<HashMap<Uuid, Vec<Subscriber>>>;
    async fn get_subscriber(&self, id: Uuid) -> PersistenceResult<Subscriber>;
    async fn get_subscriber_by_username(&self, username: &str) -> PersistenceResult<Subscriber>;
    async fn static_ip_owners(&self) -> PersistenceResult<HashMap<String, Uuid>>;
    async fn apply_subscriber_patch(
        &self,
        id: Uuid,
        patch: SubscriberSessionPatch,
    ) -> PersistenceResult<()>;
    async fn snapshot_and_reset_daily_usage(&self, yesterday: NaiveDate) -> PersistenceResult<()>;

    async fn get_service(&self, id: Uuid) -> PersistenceResult<Service>;
    async fn get_nas(&self, id: Uuid) -> PersistenceResult<Nas>;
    async fn active_nas_list(&self) -> PersistenceResult<Vec<Nas>>;
    async fn service_cdns_for_service(&self, service_id: Uuid) -> PersistenceResult<Vec<ServiceCdn>>;
    async fn get_cdn(&self, id: Uuid) -> PersistenceResult<Cdn>;
    async fn pcq_enabled_service_cdns(&self) -> PersistenceResult<Vec<(ServiceCdn, Uuid)>>;

    async fn upsert_rate_limit_reply(&self, reply: &RadReply) -> PersistenceResult<()>;

    async fn enabled_bandwidth_rules(&self) -> PersistenceResult<Vec<BandwidthRule>>;
    async fn active_subscriber_bandwidth_rule(
        &self,
        subscriber_id: Uuid,
        rule_type: RuleType,
    ) -> PersistenceResult<Option<SubscriberBandwidthRule>>;

    async fn close_stale_radacct_sessions(&self, threshold: Duration) -> PersistenceResult<u64>;
    async fn subscribers_without_live_session(
        &self,
        staleness: Duration,
    ) -> PersistenceResult<Vec<Uuid>>;

    async fn get_cluster_config(&self) -> PersistenceResult<ClusterConfig>;
    async fn cluster_nodes(&self) -> PersistenceResult<Vec<ClusterNode>>;
    async fn upsert_cluster_node_heartbeat(&self, node: &ClusterNode) -> PersistenceResult<()>;
    async fn record_cluster_event(&self, event: &ClusterEvent) -> PersistenceResult<()>;
    /// `SELECT pg_is_in_recovery()` — true when this database is a
    /// streaming replica, the signal that forces this node's role to
    /// secondary regardless of what `cluster_config` says (§4.8).
    async fn is_in_recovery(&self) -> PersistenceResult<bool>;

    async fn get_preference(&self, key: &str) -> PersistenceResult<Option<String>>;
}
