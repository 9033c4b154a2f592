//! The shared base-rate priority used both when a global rule activates
//! and when it deactivates and the subscriber must be restored: an active
//! per-subscriber internet rule wins, then the current FUP tier, then the
//! service's normal speed (§4.3.j, §4.4).

use ispctl_core_model::{RateLimit, RuleType, Service, Subscriber};
use ispctl_persistence::PersistenceGateway;

pub async fn base_rate_for_subscriber(
    gateway: &dyn PersistenceGateway,
    subscriber: &Subscriber,
    service: &Service,
) -> Result<RateLimit, ispctl_persistence::PersistenceError> {
    if let Some(rule) = gateway
        .active_subscriber_bandwidth_rule(subscriber.id, RuleType::Internet)
        .await?
    {
        return Ok(RateLimit::new(rule.upload_speed_kbps, rule.download_speed_kbps));
    }

    let level = subscriber.effective_fup_level();
    if level > 0 {
        let tiers = if subscriber.fup_level >= subscriber.monthly_fup_level {
            &service.daily_fup
        } else {
            &service.monthly_fup
        };
        if let Some((upload, download)) = Service::fup_speed_kbps(tiers, level) {
            return Ok(RateLimit::new(upload, download));
        }
    }

    Ok(RateLimit::new(
        service.upload_speed_kbps,
        service.download_speed_kbps,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use ispctl_core_model::{FupTier, Nas};
    use ispctl_persistence::{PersistenceError, PersistenceResult, SubscriberSessionPatch};
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FakeGateway {
        rule: Option<ispctl_core_model::SubscriberBandwidthRule>,
    }

    #[async_trait]
    impl PersistenceGateway for FakeGateway {
        async fn online_subscribers_grouped_by_nas(
            &self,
        ) -> PersistenceResult<HashMap<Uuid, Vec<Subscriber>>> {
            unimplemented!()
        }
        async fn get_subscriber(&self, _id: Uuid) -> PersistenceResult<Subscriber> {
            unimplemented!()
        }
        async fn get_subscriber_by_username(&self, _username: &str) -> PersistenceResult<Subscriber> {
            unimplemented!()
        }
        async fn static_ip_owners(&self) -> PersistenceResult<HashMap<String, Uuid>> {
            unimplemented!()
        }
        async fn apply_subscriber_patch(
            &self,
            _id: Uuid,
            _patch: SubscriberSessionPatch,
        ) -> PersistenceResult<()> {
            unimplemented!()
        }
        async fn snapshot_and_reset_daily_usage(
            &self,
            _yesterday: chrono::NaiveDate,
        ) -> PersistenceResult<()> {
            unimplemented!()
        }
        async fn get_service(&self, _id: Uuid) -> PersistenceResult<Service> {
            unimplemented!()
        }
        async fn get_nas(&self, _id: Uuid) -> PersistenceResult<Nas> {
            unimplemented!()
        }
        async fn active_nas_list(&self) -> PersistenceResult<Vec<Nas>> {
            unimplemented!()
        }
        async fn service_cdns_for_service(
            &self,
            _service_id: Uuid,
        ) -> PersistenceResult<Vec<ispctl_core_model::ServiceCdn>> {
            unimplemented!()
        }
        async fn get_cdn(&self, _id: Uuid) -> PersistenceResult<ispctl_core_model::Cdn> {
            unimplemented!()
        }
        async fn pcq_enabled_service_cdns(
            &self,
        ) -> PersistenceResult<Vec<(ispctl_core_model::ServiceCdn, Uuid)>> {
            unimplemented!()
        }
        async fn upsert_rate_limit_reply(
            &self,
            _reply: &ispctl_core_model::RadReply,
        ) -> PersistenceResult<()> {
            unimplemented!()
        }
        async fn enabled_bandwidth_rules(
            &self,
        ) -> PersistenceResult<Vec<ispctl_core_model::BandwidthRule>> {
            unimplemented!()
        }
        async fn active_subscriber_bandwidth_rule(
            &self,
            _subscriber_id: Uuid,
            _rule_type: RuleType,
        ) -> PersistenceResult<Option<ispctl_core_model::SubscriberBandwidthRule>> {
            Ok(self.rule.clone())
        }
        async fn close_stale_radacct_sessions(
            &self,
            _threshold: std::time::Duration,
        ) -> PersistenceResult<u64> {
            unimplemented!()
        }
        async fn subscribers_without_live_session(
            &self,
            _staleness: std::time::Duration,
        ) -> PersistenceResult<Vec<Uuid>> {
            unimplemented!()
        }
        async fn get_cluster_config(&self) -> PersistenceResult<ispctl_core_model::ClusterConfig> {
            unimplemented!()
        }
        async fn cluster_nodes(&self) -> PersistenceResult<Vec<ispctl_core_model::ClusterNode>> {
            unimplemented!()
        }
        async fn upsert_cluster_node_heartbeat(
            &self,
            _node: &ispctl_core_model::ClusterNode,
        ) -> PersistenceResult<()> {
            unimplemented!()
        }
        async fn record_cluster_event(
            &self,
            _event: &ispctl_core_model::ClusterEvent,
        ) -> PersistenceResult<()> {
            unimplemented!()
        }
        async fn is_in_recovery(&self) -> PersistenceResult<bool> {
            unimplemented!()
        }
        async fn get_preference(&self, _key: &str) -> PersistenceResult<Option<String>> {
            unimplemented!()
        }
    }

    fn subscriber() -> Subscriber {
        Subscriber {
            id: Uuid::new_v4(),
            username: "alice".into(),
            full_name: "".into(),
            email: "".into(),
            phone: "".into(),
            service_id: Uuid::new_v4(),
            price: 0.0,
            expiry_date: Utc::now(),
            reseller_id: None,
            is_online: true,
            ip_address: Some("10.0.0.5".into()),
            static_ip: None,
            nas_id: None,
            last_session_download: 0,
            last_session_upload: 0,
            daily_download_used: 0,
            daily_upload_used: 0,
            monthly_download_used: 0,
            monthly_upload_used: 0,
            last_daily_reset: None,
            last_monthly_reset: None,
            last_quota_sync: None,
            last_bypass_cdn_bytes: 0,
            fup_level: 0,
            monthly_fup_level: 0,
        }
    }

    fn service() -> Service {
        Service {
            id: Uuid::new_v4(),
            name: "Home-10M".into(),
            download_speed_kbps: 10_000,
            upload_speed_kbps: 10_000,
            daily_fup: [
                FupTier {
                    threshold_bytes: 1_000_000_000,
                    download_kbps: 2000,
                    upload_kbps: 2000,
                },
                FupTier::default(),
                FupTier::default(),
            ],
            monthly_fup: [FupTier::default(); 3],
            time_based_speed_enabled: false,
            time_from_hour: 0,
            time_from_minute: 0,
            time_to_hour: 0,
            time_to_minute: 0,
            time_download_ratio: 0,
            time_upload_ratio: 0,
            block_on_daily_quota_exceeded: false,
            block_on_monthly_quota_exceeded: false,
        }
    }

    #[tokio::test]
    async fn subscriber_rule_wins_over_everything() {
        let gateway = FakeGateway {
            rule: Some(ispctl_core_model::SubscriberBandwidthRule {
                id: Uuid::new_v4(),
                subscriber_id: Uuid::new_v4(),
                rule_type: RuleType::Internet,
                cdn_id: None,
                download_speed_kbps: 999,
                upload_speed_kbps: 888,
                start_hour: 0,
                start_minute: 0,
                end_hour: 23,
                end_minute: 59,
                enabled: true,
                priority: 0,
            }),
        };
        let mut sub = subscriber();
        sub.fup_level = 1;
        let rate = base_rate_for_subscriber(&gateway, &sub, &service()).await.unwrap();
        assert_eq!(rate, RateLimit::new(888, 999));
    }

    #[tokio::test]
    async fn fup_tier_wins_over_service_normal_speed() {
        let gateway = FakeGateway { rule: None };
        let mut sub = subscriber();
        sub.fup_level = 1;
        let rate = base_rate_for_subscriber(&gateway, &sub, &service()).await.unwrap();
        assert_eq!(rate, RateLimit::new(2000, 2000));
    }

    #[tokio::test]
    async fn falls_back_to_service_normal_speed() {
        let gateway = FakeGateway { rule: None };
        let rate = base_rate_for_subscriber(&gateway, &subscriber(), &service())
            .await
            .unwrap();
        assert_eq!(rate, RateLimit::new(10_000, 10_000));
    }
}
