//! The deterministic rate-change cascade: router-API queue set → CoA →
//! dynamic-queue removal (so the router recreates it from RADIUS) — and
//! never a forced disconnect (§4.3.i/j, §8 scenario 3).

use ispctl_coa_client::CoAClient;
use ispctl_core_model::{Nas, RadReply, RateLimit};
use ispctl_persistence::PersistenceGateway;
use ispctl_router_client::{RouterClientError, RouterOps};
use log::warn;

use crate::error::CascadeError;

/// Which leg of the cascade actually changed the live session's rate.
/// `None` means every in-session leg failed; the subscriber keeps their
/// current speed until reconnect, at which point RadReply (already
/// written) takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeLeg {
    RouterApi,
    Coa,
    QueueRecreateOnNextReconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub leg: Option<CascadeLeg>,
}

/// Writes RadReply first (so the next reconnect is always correct even
/// if every following leg fails), then attempts the in-session legs in
/// order.
pub async fn apply_rate_change(
    persistence: &dyn PersistenceGateway,
    router: &mut dyn RouterOps,
    coa: &CoAClient,
    nas: &Nas,
    username: &str,
    ip: &str,
    session_id: &str,
    rate: RateLimit,
) -> Result<CascadeOutcome, CascadeError> {
    persistence
        .upsert_rate_limit_reply(&RadReply::rate_limit(username, rate.to_string()))
        .await?;

    match router.update_user_rate_limit_with_ip(username, ip, rate).await {
        Ok(()) => Ok(CascadeOutcome {
            leg: Some(CascadeLeg::RouterApi),
        }),
        Err(RouterClientError::DynamicQueueConflict { .. }) => {
            match coa.update_rate_limit(nas, username, session_id, rate).await {
                Ok(()) => Ok(CascadeOutcome {
                    leg: Some(CascadeLeg::Coa),
                }),
                Err(e) => {
                    warn!("CoA rate update failed for {username}, recreating dynamic queue: {e}");
                    match router.remove_dynamic_queue_for_recreation(username).await {
                        Ok(()) => Ok(CascadeOutcome {
                            leg: Some(CascadeLeg::QueueRecreateOnNextReconnect),
                        }),
                        Err(e) => {
                            warn!("cascade exhausted for {username}, keeping current session rate: {e}");
                            Ok(CascadeOutcome { leg: None })
                        }
                    }
                }
            }
        }
        Err(e) => {
            warn!("router-API rate update failed for {username}, keeping current session rate: {e}");
            Ok(CascadeOutcome { leg: None })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ispctl_core_model::Subscriber;
    use ispctl_persistence::{PersistenceError, PersistenceResult, SubscriberSessionPatch};
    use ispctl_router_client::Session;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeRouter {
        update_result: Result<(), RouterClientError>,
        remove_called: Mutex<bool>,
    }

    #[async_trait]
    impl RouterOps for FakeRouter {
        async fn get_active_session(&mut self, _username: &str) -> Result<Session, RouterClientError> {
            unimplemented!()
        }
        async fn update_user_rate_limit_with_ip(
            &mut self,
            _username: &str,
            _ip: &str,
            _rate: RateLimit,
        ) -> Result<(), RouterClientError> {
            match &self.update_result {
                Ok(()) => Ok(()),
                Err(RouterClientError::DynamicQueueConflict { username }) => {
                    Err(RouterClientError::DynamicQueueConflict {
                        username: username.clone(),
                    })
                }
                Err(_) => Err(RouterClientError::Protocol("boom".into())),
            }
        }
        async fn remove_dynamic_queue_for_recreation(
            &mut self,
            _username: &str,
        ) -> Result<(), RouterClientError> {
            *self.remove_called.lock().unwrap() = true;
            Ok(())
        }
        async fn disconnect_user(&mut self, _username: &str) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn create_pcq_queue_type(
            &mut self,
            _name: &str,
            _speed_mbps: u32,
            _limit_kib: u32,
            _total_limit_kib: u32,
        ) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn create_cdn_mangle_rule(&mut self, _cdn_name: &str) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn create_pcq_simple_queue(
            &mut self,
            _cdn_name: &str,
            _speed_mbps: u32,
            _target_cidr: &str,
        ) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn sync_address_list(
            &mut self,
            _list_name: &str,
            _entries: &[String],
            _comment: &str,
        ) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn ping(&mut self, _address: &str) -> Result<bool, RouterClientError> {
            unimplemented!()
        }
        async fn remove_pcq_setup(
            &mut self,
            _cdn_name: &str,
            _speed_mbps: u32,
        ) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn firewall_connections(
            &mut self,
            _subscriber_ip: &str,
        ) -> Result<Vec<ispctl_router_client::session::FirewallConnection>, RouterClientError> {
            unimplemented!()
        }
        async fn create_subscriber_cdn_override(
            &mut self,
            _username: &str,
            _cdn_name: &str,
            _speed_mbps: u32,
            _target_ip: &str,
        ) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn remove_subscriber_cdn_override(&mut self, _username: &str) -> Result<(), RouterClientError> {
            unimplemented!()
        }
    }

    struct FakeGateway {
        replies: Mutex<HashMap<String, String>>,
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
        async fn get_service(&self, _id: Uuid) -> PersistenceResult<ispctl_core_model::Service> {
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
        async fn upsert_rate_limit_reply(&self, reply: &RadReply) -> PersistenceResult<()> {
            self.replies
                .lock()
                .unwrap()
                .insert(reply.username.clone(), reply.value.clone());
            Ok(())
        }
        async fn enabled_bandwidth_rules(
            &self,
        ) -> PersistenceResult<Vec<ispctl_core_model::BandwidthRule>> {
            unimplemented!()
        }
        async fn active_subscriber_bandwidth_rule(
            &self,
            _subscriber_id: Uuid,
            _rule_type: ispctl_core_model::RuleType,
        ) -> PersistenceResult<Option<ispctl_core_model::SubscriberBandwidthRule>> {
            unimplemented!()
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

    fn nas() -> Nas {
        Nas {
            id: Uuid::new_v4(),
            name: "edge-1".into(),
            ip_address: "10.0.0.1".into(),
            api_port: 8728,
            auth_port: 1812,
            acct_port: 1813,
            coa_port: 1700,
            api_username: "admin".into(),
            api_password: "".into(),
            radius_shared_secret: "secret".into(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn router_api_success_is_the_happy_path() {
        let mut router = FakeRouter {
            update_result: Ok(()),
            remove_called: Mutex::new(false),
        };
        let gateway = FakeGateway {
            replies: Mutex::new(HashMap::new()),
        };
        let coa = CoAClient::new(None);

        let outcome = apply_rate_change(
            &gateway,
            &mut router,
            &coa,
            &nas(),
            "alice",
            "10.0.0.5",
            "sess-1",
            RateLimit::new(500, 500),
        )
        .await
        .unwrap();

        assert_eq!(outcome.leg, Some(CascadeLeg::RouterApi));
        assert_eq!(
            gateway.replies.lock().unwrap().get("alice").unwrap(),
            "500k/500k"
        );
    }

    #[tokio::test]
    async fn radreply_is_written_even_when_every_leg_fails() {
        let mut router = FakeRouter {
            update_result: Err(RouterClientError::Protocol("unreachable".into())),
            remove_called: Mutex::new(false),
        };
        let gateway = FakeGateway {
            replies: Mutex::new(HashMap::new()),
        };
        let coa = CoAClient::new(None);

        let outcome = apply_rate_change(
            &gateway,
            &mut router,
            &coa,
            &nas(),
            "alice",
            "10.0.0.5",
            "sess-1",
            RateLimit::new(500, 500),
        )
        .await
        .unwrap();

        assert_eq!(outcome.leg, None);
        assert!(gateway.replies.lock().unwrap().contains_key("alice"));
    }
}
