//! The idempotent PCQ setup/teardown primitive (§4.5).

use ispctl_router_client::RouterOps;

use crate::error::PcqManagerError;

pub struct PcqConfig {
    pub cdn_name: String,
    pub speed_mbps: u32,
    pub pcq_limit_kib: u32,
    pub pcq_total_limit_kib: u32,
    pub target_cidrs: Vec<String>,
    pub subnets: Vec<String>,
}

const DEFAULT_PCQ_LIMIT_KIB: u32 = 50;
const DEFAULT_PCQ_TOTAL_LIMIT_KIB: u32 = 2000;

impl PcqConfig {
    pub fn default_limits(
        cdn_name: String,
        speed_mbps: u32,
        target_cidrs: Vec<String>,
        subnets: Vec<String>,
    ) -> Self {
        Self {
            cdn_name,
            speed_mbps,
            pcq_limit_kib: DEFAULT_PCQ_LIMIT_KIB,
            pcq_total_limit_kib: DEFAULT_PCQ_TOTAL_LIMIT_KIB,
            target_cidrs,
            subnets,
        }
    }
}

/// `SyncCDNPCQSetup`: address-list → queue type → mangle → simple queue,
/// every step upsert-by-delete-then-add so repeated calls are no-ops on
/// the router's actual state.
pub async fn sync_cdn_pcq(
    router: &mut dyn RouterOps,
    config: &PcqConfig,
) -> Result<(), PcqManagerError> {
    let list_name = format!("CDN-{}", config.cdn_name);
    let comment = format!("proxpanel CDN {} subnet", config.cdn_name);
    router
        .sync_address_list(&list_name, &config.subnets, &comment)
        .await?;

    router
        .create_pcq_queue_type(
            &config.cdn_name,
            config.speed_mbps,
            config.pcq_limit_kib,
            config.pcq_total_limit_kib,
        )
        .await?;

    router.create_cdn_mangle_rule(&config.cdn_name).await?;

    let target = config.target_cidrs.join(",");
    router
        .create_pcq_simple_queue(&config.cdn_name, config.speed_mbps, &target)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ispctl_core_model::RateLimit;
    use ispctl_router_client::{RouterClientError, Session};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRouter {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RouterOps for RecordingRouter {
        async fn get_active_session(&mut self, _username: &str) -> Result<Session, RouterClientError> {
            unimplemented!()
        }
        async fn update_user_rate_limit_with_ip(
            &mut self,
            _username: &str,
            _ip: &str,
            _rate: RateLimit,
        ) -> Result<(), RouterClientError> {
            unimplemented!()
        }
        async fn remove_dynamic_queue_for_recreation(
            &mut self,
            _username: &str,
        ) -> Result<(), RouterClientError> {
            unimplemented!()
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
            self.calls.lock().unwrap().push("queue_type".into());
            Ok(())
        }
        async fn create_cdn_mangle_rule(&mut self, _cdn_name: &str) -> Result<(), RouterClientError> {
            self.calls.lock().unwrap().push("mangle".into());
            Ok(())
        }
        async fn create_pcq_simple_queue(
            &mut self,
            _cdn_name: &str,
            _speed_mbps: u32,
            _target_cidr: &str,
        ) -> Result<(), RouterClientError> {
            self.calls.lock().unwrap().push("simple_queue".into());
            Ok(())
        }
        async fn sync_address_list(
            &mut self,
            _list_name: &str,
            _entries: &[String],
            _comment: &str,
        ) -> Result<(), RouterClientError> {
            self.calls.lock().unwrap().push("address_list".into());
            Ok(())
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

    #[tokio::test]
    async fn sync_runs_every_step_in_order() {
        let mut router = RecordingRouter::default();
        let config = PcqConfig::default_limits(
            "netflix".into(),
            50,
            vec!["10.0.0.0/24".into()],
            vec!["10.0.0.0/24".into()],
        );
        sync_cdn_pcq(&mut router, &config).await.unwrap();
        assert_eq!(
            *router.calls.lock().unwrap(),
            vec!["address_list", "queue_type", "mangle", "simple_queue"]
        );
    }
}
