//! Startup full sync plus a 5-minute auto-repair sweep (§4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ispctl_persistence::PersistenceGateway;
use ispctl_router_client::RouterClient;
use ispctl_utils::{HealthRegistry, HealthStatus};
use log::{info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::cidr::parse_target_pools;
use crate::error::PcqManagerError;
use crate::sync::{sync_cdn_pcq, PcqConfig};

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const ROUTER_TIMEOUT: Duration = Duration::from_secs(5);
const COMPONENT: &str = "pcq_manager";

pub struct PcqManager {
    gateway: Arc<dyn PersistenceGateway>,
    health: Option<Arc<HealthRegistry>>,
}

impl PcqManager {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway, health: None }
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    fn report_tick(&self, result: &Result<(), PcqManagerError>) {
        let Some(h) = &self.health else { return };
        match result {
            Ok(()) => h.report(COMPONENT, HealthStatus::Healthy, None),
            Err(e) => h.report(COMPONENT, HealthStatus::Degraded, Some(e.to_string())),
        }
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("pcq manager started");
        let initial = self.sync_all().await;
        if let Err(e) = &initial {
            warn!("initial pcq sync failed: {e}");
        }
        self.report_tick(&initial);

        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await; // consume the immediate first tick, already synced above

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.sync_all().await;
                    if let Err(e) = &result {
                        warn!("pcq repair sweep failed: {e}");
                    }
                    self.report_tick(&result);
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("pcq manager stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Syncs every `(cdn, nas, speed)` triple with `pcq_enabled=true`,
    /// grouped by NAS so each router gets exactly one connection per pass.
    pub async fn sync_all(&self) -> Result<(), PcqManagerError> {
        let entries = self.gateway.pcq_enabled_service_cdns().await?;

        let mut by_nas: HashMap<Uuid, Vec<(ispctl_core_model::ServiceCdn, Uuid)>> = HashMap::new();
        for (service_cdn, nas_id) in entries {
            by_nas.entry(nas_id).or_default().push((service_cdn, nas_id));
        }

        for (nas_id, service_cdns) in by_nas {
            let nas = match self.gateway.get_nas(nas_id).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("skipping pcq sync for nas {nas_id}: {e}");
                    continue;
                }
            };
            let mut router = match RouterClient::connect(&nas.api_addr(), ROUTER_TIMEOUT).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("could not reach nas {} for pcq sync: {e}", nas.name);
                    continue;
                }
            };
            if let Err(e) = router.login(&nas.api_username, &nas.api_password).await {
                warn!("pcq sync login failed on nas {}: {e}", nas.name);
                continue;
            }

            let mut seen = std::collections::HashSet::new();
            for (service_cdn, _) in &service_cdns {
                let key = (service_cdn.cdn_id, service_cdn.speed_limit_mbps);
                if !seen.insert(key) {
                    continue;
                }
                let cdn = match self.gateway.get_cdn(service_cdn.cdn_id).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("skipping cdn {}: {e}", service_cdn.cdn_id);
                        continue;
                    }
                };
                let target_cidrs = parse_target_pools(
                    service_cdn.pcq_target_pools.as_deref().unwrap_or(""),
                );
                let subnets = cdn.subnets().into_iter().map(str::to_string).collect();

                let mut config = PcqConfig::default_limits(
                    cdn.name.clone(),
                    service_cdn.speed_limit_mbps,
                    target_cidrs,
                    subnets,
                );
                if let Some(limit) = service_cdn.pcq_limit_kib {
                    config.pcq_limit_kib = limit;
                }
                if let Some(total) = service_cdn.pcq_total_limit_kib {
                    config.pcq_total_limit_kib = total;
                }

                if let Err(e) = sync_cdn_pcq(&mut router, &config).await {
                    if e.is_retryable() {
                        warn!("pcq sync for cdn {} on nas {} hit a retryable error, retrying once: {e}", cdn.name, nas.name);
                        if let Err(e2) = sync_cdn_pcq(&mut router, &config).await {
                            warn!("retry for cdn {} on nas {} also failed: {e2}", cdn.name, nas.name);
                        }
                    } else {
                        warn!("pcq sync failed for cdn {} on nas {} (not retryable): {e}", cdn.name, nas.name);
                    }
                }
            }
        }
        Ok(())
    }
}
