//! Closes abandoned radacct sessions and marks subscribers offline once
//! the reconciler itself hasn't seen them recently either (§4.7).

use std::sync::Arc;
use std::time::Duration;

use ispctl_persistence::{PersistenceGateway, SubscriberSessionPatch};
use ispctl_utils::{HealthRegistry, HealthStatus};
use log::{error, info, warn};
use tokio::sync::watch;

use crate::error::MaintenanceError;

const TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);
const STALE_RADACCT_THRESHOLD: Duration = Duration::from_secs(5 * 60);
/// Condition (a) in §4.7: prevents fighting QuotaReconciler, which
/// refreshes `last_quota_sync` every tick (default 30s, far under this).
const NO_RECENT_SYNC_THRESHOLD: Duration = Duration::from_secs(5 * 60);
const COMPONENT: &str = "stale_session_reaper";

pub struct StaleSessionReaper {
    gateway: Arc<dyn PersistenceGateway>,
    health: Option<Arc<HealthRegistry>>,
}

impl StaleSessionReaper {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway, health: None }
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("stale session reaper started");
        let mut ticker = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(()) => {
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Healthy, None);
                            }
                        }
                        Err(e) => {
                            error!("stale session reap failed: {e}");
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Degraded, Some(e.to_string()));
                            }
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("stale session reaper stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), MaintenanceError> {
        let closed = self
            .gateway
            .close_stale_radacct_sessions(STALE_RADACCT_THRESHOLD)
            .await?;
        if closed > 0 {
            info!("closed {closed} stale radacct session(s)");
        }

        let stale_subscribers = self
            .gateway
            .subscribers_without_live_session(NO_RECENT_SYNC_THRESHOLD)
            .await?;

        for id in &stale_subscribers {
            if let Err(e) = self
                .gateway
                .apply_subscriber_patch(
                    *id,
                    SubscriberSessionPatch {
                        is_online: Some(false),
                        ..Default::default()
                    },
                )
                .await
            {
                warn!("failed to mark subscriber {id} offline: {e}");
            }
        }

        if !stale_subscribers.is_empty() {
            info!("marked {} subscriber(s) offline", stale_subscribers.len());
        }
        Ok(())
    }
}
