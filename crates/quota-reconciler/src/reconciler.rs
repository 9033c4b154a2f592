//! Top-level per-tick orchestration (§4.3 step 1): one NAS connection per
//! router, a static-IP sweep ahead of the main pass, then one
//! `reconcile_subscriber` call per online subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use ispctl_coa_client::CoAClient;
use ispctl_notification::{DedupingDispatcher, NotificationSink};
use ispctl_persistence::PersistenceGateway;
use ispctl_router_client::RouterClient;
use ispctl_utils::{HealthRegistry, HealthStatus};
use log::{info, warn};
use tokio::sync::watch;

use crate::error::ReconcilerError;
use crate::static_ip::sweep_static_ip_conflicts;
use crate::tick::{reconcile_subscriber, ReconcilerState, TickClock, TickContext};

const COMPONENT: &str = "quota_reconciler";

pub struct QuotaReconciler<S: NotificationSink> {
    gateway: Arc<dyn PersistenceGateway>,
    coa: Arc<CoAClient>,
    notifications: Arc<DedupingDispatcher<S>>,
    state: ReconcilerState,
    tick_interval: Duration,
    reset_hour: u8,
    reset_minute: u8,
    tz: Tz,
    in_flight: AtomicBool,
    health: Option<Arc<HealthRegistry>>,
}

impl<S: NotificationSink> QuotaReconciler<S> {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        coa: Arc<CoAClient>,
        notifications: Arc<DedupingDispatcher<S>>,
        tick_interval: Duration,
        reset_hour: u8,
        reset_minute: u8,
        tz: Tz,
    ) -> Self {
        Self {
            gateway,
            coa,
            notifications,
            state: ReconcilerState::default(),
            tick_interval,
            reset_hour,
            reset_minute,
            tz,
            in_flight: AtomicBool::new(false),
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        info!("quota reconciler started");
        let mut ticker = tokio::time::interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    this.tick_guarded().await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("quota reconciler stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Skips the tick entirely if the previous one is still running,
    /// rather than queueing up concurrent passes over the same NAS
    /// connections.
    async fn tick_guarded(&self) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("quota reconciler tick skipped: previous tick still running");
            return;
        }
        match self.tick().await {
            Ok(()) => {
                if let Some(h) = &self.health {
                    h.report(COMPONENT, HealthStatus::Healthy, None);
                }
            }
            Err(e) => {
                warn!("quota reconciler tick failed: {e}");
                if let Some(h) = &self.health {
                    h.report(COMPONENT, HealthStatus::Degraded, Some(e.to_string()));
                }
            }
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn tick(&self) -> Result<(), ReconcilerError> {
        let online = self.gateway.online_subscribers_grouped_by_nas().await?;
        let mut routers: HashMap<uuid::Uuid, RouterClient> = HashMap::new();

        sweep_static_ip_conflicts(self.gateway.as_ref(), &self.coa, &online, &mut routers).await?;

        let active_global_rules: Vec<_> = self
            .gateway
            .enabled_bandwidth_rules()
            .await?
            .into_iter()
            .filter(|r| r.auto_apply)
            .collect();
        let now = Utc::now();
        let clock = TickClock {
            instant: now,
            tz: self.tz,
            reset_hour: self.reset_hour,
            reset_minute: self.reset_minute,
        };

        for (nas_id, subscribers) in &online {
            let nas = self.gateway.get_nas(*nas_id).await?;
            let router = match crate::router_pool::get_or_connect(*nas_id, self.gateway.as_ref(), &mut routers).await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping NAS {}: {e}", nas.name);
                    continue;
                }
            };

            let ctx = TickContext {
                gateway: self.gateway.as_ref(),
                coa: &self.coa,
                nas: &nas,
                clock,
                active_global_rules: &active_global_rules,
                state: &self.state,
            };

            for subscriber in subscribers {
                if let Err(e) = reconcile_subscriber(&ctx, router, &self.notifications, subscriber).await {
                    if e.is_retryable() {
                        warn!("reconcile for {} hit a retryable error, retrying once this tick: {e}", subscriber.username);
                        if let Err(e2) = reconcile_subscriber(&ctx, router, &self.notifications, subscriber).await {
                            warn!("retry for {} also failed, skipping until next tick: {e2}", subscriber.username);
                        }
                    } else {
                        warn!("reconcile failed for {} (not retryable): {e}", subscriber.username);
                    }
                }
            }
        }

        Ok(())
    }
}
