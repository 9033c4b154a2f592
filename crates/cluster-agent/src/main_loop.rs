//! The main node's view of the cluster (§4.8): every 30s, mark any node
//! that hasn't heartbeated in 2 minutes offline and record the event.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ispctl_core_model::{ClusterEvent, ClusterEventKind};
use ispctl_persistence::PersistenceGateway;
use ispctl_utils::{HealthRegistry, HealthStatus};
use log::{info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::ClusterAgentError;

const TICK: Duration = Duration::from_secs(30);
const COMPONENT: &str = "cluster_main_loop";

pub struct MainLoop {
    gateway: Arc<dyn PersistenceGateway>,
    cluster_id: Uuid,
    self_hardware_id: String,
    health: Option<Arc<HealthRegistry>>,
}

impl MainLoop {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, cluster_id: Uuid, self_hardware_id: String) -> Self {
        Self {
            gateway,
            cluster_id,
            self_hardware_id,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("cluster main loop started");
        let mut ticker = tokio::time::interval(TICK);

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
                            warn!("cluster main loop tick failed: {e}");
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Degraded, Some(e.to_string()));
                            }
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("cluster main loop stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), ClusterAgentError> {
        let now = Utc::now();
        let nodes = self.gateway.cluster_nodes().await?;

        for mut node in nodes {
            if node.hardware_id == self.self_hardware_id {
                continue;
            }
            if node.is_online && node.is_stale(now) {
                warn!("node {} missed its last two heartbeats, marking offline", node.name);
                node.is_online = false;
                self.gateway.upsert_cluster_node_heartbeat(&node).await?;
                self.gateway
                    .record_cluster_event(
                        &ClusterEvent::new(self.cluster_id, node.hardware_id.clone(), ClusterEventKind::NodeOffline)
                            .with_detail(format!("last heartbeat: {:?}", node.last_heartbeat)),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}
