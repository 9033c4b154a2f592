//! The secondary node's heartbeat loop (§4.8): POST status to main every
//! 30s, track a version mismatch across a 5-minute stability window, and
//! hand off to the updater once it's held stable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ispctl_core_model::{ClusterConfig, ClusterEvent, ClusterEventKind};
use ispctl_persistence::PersistenceGateway;
use ispctl_utils::{HealthRegistry, HealthStatus};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ClusterAgentError;
use crate::role::LocalIdentity;
use crate::update::{self, UpdateConfig};
use crate::{stats, CURRENT_VERSION};

const TICK: Duration = Duration::from_secs(30);
const STABILITY_WINDOW: chrono::Duration = chrono::Duration::minutes(5);
const COMPONENT: &str = "cluster_secondary_loop";

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    cluster_id: uuid::Uuid,
    cluster_secret: &'a str,
    hardware_id: &'a str,
    role: &'static str,
    name: &'a str,
    ip: &'a str,
    main_ip: &'a str,
    db_replication_lag_sec: Option<f64>,
    cpu_percent: Option<f32>,
    mem_percent: Option<f32>,
    disk_percent: Option<f32>,
    subscriber_count: Option<i64>,
    version: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatResponse {
    main_version: String,
}

pub struct SecondaryLoop {
    gateway: Arc<dyn PersistenceGateway>,
    http: reqwest::Client,
    identity: LocalIdentity,
    node_name: String,
    main_ip: String,
    heartbeat_port: u16,
    update_config: UpdateConfig,
    version_mismatch_since: Option<DateTime<Utc>>,
    health: Option<Arc<HealthRegistry>>,
}

impl SecondaryLoop {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        identity: LocalIdentity,
        node_name: String,
        main_ip: String,
        heartbeat_port: u16,
        update_config: UpdateConfig,
    ) -> Self {
        Self {
            gateway,
            http: reqwest::Client::new(),
            identity,
            node_name,
            main_ip,
            heartbeat_port,
            update_config,
            version_mismatch_since: None,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!("cluster secondary loop started, main at {}", self.main_ip);
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
                            warn!("cluster secondary loop tick failed: {e}");
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Degraded, Some(e.to_string()));
                            }
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("cluster secondary loop stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<(), ClusterAgentError> {
        let config = self.gateway.get_cluster_config().await?;
        let lag = self.gateway.get_preference("db_replication_lag_sec").await?;

        let body = HeartbeatRequest {
            cluster_id: config.cluster_id,
            cluster_secret: &config.cluster_secret,
            hardware_id: &self.identity.hardware_id,
            role: "secondary",
            name: &self.node_name,
            ip: &self.identity.server_ip,
            main_ip: &self.main_ip,
            db_replication_lag_sec: lag.and_then(|s| s.parse().ok()),
            cpu_percent: stats::cpu_percent(),
            mem_percent: stats::mem_percent(),
            disk_percent: stats::disk_percent("/"),
            subscriber_count: None,
            version: CURRENT_VERSION,
            timestamp: Utc::now(),
        };

        let response = self
            .http
            .post(format!("http://{}:{}/api/cluster/heartbeat", self.main_ip, self.heartbeat_port))
            .json(&body)
            .send()
            .await?
            .json::<HeartbeatResponse>()
            .await?;

        self.track_version(&config, &response.main_version).await
    }

    async fn track_version(&mut self, config: &ClusterConfig, main_version: &str) -> Result<(), ClusterAgentError> {
        if main_version == CURRENT_VERSION {
            self.version_mismatch_since = None;
            return Ok(());
        }

        let now = Utc::now();
        let is_new_mismatch = self.version_mismatch_since.is_none();
        let since = *self.version_mismatch_since.get_or_insert(now);
        if is_new_mismatch {
            info!("version mismatch detected: local={CURRENT_VERSION} main={main_version}");
            self.gateway
                .record_cluster_event(&ClusterEvent::new(
                    config.cluster_id,
                    self.identity.hardware_id.clone(),
                    ClusterEventKind::UpdatePending,
                ))
                .await?;
        }

        if now - since < STABILITY_WINDOW {
            return Ok(());
        }

        info!("version mismatch held stable for {STABILITY_WINDOW}, starting update to {main_version}");
        match update::perform_update(&self.http, &self.update_config, main_version).await {
            Ok(()) => {
                self.gateway
                    .record_cluster_event(&ClusterEvent::new(
                        config.cluster_id,
                        self.identity.hardware_id.clone(),
                        ClusterEventKind::UpdateApplied,
                    ))
                    .await?;
            }
            Err(e) => {
                warn!("update to {main_version} failed, will retry next cycle: {e}");
                self.gateway
                    .record_cluster_event(
                        &ClusterEvent::new(
                            config.cluster_id,
                            self.identity.hardware_id.clone(),
                            ClusterEventKind::UpdateCanceled,
                        )
                        .with_detail(e.to_string()),
                    )
                    .await?;
            }
        }
        self.version_mismatch_since = None;
        Ok(())
    }
}
