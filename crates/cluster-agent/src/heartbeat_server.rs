//! The main node's side of §4.8's heartbeat exchange: a single endpoint,
//! `POST /api/cluster/heartbeat`, that a secondary's [`SecondaryLoop`]
//! polls every 30s. This is cluster-internal wiring, not the out-of-scope
//! admin API — it carries no subscriber or billing data.

use actix_web::{web, App, HttpServer};
use chrono::{DateTime, Utc};
use ispctl_core_model::{ClusterNode, ClusterRole};
use ispctl_persistence::PersistenceGateway;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::CURRENT_VERSION;

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    cluster_secret: String,
    hardware_id: String,
    role: String,
    name: String,
    ip: String,
    #[allow(dead_code)]
    main_ip: String,
    db_replication_lag_sec: Option<f64>,
    cpu_percent: Option<f32>,
    mem_percent: Option<f32>,
    disk_percent: Option<f32>,
    subscriber_count: Option<i64>,
    version: String,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HeartbeatResponse {
    main_version: &'static str,
}

struct ServerState {
    gateway: Arc<dyn PersistenceGateway>,
}

async fn heartbeat(
    state: web::Data<ServerState>,
    body: web::Json<HeartbeatRequest>,
) -> actix_web::HttpResponse {
    let config = match state.gateway.get_cluster_config().await {
        Ok(c) => c,
        Err(e) => {
            warn!("heartbeat handler: failed to load cluster config: {e}");
            return actix_web::HttpResponse::InternalServerError().finish();
        }
    };
    if body.cluster_secret != config.cluster_secret {
        return actix_web::HttpResponse::Unauthorized().finish();
    }

    let node = ClusterNode {
        hardware_id: body.hardware_id.clone(),
        name: body.name.clone(),
        ip_address: body.ip.clone(),
        role: parse_role(&body.role),
        version: body.version.clone(),
        last_heartbeat: Some(Utc::now()),
        is_online: true,
        db_replication_lag_sec: body.db_replication_lag_sec,
        cpu_percent: body.cpu_percent,
        mem_percent: body.mem_percent,
        disk_percent: body.disk_percent,
        subscriber_count: body.subscriber_count,
    };
    if let Err(e) = state.gateway.upsert_cluster_node_heartbeat(&node).await {
        warn!("heartbeat handler: failed to persist node {}: {e}", node.hardware_id);
        return actix_web::HttpResponse::InternalServerError().finish();
    }

    actix_web::HttpResponse::Ok().json(HeartbeatResponse {
        main_version: CURRENT_VERSION,
    })
}

fn parse_role(s: &str) -> ClusterRole {
    match s {
        "main" => ClusterRole::Main,
        "secondary" => ClusterRole::Secondary,
        _ => ClusterRole::Standalone,
    }
}

pub async fn run(gateway: Arc<dyn PersistenceGateway>, bind_addr: &str) -> std::io::Result<()> {
    let state = web::Data::new(ServerState { gateway });
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/api/cluster/heartbeat", web::post().to(heartbeat))
    })
    .bind(bind_addr)?
    .run()
    .await
}
