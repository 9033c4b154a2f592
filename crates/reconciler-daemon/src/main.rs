//! Process entry point: connects the database, detects this node's
//! cluster role, spawns one task per loop and waits for `ctrl_c` to stop
//! them all.

mod config;

use std::sync::Arc;

use ispctl_cluster_agent::{detect_role, heartbeat_server, MainLoop, SecondaryLoop, UpdateConfig};
use ispctl_coa_client::CoAClient;
use ispctl_core_model::ClusterRole;
use ispctl_maintenance::{DailyResetWorker, StaleSessionReaper};
use ispctl_notification::{DedupingDispatcher, LoggingSink};
use ispctl_persistence::{init_pool, PersistenceGateway, PgPersistenceGateway};
use ispctl_quota_reconciler::QuotaReconciler;
use ispctl_utils::HealthRegistry;
use log::info;
use tokio::sync::watch;

use config::Config;

#[tokio::main]
async fn main() {
    ispctl_utils::init_logger();
    let config = Config::from_env();

    info!("connecting to database");
    let pool = init_pool(&config.database_url).await;
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(PgPersistenceGateway::new(pool));

    let identity = detect_role(gateway.as_ref())
        .await
        .expect("initial cluster role detection failed");
    info!("this node's resolved role: {:?}", identity.role);

    let coa = Arc::new(CoAClient::new(config.coa_external_binary.clone()));
    let notifications = Arc::new(DedupingDispatcher::new(LoggingSink));
    let health = Arc::new(HealthRegistry::new());

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let reconciler = Arc::new(
        QuotaReconciler::new(
            Arc::clone(&gateway),
            Arc::clone(&coa),
            Arc::clone(&notifications),
            config.quota_tick_interval,
            config.daily_reset_hour,
            config.daily_reset_minute,
            config.timezone,
        )
        .with_health(Arc::clone(&health)),
    );
    tasks.push(tokio::spawn(QuotaReconciler::run(reconciler, stop_rx.clone())));

    let scheduler = ispctl_bandwidth_scheduler::BandwidthRuleScheduler::new(
        Arc::clone(&gateway),
        Arc::clone(&coa),
        config.bandwidth_tick_interval,
    )
    .with_health(Arc::clone(&health));
    tasks.push(tokio::spawn(scheduler.run(stop_rx.clone())));

    let pcq = ispctl_pcq_manager::PcqManager::new(Arc::clone(&gateway)).with_health(Arc::clone(&health));
    tasks.push(tokio::spawn(pcq.run(stop_rx.clone())));

    let daily_reset = DailyResetWorker::new(
        Arc::clone(&gateway),
        config.timezone,
        config.daily_reset_hour,
        config.daily_reset_minute,
    )
    .with_health(Arc::clone(&health));
    tasks.push(tokio::spawn(daily_reset.run(stop_rx.clone())));

    let reaper = StaleSessionReaper::new(Arc::clone(&gateway)).with_health(Arc::clone(&health));
    tasks.push(tokio::spawn(reaper.run(stop_rx.clone())));

    {
        let health = Arc::clone(&health);
        let interval = config.health_log_interval;
        let mut stop = stop_rx.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = health.snapshot(ispctl_cluster_agent::CURRENT_VERSION);
                        info!("health snapshot: {:?} ({} component(s))", snapshot.status, snapshot.checks.as_ref().map_or(0, Vec::len));
                    }
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            return;
                        }
                    }
                }
            }
        }));
    }

    let update_config = UpdateConfig {
        license_server_url: config.update.license_server_url.clone(),
        license_key: config.update.license_key.clone(),
        install_root: config.update.install_root.clone(),
        version_file: config.update.version_file.clone(),
        docker_socket_path: config.update.docker_socket_path.clone(),
        restart_containers: config.update.restart_containers.clone(),
        update_flag_file: config.update.update_flag_file.clone(),
    };

    match identity.role {
        ClusterRole::Main => {
            let main_loop = MainLoop::new(
                Arc::clone(&gateway),
                gateway
                    .get_cluster_config()
                    .await
                    .expect("cluster config must already exist at startup")
                    .cluster_id,
                identity.hardware_id.clone(),
            )
            .with_health(Arc::clone(&health));
            tasks.push(tokio::spawn(main_loop.run(stop_rx.clone())));

            let heartbeat_gateway = Arc::clone(&gateway);
            let bind_addr = config.heartbeat_bind_addr.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = heartbeat_server::run(heartbeat_gateway, &bind_addr).await {
                    log::error!("cluster heartbeat server stopped: {e}");
                }
            }));
        }
        ClusterRole::Secondary => {
            let secondary_loop = SecondaryLoop::new(
                Arc::clone(&gateway),
                identity,
                hostname(),
                config.cluster_main_ip.clone(),
                config.cluster_heartbeat_port,
                update_config,
            )
            .with_health(Arc::clone(&health));
            tasks.push(tokio::spawn(secondary_loop.run(stop_rx.clone())));
        }
        ClusterRole::Standalone => {
            info!("standalone node: skipping cluster main/secondary loops");
        }
    }

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl_c");
    info!("shutdown signal received, stopping all loops");
    let _ = stop_tx.send(true);

    for task in tasks {
        let _ = task.await;
    }
    info!("all loops stopped, exiting");
}

fn hostname() -> String {
    std::env::var("CLUSTER_NODE_NAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok().map(|s| s.trim().to_string()))
        .unwrap_or_else(|| "node".to_string())
}
