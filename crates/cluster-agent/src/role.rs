//! Startup role detection (§4.8): the replicated `cluster_config` row is
//! overridden by what the local database itself reports, since a restored
//! or promoted replica can lag behind an operator's manual config change.

use ispctl_core_model::ClusterRole;
use ispctl_persistence::PersistenceGateway;
use log::{info, warn};

use crate::error::ClusterAgentError;

/// This node's resolved identity: role plus the hardware id / IP it should
/// heartbeat under, which may differ from whatever `cluster_config`
/// originally held once "in recovery" forces the override.
pub struct LocalIdentity {
    pub role: ClusterRole,
    pub hardware_id: String,
    pub server_ip: String,
}

pub async fn detect_role(gateway: &dyn PersistenceGateway) -> Result<LocalIdentity, ClusterAgentError> {
    let config = gateway.get_cluster_config().await?;
    let in_recovery = gateway.is_in_recovery().await?;

    if in_recovery {
        warn!("database reports recovery state; forcing role=secondary and re-deriving host identity");
        Ok(LocalIdentity {
            role: ClusterRole::Secondary,
            hardware_id: local_hardware_id(),
            server_ip: local_server_ip(),
        })
    } else {
        info!("cluster role from config: {:?}", config.role);
        Ok(LocalIdentity {
            role: config.role,
            hardware_id: local_hardware_id(),
            server_ip: local_server_ip(),
        })
    }
}

/// `SERVER_MAC`, or the first non-loopback interface's MAC-derived id if
/// unset. `/sys/class/net` is read directly rather than pulling in a
/// platform-detection crate for a single-host CLI.
fn local_hardware_id() -> String {
    if let Ok(mac) = std::env::var("SERVER_MAC") {
        return mac;
    }
    first_up_interface()
        .and_then(|iface| std::fs::read_to_string(format!("/sys/class/net/{iface}/address")).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown-hardware-id".to_string())
}

fn local_server_ip() -> String {
    if let Ok(ip) = std::env::var("SERVER_IP") {
        return ip;
    }
    first_up_interface()
        .and_then(interface_ipv4)
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

/// First interface under `/sys/class/net` that isn't loopback or a
/// virtual device (docker/veth/bridge), and whose `operstate` is `up`.
fn first_up_interface() -> Option<String> {
    let entries = std::fs::read_dir("/sys/class/net").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "lo" || name.starts_with("veth") || name.starts_with("docker") || name.starts_with("br-") {
            continue;
        }
        let operstate = std::fs::read_to_string(entry.path().join("operstate")).unwrap_or_default();
        if operstate.trim() == "up" {
            return Some(name);
        }
    }
    None
}

fn interface_ipv4(iface: String) -> Option<String> {
    let output = std::process::Command::new("ip")
        .args(["-4", "-o", "addr", "show", "dev", &iface])
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let inet = text.split_whitespace().skip_while(|w| *w != "inet").nth(1)?;
    inet.split('/').next().map(str::to_string)
}
