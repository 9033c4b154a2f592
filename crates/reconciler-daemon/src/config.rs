//! Environment-variable configuration, read once at startup in the same
//! direct `std::env::var(...).unwrap_or(...)`/`.expect(...)` style as
//! `tmf620_catalog::db::init_db`. No config-file layering.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

pub struct Config {
    pub database_url: String,

    pub quota_tick_interval: Duration,
    pub bandwidth_tick_interval: Duration,
    pub daily_reset_hour: u8,
    pub daily_reset_minute: u8,
    pub timezone: Tz,

    pub coa_external_binary: Option<PathBuf>,

    pub heartbeat_bind_addr: String,
    pub cluster_main_ip: String,
    pub cluster_heartbeat_port: u16,

    pub health_log_interval: Duration,

    pub update: UpdateEnvConfig,
}

pub struct UpdateEnvConfig {
    pub license_server_url: String,
    pub license_key: String,
    pub install_root: PathBuf,
    pub version_file: PathBuf,
    pub docker_socket_path: PathBuf,
    pub restart_containers: Vec<String>,
    pub update_flag_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),

            quota_tick_interval: Duration::from_secs(env_u64("QUOTA_TICK_SECONDS", 30)),
            bandwidth_tick_interval: Duration::from_secs(env_u64("BANDWIDTH_TICK_SECONDS", 30)),
            daily_reset_hour: env_u8("DAILY_RESET_HOUR", 0),
            daily_reset_minute: env_u8("DAILY_RESET_MINUTE", 0),
            timezone: std::env::var("SYSTEM_TIMEZONE")
                .ok()
                .and_then(|s| s.parse::<Tz>().ok())
                .unwrap_or(chrono_tz::UTC),

            coa_external_binary: std::env::var("COA_EXTERNAL_BINARY").ok().map(PathBuf::from),

            heartbeat_bind_addr: std::env::var("CLUSTER_HEARTBEAT_BIND")
                .unwrap_or_else(|_| "0.0.0.0:9100".to_string()),
            cluster_main_ip: std::env::var("CLUSTER_MAIN_IP")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            cluster_heartbeat_port: env_u16("CLUSTER_HEARTBEAT_PORT", 9100),

            health_log_interval: Duration::from_secs(env_u64("HEALTH_LOG_SECONDS", 60)),

            update: UpdateEnvConfig {
                license_server_url: std::env::var("LICENSE_SERVER_URL")
                    .unwrap_or_else(|_| "https://license.example.invalid".to_string()),
                license_key: std::env::var("LICENSE_KEY").unwrap_or_default(),
                install_root: std::env::var("INSTALL_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/opt/proxpanel")),
                version_file: std::env::var("VERSION_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/opt/proxpanel/VERSION")),
                docker_socket_path: std::env::var("DOCKER_SOCKET_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/var/run/docker.sock")),
                restart_containers: std::env::var("UPDATE_RESTART_CONTAINERS")
                    .unwrap_or_else(|_| "proxpanel-backend,proxpanel-frontend".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                update_flag_file: std::env::var("UPDATE_FLAG_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/opt/proxpanel/UPDATE_PENDING")),
            },
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
