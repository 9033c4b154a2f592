//! Version-driven self-update (§4.8): check the license server, download
//! and verify the release tarball, swap binaries/assets into place and
//! restart via the Docker socket (falling back to docker-compose, then a
//! flag file a systemd watcher can pick up).

use std::io::Read;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::docker::DockerSocket;
use crate::error::ClusterAgentError;

#[derive(Clone)]
pub struct UpdateConfig {
    pub license_server_url: String,
    pub license_key: String,
    pub install_root: PathBuf,
    pub version_file: PathBuf,
    pub docker_socket_path: PathBuf,
    pub restart_containers: Vec<String>,
    pub update_flag_file: PathBuf,
}

#[derive(Debug, Serialize)]
struct UpdateCheckRequest<'a> {
    license_key: &'a str,
    current_version: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpdateCheckResponse {
    update_available: bool,
    #[allow(dead_code)]
    version: String,
    download_url: String,
    checksum: String,
    #[allow(dead_code)]
    file_name: String,
}

pub async fn perform_update(
    http: &reqwest::Client,
    config: &UpdateConfig,
    expected_version: &str,
) -> Result<(), ClusterAgentError> {
    let check: UpdateCheckResponse = http
        .post(format!("{}/api/v1/update/check", config.license_server_url))
        .json(&UpdateCheckRequest {
            license_key: &config.license_key,
            current_version: expected_version,
        })
        .send()
        .await?
        .json()
        .await?;

    if !check.update_available {
        return Err(ClusterAgentError::Update(
            "license server reports no update available despite version mismatch".into(),
        ));
    }

    info!("downloading update package from {}", check.download_url);
    let bytes = http.get(&check.download_url).send().await?.bytes().await?;
    verify_checksum(&bytes, &check.checksum)?;

    let extract_dir = tempfile::tempdir()?;
    extract_tarball(&bytes, extract_dir.path())?;
    swap_into_place(extract_dir.path(), &config.install_root)?;
    std::fs::write(&config.version_file, expected_version.trim())?;

    restart(config).await?;
    info!("update to {expected_version} applied");
    Ok(())
}

fn verify_checksum(bytes: &[u8], expected: &str) -> Result<(), ClusterAgentError> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let actual = format!("{:x}", hasher.finalize());
    if actual != expected {
        return Err(ClusterAgentError::Update(format!(
            "checksum mismatch: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}

fn extract_tarball(bytes: &[u8], dest: &Path) -> Result<(), ClusterAgentError> {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)?;
    Ok(())
}

/// Clears each destination directory's contents in place rather than
/// deleting the directory itself, so bind-mount inodes docker holds open
/// stay valid across the swap.
fn swap_into_place(extract_dir: &Path, install_root: &Path) -> Result<(), ClusterAgentError> {
    for entry in std::fs::read_dir(extract_dir)? {
        let entry = entry?;
        let dest = install_root.join(entry.file_name());
        if entry.path().is_dir() {
            clear_dir_contents(&dest)?;
            copy_dir_contents(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn clear_dir_contents(dir: &Path) -> Result<(), ClusterAgentError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn copy_dir_contents(src: &Path, dest: &Path) -> Result<(), ClusterAgentError> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_contents(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

async fn restart(config: &UpdateConfig) -> Result<(), ClusterAgentError> {
    match DockerSocket::connect(&config.docker_socket_path).await {
        Ok(mut docker) => {
            for name in &config.restart_containers {
                if let Err(e) = docker.restart_container(name).await {
                    warn!("docker socket restart of {name} failed: {e}, falling back to docker-compose");
                    return restart_via_compose(config);
                }
                if name.contains("frontend") {
                    if let Err(e) = docker.exec_nginx_reload(name).await {
                        warn!("nginx reload in {name} failed: {e}");
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            warn!("docker socket unavailable ({e}), falling back to docker-compose");
            restart_via_compose(config)
        }
    }
}

fn restart_via_compose(config: &UpdateConfig) -> Result<(), ClusterAgentError> {
    let status = std::process::Command::new("docker-compose")
        .arg("restart")
        .args(&config.restart_containers)
        .current_dir(&config.install_root)
        .status();

    match status {
        Ok(s) if s.success() => Ok(()),
        _ => {
            warn!("docker-compose restart failed, writing update flag file for the systemd watcher");
            std::fs::write(&config.update_flag_file, b"update-pending\n")?;
            Ok(())
        }
    }
}

#[allow(dead_code)]
fn read_version_file(path: &Path) -> Option<String> {
    let mut buf = String::new();
    std::fs::File::open(path).ok()?.read_to_string(&mut buf).ok()?;
    Some(buf.trim().to_string())
}
