//! A minimal Docker Engine API client over the Unix socket, just enough
//! for the two calls the updater needs: restarting a container and
//! exec'ing `nginx -s reload` inside the frontend container. Pulling in a
//! full Docker SDK for two endpoints isn't worth the dependency weight.

use std::path::Path;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::ClusterAgentError;

pub struct DockerSocket {
    stream: UnixStream,
}

#[derive(Debug, Deserialize)]
struct ExecCreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

impl DockerSocket {
    pub async fn connect(path: &Path) -> Result<Self, ClusterAgentError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    pub async fn restart_container(&mut self, name: &str) -> Result<(), ClusterAgentError> {
        self.request("POST", &format!("/containers/{name}/restart"), None).await?;
        Ok(())
    }

    /// `docker exec <container> nginx -s reload`, via the two-step
    /// create-then-start exec API.
    pub async fn exec_nginx_reload(&mut self, container: &str) -> Result<(), ClusterAgentError> {
        let create_body = serde_json::json!({
            "Cmd": ["nginx", "-s", "reload"],
            "AttachStdout": true,
            "AttachStderr": true,
        });
        let response = self
            .request("POST", &format!("/containers/{container}/exec"), Some(create_body.to_string()))
            .await?;
        let created: ExecCreateResponse = serde_json::from_str(&response)
            .map_err(|e| ClusterAgentError::Update(format!("docker exec create response: {e}")))?;

        let start_body = serde_json::json!({ "Detach": false, "Tty": false });
        self.request("POST", &format!("/exec/{}/start", created.id), Some(start_body.to_string()))
            .await?;
        Ok(())
    }

    /// Writes a bare HTTP/1.1 request over the socket and returns the
    /// response body. The Docker daemon doesn't require a `Host` header
    /// for Unix-socket requests.
    async fn request(&mut self, method: &str, path: &str, body: Option<String>) -> Result<String, ClusterAgentError> {
        let body = body.unwrap_or_default();
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: docker\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        self.stream.write_all(request.as_bytes()).await?;

        let mut raw = Vec::new();
        self.stream.read_to_end(&mut raw).await?;
        let text = String::from_utf8_lossy(&raw);

        let mut parts = text.splitn(2, "\r\n\r\n");
        let status_line = parts.next().unwrap_or_default();
        let payload = parts.next().unwrap_or_default();

        let status_code = status_line
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|c| c.parse::<u16>().ok())
            .unwrap_or(0);

        if !(200..300).contains(&status_code) {
            return Err(ClusterAgentError::Update(format!(
                "docker API {method} {path} returned {status_code}: {payload}"
            )));
        }
        Ok(payload.to_string())
    }
}
