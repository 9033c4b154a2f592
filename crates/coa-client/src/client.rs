//! Dispatches CoA rate-limit changes and Disconnect requests to a NAS,
//! preferring a configurable external RADIUS client binary for
//! heterogeneous attribute-dictionary compatibility and falling back to
//! an in-process UDP client (§4.2).

use std::path::PathBuf;
use std::time::Duration;

use ispctl_core_model::{Nas, RateLimit};
use log::{debug, warn};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::CoAClientError;
use crate::packet::{
    build_attributes, build_request, verify_reply, CODE_COA_ACK, CODE_COA_REQUEST,
    CODE_DISCONNECT_ACK, CODE_DISCONNECT_REQUEST,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct CoAClient {
    /// Path to an external RADIUS client tool (e.g. a `radclient`-style
    /// binary); when set it is tried before the built-in UDP sender.
    external_binary: Option<PathBuf>,
    timeout: Duration,
}

impl CoAClient {
    pub fn new(external_binary: Option<PathBuf>) -> Self {
        Self {
            external_binary,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn update_rate_limit(
        &self,
        nas: &Nas,
        username: &str,
        session_id: &str,
        rate: RateLimit,
    ) -> Result<(), CoAClientError> {
        if let Some(binary) = &self.external_binary {
            match self
                .shell_out(binary, nas, username, session_id, Some(rate))
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => warn!("external RADIUS client failed, falling back to UDP CoA: {e}"),
            }
        }
        self.send_udp(
            CODE_COA_REQUEST,
            CODE_COA_ACK,
            nas,
            username,
            session_id,
            Some(rate.to_string()),
        )
        .await
    }

    pub async fn disconnect(
        &self,
        nas: &Nas,
        username: &str,
        session_id: &str,
    ) -> Result<(), CoAClientError> {
        if let Some(binary) = &self.external_binary {
            match self.shell_out(binary, nas, username, session_id, None).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("external RADIUS client failed, falling back to UDP Disconnect: {e}"),
            }
        }
        self.send_udp(
            CODE_DISCONNECT_REQUEST,
            CODE_DISCONNECT_ACK,
            nas,
            username,
            session_id,
            None,
        )
        .await
    }

    async fn shell_out(
        &self,
        binary: &PathBuf,
        nas: &Nas,
        username: &str,
        session_id: &str,
        rate: Option<RateLimit>,
    ) -> Result<(), CoAClientError> {
        let mut cmd = Command::new(binary);
        cmd.arg(nas.coa_addr())
            .arg("coa")
            .arg(nas.radius_shared_secret.clone())
            .arg(format!("User-Name={username}"))
            .arg(format!("Acct-Session-Id={session_id}"));
        if let Some(rate) = rate {
            cmd.arg(format!("Mikrotik-Rate-Limit={rate}"));
        }

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CoAClientError::Timeout(self.timeout))??;

        if output.status.success() {
            Ok(())
        } else {
            Err(CoAClientError::ExternalToolFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }

    async fn send_udp(
        &self,
        request_code: u8,
        ack_code: u8,
        nas: &Nas,
        username: &str,
        session_id: &str,
        rate_limit: Option<String>,
    ) -> Result<(), CoAClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(nas.coa_addr()).await?;

        let identifier: u8 = rand::rng().random();
        let attrs = build_attributes(username, session_id, rate_limit.as_deref());
        let request = build_request(request_code, identifier, &attrs, &nas.radius_shared_secret);
        let mut request_authenticator = [0u8; 16];
        request_authenticator.copy_from_slice(&request[4..20]);

        socket.send(&request).await?;

        let mut buf = [0u8; 4096];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| CoAClientError::Timeout(self.timeout))??;
        let reply = &buf[..len];

        if reply.len() < 20 || reply[1] != identifier {
            return Err(CoAClientError::Protocol("reply identifier mismatch".into()));
        }
        if !verify_reply(reply, &request_authenticator, &nas.radius_shared_secret) {
            return Err(CoAClientError::Protocol("reply authenticator mismatch".into()));
        }

        debug!("NAS {} replied with code {}", nas.ip_address, reply[0]);
        if reply[0] == ack_code {
            Ok(())
        } else {
            Err(CoAClientError::Rejected)
        }
    }
}
