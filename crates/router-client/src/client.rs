//! The stateful RouterOS API connection and its typed operations (§4.1).
//!
//! A [`RouterClient`] owns exactly one TCP connection and is not
//! thread-safe; callers obtain one per router per tick (§5, §9).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ispctl_core_model::RateLimit;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::RouterClientError;
use crate::protocol::{read_sentence, write_sentence};
use crate::session::Session;
use crate::words::{attr_word, attrs_from_words, query_word};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The operations the quota reconciler, bandwidth scheduler and PCQ
/// manager need from a router connection. Split out as a trait so tests
/// can substitute an in-memory fake instead of a live TCP socket.
#[async_trait]
pub trait RouterOps: Send {
    async fn get_active_session(&mut self, username: &str) -> Result<Session, RouterClientError>;

    async fn update_user_rate_limit_with_ip(
        &mut self,
        username: &str,
        ip: &str,
        rate: RateLimit,
    ) -> Result<(), RouterClientError>;

    async fn remove_dynamic_queue_for_recreation(
        &mut self,
        username: &str,
    ) -> Result<(), RouterClientError>;

    async fn disconnect_user(&mut self, username: &str) -> Result<(), RouterClientError>;

    async fn create_pcq_queue_type(
        &mut self,
        name: &str,
        speed_mbps: u32,
        limit_kib: u32,
        total_limit_kib: u32,
    ) -> Result<(), RouterClientError>;

    async fn create_cdn_mangle_rule(&mut self, cdn_name: &str) -> Result<(), RouterClientError>;

    async fn create_pcq_simple_queue(
        &mut self,
        cdn_name: &str,
        speed_mbps: u32,
        target_cidr: &str,
    ) -> Result<(), RouterClientError>;

    async fn sync_address_list(
        &mut self,
        list_name: &str,
        entries: &[String],
        comment: &str,
    ) -> Result<(), RouterClientError>;

    async fn ping(&mut self, address: &str) -> Result<bool, RouterClientError>;

    /// Deletes the speed-specific PCQ simple queue and queue type for one
    /// CDN; the shared mangle rule and address-list are left in place
    /// (§4.5's `RemoveCDNPCQSetup`).
    async fn remove_pcq_setup(&mut self, cdn_name: &str, speed_mbps: u32) -> Result<(), RouterClientError>;

    /// Connection-tracking rows with the subscriber's IP on either side,
    /// used to compute bypass-CDN download bytes (§4.3.d).
    async fn firewall_connections(
        &mut self,
        subscriber_ip: &str,
    ) -> Result<Vec<crate::session::FirewallConnection>, RouterClientError>;

    /// Upserts the per-subscriber CDN-override simple queue (§4.3.k):
    /// target is the subscriber's own IP rather than the CDN's pool.
    async fn create_subscriber_cdn_override(
        &mut self,
        username: &str,
        cdn_name: &str,
        speed_mbps: u32,
        target_ip: &str,
    ) -> Result<(), RouterClientError>;

    /// Removes a subscriber's CDN-override queue, if one exists.
    async fn remove_subscriber_cdn_override(&mut self, username: &str) -> Result<(), RouterClientError>;
}

pub struct RouterClient {
    stream: TcpStream,
    deadline: Duration,
}

impl RouterClient {
    pub async fn connect(addr: &str, deadline: Duration) -> Result<Self, RouterClientError> {
        let stream = timeout(deadline, TcpStream::connect(addr))
            .await
            .map_err(|_| RouterClientError::Timeout(deadline))??;
        Ok(Self { stream, deadline })
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), RouterClientError> {
        let rows = self
            .talk(vec![
                "/login".to_string(),
                attr_word("name", username),
                attr_word("password", password),
            ])
            .await?;

        if let Some(row) = rows.first() {
            if let Some(challenge) = row.get("ret") {
                let response = crate::login::md5_challenge_response(password, challenge)?;
                self.talk(vec![
                    "/login".to_string(),
                    attr_word("name", username),
                    attr_word("response", &response),
                ])
                .await?;
            }
        }
        Ok(())
    }

    /// Writes one sentence and reads sentences until `!done`, collecting
    /// the attribute maps of every `!re` row. A `!trap` sentence becomes
    /// [`RouterClientError::TrapReceived`], with dynamic-queue refusals
    /// promoted to [`RouterClientError::DynamicQueueConflict`] by callers
    /// that know the username in play.
    async fn talk(
        &mut self,
        words: Vec<String>,
    ) -> Result<Vec<HashMap<String, String>>, RouterClientError> {
        timeout(self.deadline, write_sentence(&mut self.stream, &words))
            .await
            .map_err(|_| RouterClientError::Timeout(self.deadline))??;

        let mut rows = Vec::new();
        loop {
            let sentence = timeout(self.deadline, read_sentence(&mut self.stream))
                .await
                .map_err(|_| RouterClientError::Timeout(self.deadline))??;

            match sentence.first().map(String::as_str) {
                Some("!done") => return Ok(rows),
                Some("!re") => rows.push(attrs_from_words(&sentence[1..])),
                Some("!trap") => {
                    let message = attrs_from_words(&sentence[1..])
                        .get("message")
                        .cloned()
                        .unwrap_or_else(|| "router rejected the request".to_string());
                    return Err(RouterClientError::TrapReceived(message));
                }
                _ => continue,
            }
        }
    }

    /// Interface names a PPPoE session for `username` might be reported
    /// under, tried in order (§4.1's rate/byte fallback chain).
    fn candidate_interface_names(username: &str) -> [String; 3] {
        [
            format!("<pppoe-{username}>"),
            format!("pppoe-{username}"),
            username.to_string(),
        ]
    }

    /// Fallback byte counters when the queue lookup in
    /// [`RouterOps::get_active_session`] comes back empty: `tx-byte` is
    /// what the router transmitted to the client (download), `rx-byte`
    /// is what it received from the client (upload).
    async fn interface_byte_counters(&mut self, username: &str) -> Option<(i64, i64)> {
        for name in Self::candidate_interface_names(username) {
            let rows = self
                .talk(vec!["/interface/print".to_string(), query_word("name", &name)])
                .await
                .ok()?;
            if let Some(row) = rows.first() {
                let tx = row.get("tx-byte").and_then(|v| v.parse().ok());
                let rx = row.get("rx-byte").and_then(|v| v.parse().ok());
                if let (Some(tx), Some(rx)) = (tx, rx) {
                    return Some((tx, rx));
                }
            }
        }
        None
    }

    /// `/interface/monitor-traffic =once=`, tried against the same
    /// candidate interface names; `tx-bits-per-second` is the download
    /// rate, `rx-bits-per-second` the upload rate.
    async fn monitor_traffic_rate(&mut self, username: &str) -> Option<(i64, i64)> {
        for name in Self::candidate_interface_names(username) {
            let rows = self
                .talk(vec![
                    "/interface/monitor-traffic".to_string(),
                    attr_word("interface", &name),
                    attr_word("once", ""),
                ])
                .await
                .ok()?;
            if let Some(row) = rows.first() {
                let tx = row.get("tx-bits-per-second").and_then(|v| v.parse().ok());
                let rx = row.get("rx-bits-per-second").and_then(|v| v.parse().ok());
                if let (Some(tx), Some(rx)) = (tx, rx) {
                    return Some((tx, rx));
                }
            }
        }
        None
    }

    /// Deletes every row of `path` matching `query_key=query_value`
    /// before the caller adds its replacement, since RouterOS queue
    /// types, mangle rules and simple queues don't support an in-place
    /// `/set` of the attributes PCQ setup needs to change (§4.5 step 3).
    /// This is what makes `SyncCDNPCQSetup` idempotent under repeated
    /// calls instead of accumulating duplicate rows on every sweep.
    async fn delete_existing(
        &mut self,
        path: &str,
        query_key: &str,
        query_value: &str,
    ) -> Result<(), RouterClientError> {
        let rows = self
            .talk(vec![format!("{path}/print"), query_word(query_key, query_value)])
            .await
            .unwrap_or_default();
        for row in rows {
            if let Some(id) = row.get(".id") {
                self.talk(vec![format!("{path}/remove"), attr_word(".id", id)]).await?;
            }
        }
        Ok(())
    }

    async fn find_main_queue_id(&mut self, username: &str, ip: &str) -> Result<String, RouterClientError> {
        let rows = self
            .talk(vec![
                "/queue/simple/print".to_string(),
                query_word("name", username),
            ])
            .await?;

        let rows = if rows.is_empty() {
            self.talk(vec![
                "/queue/simple/print".to_string(),
                query_word("target", &format!("{ip}/32")),
            ])
            .await?
        } else {
            rows
        };

        rows.into_iter()
            .find(|row| !row.contains_key("dst"))
            .and_then(|row| row.get(".id").cloned())
            .ok_or_else(|| RouterClientError::NotFound(format!("main queue for {username}")))
    }
}

#[async_trait]
impl RouterOps for RouterClient {
    async fn get_active_session(&mut self, username: &str) -> Result<Session, RouterClientError> {
        let rows = self
            .talk(vec![
                "/ppp/active/print".to_string(),
                query_word("name", username),
            ])
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| RouterClientError::NotFound(format!("active session for {username}")))?;

        let id = row.get(".id").cloned().unwrap_or_default();
        let address = row.get("address").cloned().unwrap_or_default();
        let session_id = row.get("session-id").cloned().unwrap_or_default();
        let uptime = row.get("uptime").cloned().unwrap_or_default();

        let queue_rows = self
            .talk(vec![
                "/queue/simple/print".to_string(),
                query_word("target", &format!("{address}/32")),
            ])
            .await
            .unwrap_or_default();
        let queue_row = queue_rows.first();

        let bytes_from_queue = queue_row.and_then(|q| q.get("bytes")).and_then(|b| b.split_once('/')).map(
            |(upload, download)| (download.parse().unwrap_or(0), upload.parse().unwrap_or(0)),
        );
        let (tx_bytes, rx_bytes) = match bytes_from_queue {
            Some(pair) => pair,
            None => self.interface_byte_counters(username).await.unwrap_or((0, 0)),
        };

        let rate_from_queue = queue_row.and_then(|q| q.get("rate")).and_then(|r| r.split_once('/')).map(
            |(upload, download)| (download.parse().unwrap_or(0), upload.parse().unwrap_or(0)),
        );
        let (tx_rate, rx_rate) = match self.monitor_traffic_rate(username).await {
            Some(pair) => pair,
            None => rate_from_queue.unwrap_or((0, 0)),
        };

        Ok(Session {
            id,
            address,
            session_id,
            uptime,
            rx_bytes,
            tx_bytes,
            rx_rate,
            tx_rate,
        })
    }

    async fn update_user_rate_limit_with_ip(
        &mut self,
        username: &str,
        ip: &str,
        rate: RateLimit,
    ) -> Result<(), RouterClientError> {
        let queue_id = self.find_main_queue_id(username, ip).await?;
        let result = self
            .talk(vec![
                "/queue/simple/set".to_string(),
                attr_word(".id", &queue_id),
                attr_word("max-limit", &rate.to_string()),
            ])
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(RouterClientError::TrapReceived(msg)) if msg.to_lowercase().contains("dynamic") => {
                match self
                    .talk(vec![
                        "/ppp/secret/set".to_string(),
                        query_word("name", username),
                        attr_word("rate-limit", &rate.to_string()),
                    ])
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(_) => Err(RouterClientError::DynamicQueueConflict {
                        username: username.to_string(),
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_dynamic_queue_for_recreation(
        &mut self,
        username: &str,
    ) -> Result<(), RouterClientError> {
        let queue_id = self.find_main_queue_id(username, "0.0.0.0").await?;
        self.talk(vec![
            "/queue/simple/remove".to_string(),
            attr_word(".id", &queue_id),
        ])
        .await?;
        Ok(())
    }

    async fn disconnect_user(&mut self, username: &str) -> Result<(), RouterClientError> {
        let rows = self
            .talk(vec![
                "/ppp/active/print".to_string(),
                query_word("name", username),
            ])
            .await?;
        let id = rows
            .first()
            .and_then(|row| row.get(".id").cloned())
            .ok_or_else(|| RouterClientError::NotFound(format!("active session for {username}")))?;

        self.talk(vec![
            "/ppp/active/remove".to_string(),
            attr_word(".id", &id),
        ])
        .await?;
        Ok(())
    }

    async fn create_pcq_queue_type(
        &mut self,
        name: &str,
        speed_mbps: u32,
        limit_kib: u32,
        total_limit_kib: u32,
    ) -> Result<(), RouterClientError> {
        let type_name = format!("{name}-{speed_mbps}");
        self.delete_existing("/queue/type", "name", &type_name).await?;
        self.talk(vec![
            "/queue/type/add".to_string(),
            attr_word("name", &type_name),
            attr_word("kind", "pcq"),
            attr_word("pcq-rate", &format!("{speed_mbps}M")),
            attr_word("pcq-classifier", "dst-address"),
            attr_word("pcq-src-address-mask", "32"),
            attr_word("pcq-dst-address-mask", "32"),
            attr_word("pcq-limit", &format!("{limit_kib}KiB")),
            attr_word("pcq-total-limit", &format!("{total_limit_kib}KiB")),
        ])
        .await?;
        Ok(())
    }

    async fn create_cdn_mangle_rule(&mut self, cdn_name: &str) -> Result<(), RouterClientError> {
        let list = format!("CDN-{cdn_name}");
        let comment = format!("proxpanel CDN {cdn_name} packet mark");
        self.delete_existing("/ip/firewall/mangle", "comment", &comment).await?;
        self.talk(vec![
            "/ip/firewall/mangle/add".to_string(),
            attr_word("chain", "forward"),
            attr_word("src-address-list", &list),
            attr_word("action", "mark-packet"),
            attr_word("new-packet-mark", &list),
            attr_word("passthrough", "no"),
            attr_word("comment", &comment),
        ])
        .await?;
        Ok(())
    }

    async fn create_pcq_simple_queue(
        &mut self,
        cdn_name: &str,
        speed_mbps: u32,
        target_cidr: &str,
    ) -> Result<(), RouterClientError> {
        let type_name = format!("{cdn_name}-{speed_mbps}");
        let mark = format!("CDN-{cdn_name}");
        let comment = format!("PCQ queue for CDN {cdn_name} {speed_mbps}M");
        self.delete_existing("/queue/simple", "comment", &comment).await?;
        self.talk(vec![
            "/queue/simple/add".to_string(),
            attr_word("target", target_cidr),
            attr_word("packet-marks", &mark),
            attr_word("queue", &format!("{type_name}/{type_name}")),
            attr_word("max-limit", "1G/1G"),
            attr_word("priority", "8/8"),
            attr_word("comment", &comment),
        ])
        .await?;

        let rows = self
            .talk(vec!["/queue/simple/print".to_string(), query_word("comment", &comment)])
            .await
            .unwrap_or_default();
        if let Some(id) = rows.first().and_then(|r| r.get(".id")) {
            self.talk(vec![
                "/queue/simple/move".to_string(),
                attr_word("numbers", id),
                attr_word("destination", "0"),
            ])
            .await?;
        }
        Ok(())
    }

    async fn sync_address_list(
        &mut self,
        list_name: &str,
        entries: &[String],
        comment: &str,
    ) -> Result<(), RouterClientError> {
        let existing = self
            .talk(vec![
                "/ip/firewall/address-list/print".to_string(),
                query_word("list", list_name),
            ])
            .await
            .unwrap_or_default();

        for row in existing {
            if let Some(id) = row.get(".id") {
                self.talk(vec![
                    "/ip/firewall/address-list/remove".to_string(),
                    attr_word(".id", id),
                ])
                .await?;
            }
        }

        for entry in entries {
            self.talk(vec![
                "/ip/firewall/address-list/add".to_string(),
                attr_word("list", list_name),
                attr_word("address", entry),
                attr_word("comment", comment),
            ])
            .await?;
        }
        Ok(())
    }

    async fn ping(&mut self, address: &str) -> Result<bool, RouterClientError> {
        let rows = timeout(
            DEFAULT_TIMEOUT * 2,
            self.talk(vec![
                "/ping".to_string(),
                attr_word("address", address),
                attr_word("count", "1"),
            ]),
        )
        .await
        .map_err(|_| RouterClientError::Timeout(DEFAULT_TIMEOUT * 2))??;

        Ok(rows
            .first()
            .and_then(|row| row.get("received"))
            .map(|received| received != "0")
            .unwrap_or(false))
    }

    async fn remove_pcq_setup(&mut self, cdn_name: &str, speed_mbps: u32) -> Result<(), RouterClientError> {
        let type_name = format!("{cdn_name}-{speed_mbps}");
        let comment = format!("PCQ queue for CDN {cdn_name} {speed_mbps}M");

        let queue_rows = self
            .talk(vec![
                "/queue/simple/print".to_string(),
                query_word("comment", &comment),
            ])
            .await
            .unwrap_or_default();
        for row in queue_rows {
            if let Some(id) = row.get(".id") {
                self.talk(vec!["/queue/simple/remove".to_string(), attr_word(".id", id)])
                    .await?;
            }
        }

        let type_rows = self
            .talk(vec![
                "/queue/type/print".to_string(),
                query_word("name", &type_name),
            ])
            .await
            .unwrap_or_default();
        for row in type_rows {
            if let Some(id) = row.get(".id") {
                self.talk(vec!["/queue/type/remove".to_string(), attr_word(".id", id)])
                    .await?;
            }
        }

        Ok(())
    }

    async fn firewall_connections(
        &mut self,
        subscriber_ip: &str,
    ) -> Result<Vec<crate::session::FirewallConnection>, RouterClientError> {
        let rows = self
            .talk(vec!["/ip/firewall/connection/print".to_string()])
            .await?;

        let mut out = Vec::new();
        for row in rows {
            let src = row.get("src-address").cloned().unwrap_or_default();
            let dst = row.get("dst-address").cloned().unwrap_or_default();
            let src_host = src.split(':').next().unwrap_or("");
            let dst_host = dst.split(':').next().unwrap_or("");

            let orig_bytes: i64 = row
                .get("orig-bytes")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let repl_bytes: i64 = row
                .get("repl-bytes")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            if src_host == subscriber_ip {
                out.push(crate::session::FirewallConnection {
                    remote_ip: dst_host.to_string(),
                    download_bytes: repl_bytes,
                });
            } else if dst_host == subscriber_ip {
                out.push(crate::session::FirewallConnection {
                    remote_ip: src_host.to_string(),
                    download_bytes: orig_bytes,
                });
            }
        }
        Ok(out)
    }

    async fn create_subscriber_cdn_override(
        &mut self,
        username: &str,
        cdn_name: &str,
        speed_mbps: u32,
        target_ip: &str,
    ) -> Result<(), RouterClientError> {
        self.remove_subscriber_cdn_override(username).await.ok();

        let type_name = format!("{cdn_name}-{speed_mbps}");
        let mark = format!("CDN-{cdn_name}");
        let comment = format!("CDN override for {username} ({cdn_name})");
        self.talk(vec![
            "/queue/simple/add".to_string(),
            attr_word("target", &format!("{target_ip}/32")),
            attr_word("packet-marks", &mark),
            attr_word("queue", &format!("{type_name}/{type_name}")),
            attr_word("priority", "1/1"),
            attr_word("comment", &comment),
        ])
        .await?;

        let rows = self
            .talk(vec![
                "/queue/simple/print".to_string(),
                query_word("comment", &comment),
            ])
            .await
            .unwrap_or_default();
        if let Some(id) = rows.first().and_then(|r| r.get(".id")) {
            self.talk(vec![
                "/queue/simple/move".to_string(),
                attr_word("numbers", id),
                attr_word("destination", "0"),
            ])
            .await?;
        }
        Ok(())
    }

    async fn remove_subscriber_cdn_override(&mut self, username: &str) -> Result<(), RouterClientError> {
        let comment_prefix = format!("CDN override for {username}");
        let rows = self
            .talk(vec!["/queue/simple/print".to_string()])
            .await
            .unwrap_or_default();
        for row in rows {
            if row
                .get("comment")
                .is_some_and(|c| c.starts_with(&comment_prefix))
            {
                if let Some(id) = row.get(".id") {
                    self.talk(vec!["/queue/simple/remove".to_string(), attr_word(".id", id)])
                        .await?;
                }
            }
        }
        Ok(())
    }
}
