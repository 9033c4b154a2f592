//! Ephemeral per-call query results. These never reach persistence; they
//! exist only for the duration of a reconciler tick.

/// A live PPPoE session as reported by `/ppp/active/print` plus the
/// counters and rates sourced from the queue/interface fallback chain
/// described in §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub address: String,
    pub session_id: String,
    pub uptime: String,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub rx_rate: i64,
    pub tx_rate: i64,
}

/// One `/ip/firewall/connection` row involving a subscriber's IP, with
/// `download_bytes` already resolved to the leg pointing back at the
/// subscriber regardless of which side of the connection they were on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallConnection {
    pub remote_ip: String,
    pub download_bytes: i64,
}
