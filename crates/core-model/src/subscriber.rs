//! The subscriber record and its RADIUS reply-attribute counterpart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A PPPoE subscriber as tracked by the control plane.
///
/// The reconciler owns a narrow slice of this struct: `is_online`,
/// `ip_address`, session baselines, quota counters and FUP levels. Every
/// other field is written by the (out-of-scope) admin API; the reconciler
/// only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,

    pub service_id: Uuid,
    pub price: f64,
    pub expiry_date: DateTime<Utc>,
    pub reseller_id: Option<Uuid>,

    pub is_online: bool,
    pub ip_address: Option<String>,
    pub static_ip: Option<String>,
    pub nas_id: Option<Uuid>,

    pub last_session_download: i64,
    pub last_session_upload: i64,

    pub daily_download_used: i64,
    pub daily_upload_used: i64,
    pub monthly_download_used: i64,
    pub monthly_upload_used: i64,

    pub last_daily_reset: Option<DateTime<Utc>>,
    pub last_monthly_reset: Option<DateTime<Utc>>,
    pub last_quota_sync: Option<DateTime<Utc>>,
    pub last_bypass_cdn_bytes: i64,

    pub fup_level: u8,
    pub monthly_fup_level: u8,
}

impl Subscriber {
    /// A subscriber is online iff it has an open session *or* the
    /// reconciler saw it within the last 5 minutes — see §3's invariant.
    pub fn is_online_by_sync(&self, now: DateTime<Utc>) -> bool {
        self.is_online
            || self
                .last_quota_sync
                .is_some_and(|t| now - t < chrono::Duration::minutes(5))
    }

    /// Highest effective FUP level across the daily and monthly tracks;
    /// ties favor the slower (higher-numbered) tier per §4.3.i.
    pub fn effective_fup_level(&self) -> u8 {
        self.fup_level.max(self.monthly_fup_level)
    }
}

/// `radreply` row — the single source of truth for the rate a subscriber
/// receives on their *next* reconnect. The reconciler overwrites it on
/// every rate change, ahead of attempting any in-session push (§8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadReply {
    pub username: String,
    pub attribute: String,
    pub value: String,
}

impl RadReply {
    pub const MIKROTIK_RATE_LIMIT: &'static str = "Mikrotik-Rate-Limit";

    pub fn rate_limit(username: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            attribute: Self::MIKROTIK_RATE_LIMIT.to_string(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_level_is_the_max() {
        let mut s = sample();
        s.fup_level = 1;
        s.monthly_fup_level = 3;
        assert_eq!(s.effective_fup_level(), 3);
    }

    #[test]
    fn online_by_recent_sync_even_if_flag_false() {
        let mut s = sample();
        s.is_online = false;
        s.last_quota_sync = Some(Utc::now() - chrono::Duration::minutes(1));
        assert!(s.is_online_by_sync(Utc::now()));
    }

    #[test]
    fn not_online_when_sync_stale() {
        let mut s = sample();
        s.is_online = false;
        s.last_quota_sync = Some(Utc::now() - chrono::Duration::minutes(10));
        assert!(!s.is_online_by_sync(Utc::now()));
    }

    fn sample() -> Subscriber {
        Subscriber {
            id: Uuid::new_v4(),
            username: "alice".into(),
            full_name: "Alice".into(),
            email: "a@example.com".into(),
            phone: "".into(),
            service_id: Uuid::new_v4(),
            price: 0.0,
            expiry_date: Utc::now(),
            reseller_id: None,
            is_online: false,
            ip_address: None,
            static_ip: None,
            nas_id: None,
            last_session_download: 0,
            last_session_upload: 0,
            daily_download_used: 0,
            daily_upload_used: 0,
            monthly_download_used: 0,
            monthly_upload_used: 0,
            last_daily_reset: None,
            last_monthly_reset: None,
            last_quota_sync: None,
            last_bypass_cdn_bytes: 0,
            fup_level: 0,
            monthly_fup_level: 0,
        }
    }
}
