//! Service plan templates: base speeds, three-tier fair-use policy and the
//! free-hour / time-boost window.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::time_window::TimeWindow;

/// One fair-use-policy tier: once `threshold_bytes` of usage is crossed,
/// the subscriber's rate drops to `download_kbps`/`upload_kbps` until the
/// next reset. A tier with `threshold_bytes == 0` is disabled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct FupTier {
    pub threshold_bytes: i64,
    pub download_kbps: u32,
    pub upload_kbps: u32,
}

impl FupTier {
    pub fn is_enabled(&self) -> bool {
        self.threshold_bytes > 0
    }
}

/// A commercial plan. `daily_fup` and `monthly_fup` are ordered tier 1..3,
/// evaluated from the highest index down in §4.3.i.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,

    pub download_speed_kbps: u32,
    pub upload_speed_kbps: u32,

    pub daily_fup: [FupTier; 3],
    pub monthly_fup: [FupTier; 3],

    pub time_based_speed_enabled: bool,
    pub time_from_hour: u8,
    pub time_from_minute: u8,
    pub time_to_hour: u8,
    pub time_to_minute: u8,
    /// Free-percentage applied to quota counting during the window
    /// (§4.3.e): `counted = delta * (100 - ratio) / 100`.
    pub time_download_ratio: u8,
    /// Boost-percentage applied to the rate during the window (§4.3.j):
    /// `boosted = base * (100 + ratio) / 100`.
    pub time_upload_ratio: u8,

    pub block_on_daily_quota_exceeded: bool,
    pub block_on_monthly_quota_exceeded: bool,
}

impl Service {
    pub fn free_hour_window(&self) -> Option<TimeWindow> {
        self.time_based_speed_enabled.then(|| {
            TimeWindow::new(
                self.time_from_hour,
                self.time_from_minute,
                self.time_to_hour,
                self.time_to_minute,
            )
        })
    }

    /// Highest tier (3, 2, 1) whose threshold is enabled and crossed by
    /// `used_bytes`, or `0` if none apply.
    pub fn fup_level_for(tiers: &[FupTier; 3], used_bytes: i64) -> u8 {
        for (idx, tier) in tiers.iter().enumerate().rev() {
            if tier.is_enabled() && used_bytes >= tier.threshold_bytes {
                return (idx + 1) as u8;
            }
        }
        0
    }

    pub fn fup_speed_kbps(tiers: &[FupTier; 3], level: u8) -> Option<(u32, u32)> {
        if level == 0 {
            return None;
        }
        let tier = tiers.get(level as usize - 1)?;
        Some((tier.upload_kbps, tier.download_kbps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> [FupTier; 3] {
        [
            FupTier {
                threshold_bytes: 1_000_000_000,
                download_kbps: 2000,
                upload_kbps: 2000,
            },
            FupTier {
                threshold_bytes: 5_000_000_000,
                download_kbps: 500,
                upload_kbps: 500,
            },
            FupTier::default(),
        ]
    }

    #[test]
    fn fup_tier_transition_from_4_9gb_to_5_1gb() {
        let t = tiers();
        assert_eq!(Service::fup_level_for(&t, 4_900_000_000), 1);
        assert_eq!(Service::fup_level_for(&t, 5_100_000_000), 2);
        assert_eq!(Service::fup_speed_kbps(&t, 2), Some((500, 500)));
    }

    #[test]
    fn disabled_tier_is_skipped() {
        let t = tiers();
        assert_eq!(Service::fup_level_for(&t, 50_000_000_000), 2);
    }

    #[test]
    fn zero_usage_means_no_tier() {
        let t = tiers();
        assert_eq!(Service::fup_level_for(&t, 0), 0);
        assert_eq!(Service::fup_speed_kbps(&t, 0), None);
    }
}
