//! Global time-window bandwidth rules and per-subscriber overrides.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time_window::{is_active_now, weekday_and_time_from, TimeWindow};

/// A global rule: activates a speed multiplier for every online subscriber
/// on one of `service_ids` during its time window. Lower `priority` wins
/// when multiple rules would otherwise apply to the same subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthRule {
    pub id: Uuid,
    pub service_ids: Vec<Uuid>,
    /// ISO weekday numbers (Monday = 1); empty means every day.
    pub days_of_week: Vec<u8>,
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
    /// Percent; 100 = identity.
    pub download_multiplier: u32,
    pub upload_multiplier: u32,
    pub priority: i32,
    pub enabled: bool,
    pub auto_apply: bool,
}

impl BandwidthRule {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(
            self.start_hour,
            self.start_minute,
            self.end_hour,
            self.end_minute,
        )
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let (weekday, time) = weekday_and_time_from(&now);
        is_active_now(&self.days_of_week, self.window(), weekday, time)
    }

    pub fn applies_to_service(&self, service_id: Uuid) -> bool {
        self.service_ids.contains(&service_id)
    }
}

/// `internet` overrides the subscriber's general rate; `cdn` overrides a
/// specific CDN's per-subscriber queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Internet,
    Cdn,
}

/// A per-subscriber override, active only inside its own `[start, end)`
/// window. Takes priority over FUP and global rules for the legs it
/// covers (§4.3.j, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberBandwidthRule {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub rule_type: RuleType,
    pub cdn_id: Option<Uuid>,
    pub download_speed_kbps: u32,
    pub upload_speed_kbps: u32,
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
    pub enabled: bool,
    pub priority: i32,
}

impl SubscriberBandwidthRule {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(
            self.start_hour,
            self.start_minute,
            self.end_hour,
            self.end_minute,
        )
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let (_, time) = weekday_and_time_from(&now);
        self.window().contains(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rule() -> BandwidthRule {
        BandwidthRule {
            id: Uuid::new_v4(),
            service_ids: vec![],
            days_of_week: vec![],
            start_hour: 20,
            start_minute: 0,
            end_hour: 23,
            end_minute: 0,
            download_multiplier: 150,
            upload_multiplier: 150,
            priority: 1,
            enabled: true,
            auto_apply: true,
        }
    }

    #[test]
    fn active_inside_window_every_day() {
        let r = rule();
        let inside = Utc.with_ymd_and_hms(2026, 7, 27, 21, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 7, 27, 10, 0, 0).unwrap();
        assert!(r.is_active_at(inside));
        assert!(!r.is_active_at(outside));
    }

    #[test]
    fn disabled_rule_never_active() {
        let mut r = rule();
        r.enabled = false;
        let inside = Utc.with_ymd_and_hms(2026, 7, 27, 21, 0, 0).unwrap();
        assert!(!r.is_active_at(inside));
    }
}
