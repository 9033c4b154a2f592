//! Quota-warning threshold check (§4.3.l). The real `communication_rules`
//! table (percent-threshold-per-service, `days_before` interpreted as a
//! percent) lives behind the out-of-scope admin API; absent a typed
//! accessor for it, the reconciler uses the service's own tier-1 FUP
//! threshold as the "quota" reference and a fixed default percent. The
//! service id doubles as the dedup key's `rule_id` since there is no
//! separate rule row to key on.

use chrono::{DateTime, Datelike, Utc};
use ispctl_core_model::Service;
use ispctl_notification::NotificationEvent;
use uuid::Uuid;

pub const DEFAULT_WARNING_PERCENT: u8 = 80;

/// Builds a `QuotaWarning` event when `daily_used` has crossed
/// `DEFAULT_WARNING_PERCENT` of the service's first enabled daily FUP
/// threshold, or `None` if there's no threshold to warn against or it
/// hasn't been crossed.
pub fn quota_warning_event(
    subscriber_id: Uuid,
    service: &Service,
    daily_used: i64,
    now: DateTime<Utc>,
) -> Option<NotificationEvent> {
    let threshold = service.daily_fup.iter().find(|t| t.is_enabled())?.threshold_bytes;
    if threshold <= 0 {
        return None;
    }
    let percent_used = (daily_used.saturating_mul(100) / threshold).clamp(0, 255) as u8;
    if percent_used < DEFAULT_WARNING_PERCENT {
        return None;
    }

    Some(NotificationEvent::QuotaWarning {
        subscriber_id,
        rule_id: service.id,
        percent_used,
        period: format!("{:04}-{:02}", now.year(), now.month()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ispctl_core_model::FupTier;

    fn service() -> Service {
        Service {
            id: Uuid::new_v4(),
            name: "svc".into(),
            download_speed_kbps: 10_000,
            upload_speed_kbps: 10_000,
            daily_fup: [
                FupTier { threshold_bytes: 1_000_000_000, download_kbps: 2000, upload_kbps: 2000 },
                FupTier::default(),
                FupTier::default(),
            ],
            monthly_fup: [FupTier::default(); 3],
            time_based_speed_enabled: false,
            time_from_hour: 0,
            time_from_minute: 0,
            time_to_hour: 0,
            time_to_minute: 0,
            time_download_ratio: 0,
            time_upload_ratio: 0,
            block_on_daily_quota_exceeded: false,
            block_on_monthly_quota_exceeded: false,
        }
    }

    #[test]
    fn no_warning_below_threshold_percent() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        assert!(quota_warning_event(Uuid::new_v4(), &service(), 500_000_000, now).is_none());
    }

    #[test]
    fn warning_once_eighty_percent_crossed() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let event = quota_warning_event(Uuid::new_v4(), &service(), 850_000_000, now).unwrap();
        match event {
            NotificationEvent::QuotaWarning { percent_used, period, .. } => {
                assert_eq!(percent_used, 85);
                assert_eq!(period, "2026-07");
            }
            _ => panic!("expected QuotaWarning"),
        }
    }

    #[test]
    fn warning_dedup_period_is_month_grained() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let later_same_month = Utc.with_ymd_and_hms(2026, 7, 30, 23, 0, 0).unwrap();
        let first = quota_warning_event(Uuid::new_v4(), &service(), 850_000_000, now).unwrap();
        let second = quota_warning_event(Uuid::new_v4(), &service(), 900_000_000, later_same_month).unwrap();
        match (first, second) {
            (NotificationEvent::QuotaWarning { period: p1, .. }, NotificationEvent::QuotaWarning { period: p2, .. }) => {
                assert_eq!(p1, p2, "same month must dedup to the same period key");
            }
            _ => panic!("expected QuotaWarning"),
        }
    }
}
