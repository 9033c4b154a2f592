//! Effective fair-use-policy level and speed (§4.3.i).

use ispctl_core_model::Service;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FupOutcome {
    pub daily_level: u8,
    pub monthly_level: u8,
    pub level: u8,
    pub speed_kbps: Option<(u32, u32)>,
}

/// Highest of the daily and monthly FUP levels; when both tracks land on
/// the same level, the slower (lower download speed) of the two tier
/// speeds wins, per the hysteresis note in §4.3's invariants.
pub fn evaluate_fup(service: &Service, daily_used: i64, monthly_used: i64) -> FupOutcome {
    let daily_level = Service::fup_level_for(&service.daily_fup, daily_used);
    let monthly_level = Service::fup_level_for(&service.monthly_fup, monthly_used);
    let level = daily_level.max(monthly_level);
    if level == 0 {
        return FupOutcome {
            daily_level,
            monthly_level,
            ..FupOutcome::default()
        };
    }

    let daily_speed = (daily_level == level)
        .then(|| Service::fup_speed_kbps(&service.daily_fup, daily_level))
        .flatten();
    let monthly_speed = (monthly_level == level)
        .then(|| Service::fup_speed_kbps(&service.monthly_fup, monthly_level))
        .flatten();

    FupOutcome {
        daily_level,
        monthly_level,
        level,
        speed_kbps: slower_of(daily_speed, monthly_speed),
    }
}

fn slower_of(a: Option<(u32, u32)>, b: Option<(u32, u32)>) -> Option<(u32, u32)> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a.1 <= b.1 { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ispctl_core_model::FupTier;
    use uuid::Uuid;

    fn service() -> Service {
        Service {
            id: Uuid::new_v4(),
            name: "svc".into(),
            download_speed_kbps: 10_000,
            upload_speed_kbps: 10_000,
            daily_fup: [
                FupTier { threshold_bytes: 1_000_000_000, download_kbps: 2000, upload_kbps: 2000 },
                FupTier { threshold_bytes: 5_000_000_000, download_kbps: 500, upload_kbps: 500 },
                FupTier::default(),
            ],
            monthly_fup: [
                FupTier { threshold_bytes: 50_000_000_000, download_kbps: 1000, upload_kbps: 1000 },
                FupTier::default(),
                FupTier::default(),
            ],
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
    fn no_usage_means_no_fup() {
        let outcome = evaluate_fup(&service(), 0, 0);
        assert_eq!(outcome.level, 0);
        assert_eq!(outcome.speed_kbps, None);
    }

    #[test]
    fn daily_tier_alone_wins() {
        let outcome = evaluate_fup(&service(), 2_000_000_000, 0);
        assert_eq!(outcome.level, 1);
        assert_eq!(outcome.speed_kbps, Some((2000, 2000)));
    }

    #[test]
    fn higher_track_wins_when_they_differ() {
        let outcome = evaluate_fup(&service(), 6_000_000_000, 0);
        assert_eq!(outcome.level, 2);
        assert_eq!(outcome.speed_kbps, Some((500, 500)));
    }

    #[test]
    fn tie_on_level_picks_the_slower_speed() {
        // daily level 1 (2000/2000) vs monthly level 1 (1000/1000): same
        // level, monthly's speed is slower and should win.
        let outcome = evaluate_fup(&service(), 2_000_000_000, 50_000_000_000);
        assert_eq!(outcome.level, 1);
        assert_eq!(outcome.speed_kbps, Some((1000, 1000)));
    }
}
