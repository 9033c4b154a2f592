//! Per-subscriber daily/monthly reset-boundary detection (§4.3.f/g).
//!
//! This runs independently of the global `DailyResetWorker` snapshot: it
//! only decides whether *this subscriber's* counters need to roll over
//! before today's delta is added, using their own `last_daily_reset` /
//! `last_monthly_reset` stamps.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;

/// True if the most recent HH:MM reset boundary in `tz` is more recent
/// than `last_daily_reset` (or there has never been one).
pub fn daily_reset_crossed(
    last_daily_reset: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    reset_hour: u8,
    reset_minute: u8,
    tz: Tz,
) -> bool {
    let boundary = most_recent_boundary(now, reset_hour, reset_minute, tz);
    match last_daily_reset {
        None => true,
        Some(t) => t < boundary,
    }
}

fn most_recent_boundary(now: DateTime<Utc>, reset_hour: u8, reset_minute: u8, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let today = tz
        .with_ymd_and_hms(
            local.year(),
            local.month(),
            local.day(),
            reset_hour as u32,
            reset_minute as u32,
            0,
        )
        .single()
        .expect("reset time is unambiguous for a fixed HH:MM");

    let boundary = if today <= local { today } else { today - Duration::days(1) };
    boundary.with_timezone(&Utc)
}

/// True if `now`'s `YYYY-MM` (UTC) differs from `last_monthly_reset`'s.
pub fn month_changed(last_monthly_reset: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_monthly_reset {
        None => true,
        Some(t) => (t.year(), t.month()) != (now.year(), now.month()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::UTC;

    #[test]
    fn crosses_once_after_boundary_time() {
        let before = Utc.with_ymd_and_hms(2026, 7, 27, 3, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 7, 27, 4, 0, 0).unwrap();
        let last_reset = Utc.with_ymd_and_hms(2026, 7, 26, 4, 0, 0).unwrap();

        assert!(!daily_reset_crossed(Some(last_reset), before, 4, 0, UTC));
        assert!(daily_reset_crossed(Some(last_reset), after, 4, 0, UTC));
    }

    #[test]
    fn never_reset_always_crosses() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 10, 0, 0).unwrap();
        assert!(daily_reset_crossed(None, now, 4, 0, UTC));
    }

    #[test]
    fn month_boundary_detection() {
        let last = Utc.with_ymd_and_hms(2026, 6, 30, 23, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 1, 0, 0).unwrap();
        assert!(month_changed(Some(last), now));
        assert!(!month_changed(Some(now), now));
    }
}
