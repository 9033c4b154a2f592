//! Wall-clock window matching shared by free-hour discounts, time-based
//! boosts and global bandwidth rules. All three need the same
//! cross-midnight-aware "is `now` inside [start, end)" test.

use chrono::{Datelike, NaiveTime, Timelike, Weekday};

/// An HH:MM–HH:MM window that may cross midnight (`end < start`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
}

impl TimeWindow {
    pub fn new(start_hour: u8, start_minute: u8, end_hour: u8, end_minute: u8) -> Self {
        Self {
            start_hour,
            start_minute,
            end_hour,
            end_minute,
        }
    }

    fn start(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour as u32, self.start_minute as u32, 0)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap())
    }

    fn end(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.end_hour as u32, self.end_minute as u32, 0)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap())
    }

    /// `start <= end` is a same-day window; `start > end` wraps through
    /// midnight (e.g. 22:00–06:00).
    pub fn contains(&self, now: NaiveTime) -> bool {
        let (start, end) = (self.start(), self.end());
        if start <= end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }
}

/// Parses a `days_of_week` column where an empty list means "every day".
/// Values are ISO weekday numbers, Monday = 1 .. Sunday = 7, matching the
/// teacher's `chrono::Weekday::number_from_monday`.
pub fn day_matches(days_of_week: &[u8], today: Weekday) -> bool {
    days_of_week.is_empty() || days_of_week.contains(&(today.number_from_monday() as u8))
}

/// Active-now test combining day-of-week filtering with the HH:MM window,
/// the exact predicate bandwidth rules and subscriber rules both need.
pub fn is_active_now(
    days_of_week: &[u8],
    window: TimeWindow,
    now_weekday: Weekday,
    now_time: NaiveTime,
) -> bool {
    day_matches(days_of_week, now_weekday) && window.contains(now_time)
}

pub fn weekday_and_time_from(dt: &chrono::DateTime<chrono::Utc>) -> (Weekday, NaiveTime) {
    (dt.weekday(), NaiveTime::from_hms_opt(dt.hour(), dt.minute(), dt.second()).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn same_day_window() {
        let w = TimeWindow::new(0, 0, 6, 0);
        assert!(w.contains(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(6, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
    }

    #[test]
    fn midnight_wrap_window() {
        let w = TimeWindow::new(22, 0, 6, 0);
        assert!(w.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn empty_days_matches_every_day() {
        assert!(day_matches(&[], Weekday::Sun));
        assert!(!day_matches(&[1, 2, 3], Weekday::Sun));
        assert!(day_matches(&[7], Weekday::Sun));
    }
}
