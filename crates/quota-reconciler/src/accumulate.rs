//! Daily/monthly counter accumulation (§4.3.f/g).

#[derive(Debug, Clone, Copy)]
pub struct Counters {
    pub download: i64,
    pub upload: i64,
}

/// Daily counters reset to the counted delta exactly once per reset
/// boundary (`daily_reset_crossed`) or whenever the subscriber row was
/// concurrently reset by someone else (`was_reset`); otherwise they add.
pub fn accumulate_daily(
    current: Counters,
    counted: Counters,
    daily_reset_crossed: bool,
    was_reset: bool,
) -> Counters {
    if daily_reset_crossed || was_reset {
        counted
    } else {
        Counters {
            download: current.download + counted.download,
            upload: current.upload + counted.upload,
        }
    }
}

/// Monthly counters freeze entirely during a fully-free hour
/// (`free_percent == 100`); otherwise they reset on a `YYYY-MM` change or
/// add like the daily track.
pub fn accumulate_monthly(
    current: Counters,
    counted: Counters,
    month_changed: bool,
    free_percent: u8,
) -> Counters {
    if free_percent >= 100 {
        return current;
    }
    if month_changed {
        counted
    } else {
        Counters {
            download: current.download + counted.download,
            upload: current.upload + counted.upload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_adds_when_not_crossed() {
        let result = accumulate_daily(
            Counters { download: 100, upload: 50 },
            Counters { download: 10, upload: 5 },
            false,
            false,
        );
        assert_eq!(result.download, 110);
        assert_eq!(result.upload, 55);
    }

    #[test]
    fn daily_resets_to_counted_on_crossing() {
        let result = accumulate_daily(
            Counters { download: 100, upload: 50 },
            Counters { download: 10, upload: 5 },
            true,
            false,
        );
        assert_eq!(result.download, 10);
        assert_eq!(result.upload, 5);
    }

    #[test]
    fn daily_resets_to_counted_when_externally_reset() {
        let result = accumulate_daily(
            Counters { download: 100, upload: 50 },
            Counters { download: 10, upload: 5 },
            false,
            true,
        );
        assert_eq!(result.download, 10);
    }

    #[test]
    fn monthly_frozen_during_fully_free_hour() {
        let result = accumulate_monthly(
            Counters { download: 100, upload: 50 },
            Counters { download: 10, upload: 5 },
            false,
            100,
        );
        assert_eq!(result.download, 100);
        assert_eq!(result.upload, 50);
    }

    #[test]
    fn monthly_resets_on_month_change() {
        let result = accumulate_monthly(
            Counters { download: 100, upload: 50 },
            Counters { download: 10, upload: 5 },
            true,
            0,
        );
        assert_eq!(result.download, 10);
    }
}
