//! Pure byte-counting helpers used by the per-subscriber tick (§4.3.c/e).

/// `cur − baseline`, treating a counter that dropped below its baseline as
/// a fresh session (router counters reset to zero on reconnect) rather
/// than letting it underflow.
pub fn wrapping_delta(current: i64, baseline: i64) -> i64 {
    if current >= baseline {
        current - baseline
    } else {
        current
    }
}

/// Applies the free-hour discount percentage to a byte delta.
pub fn apply_free_percent(delta: i64, free_percent: u8) -> i64 {
    let free_percent = free_percent.min(100) as i64;
    delta * (100 - free_percent) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_increase_is_the_difference() {
        assert_eq!(wrapping_delta(1_500, 1_000), 500);
    }

    #[test]
    fn counter_drop_means_new_session_counts_from_zero() {
        assert_eq!(wrapping_delta(200, 1_000), 200);
    }

    #[test]
    fn hundred_percent_free_zeroes_the_delta() {
        assert_eq!(apply_free_percent(1_000, 100), 0);
    }

    #[test]
    fn zero_percent_free_is_the_identity() {
        assert_eq!(apply_free_percent(1_000, 0), 1_000);
    }

    #[test]
    fn partial_discount() {
        assert_eq!(apply_free_percent(1_000, 25), 750);
    }
}
