//! Snapshots yesterday's daily usage and zeroes daily counters at a
//! configured local time, once per day (§4.6).

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use ispctl_persistence::PersistenceGateway;
use ispctl_utils::{HealthRegistry, HealthStatus};
use log::{error, info};
use tokio::sync::watch;

use crate::error::MaintenanceError;

const COMPONENT: &str = "daily_reset_worker";

pub struct DailyResetWorker {
    gateway: Arc<dyn PersistenceGateway>,
    timezone: Tz,
    reset_hour: u8,
    reset_minute: u8,
    last_run_date: Option<NaiveDate>,
    health: Option<Arc<HealthRegistry>>,
}

impl DailyResetWorker {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, timezone: Tz, reset_hour: u8, reset_minute: u8) -> Self {
        Self {
            gateway,
            timezone,
            reset_hour,
            reset_minute,
            last_run_date: None,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!("daily reset worker started (reset at {:02}:{:02} {})", self.reset_hour, self.reset_minute, self.timezone);
        let mut ticker = tokio::time::interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick_now().await {
                        Ok(()) => {
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Healthy, None);
                            }
                        }
                        Err(e) => {
                            error!("daily reset tick failed: {e}");
                            if let Some(h) = &self.health {
                                h.report(COMPONENT, HealthStatus::Degraded, Some(e.to_string()));
                            }
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("daily reset worker stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn tick_now(&mut self) -> Result<(), MaintenanceError> {
        let now = self.timezone.from_utc_datetime(&chrono::Utc::now().naive_utc());
        if !should_reset(
            now.date_naive(),
            now.time(),
            self.reset_hour,
            self.reset_minute,
            self.last_run_date,
        ) {
            return Ok(());
        }

        let yesterday = now.date_naive() - chrono::Duration::days(1);
        info!("running daily reset, snapshotting {yesterday}");
        self.gateway.snapshot_and_reset_daily_usage(yesterday).await?;
        self.last_run_date = Some(now.date_naive());
        Ok(())
    }
}

/// True exactly once per day: when `now_time` has reached the configured
/// HH:MM and the reset hasn't already run for `now_date`.
fn should_reset(
    now_date: NaiveDate,
    now_time: NaiveTime,
    reset_hour: u8,
    reset_minute: u8,
    last_run_date: Option<NaiveDate>,
) -> bool {
    if last_run_date == Some(now_date) {
        return false;
    }
    let target = NaiveTime::from_hms_opt(reset_hour as u32, reset_minute as u32, 0).unwrap();
    now_time >= target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_crossing_the_target_time() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let before = NaiveTime::from_hms_opt(3, 59, 0).unwrap();
        let after = NaiveTime::from_hms_opt(4, 0, 0).unwrap();

        assert!(!should_reset(date, before, 4, 0, None));
        assert!(should_reset(date, after, 4, 0, None));
        assert!(!should_reset(date, after, 4, 0, Some(date)));
    }

    #[test]
    fn fires_again_on_a_new_day() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let next_day = date + chrono::Duration::days(1);
        let after = NaiveTime::from_hms_opt(4, 0, 0).unwrap();

        assert!(should_reset(next_day, after, 4, 0, Some(date)));
    }
}
