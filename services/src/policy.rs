use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use common::config::AppConfig;

/// Tunables of the check-in pipeline.
#[derive(Debug, Clone)]
pub struct CheckInPolicy {
    pub daily_limit: u32,
    /// Sessions that started longer ago than this are closed.
    pub expiry: Duration,
    pub window_early: Duration,
    pub window_late: Duration,
    /// Offset whose local midnight starts a calendar day.
    pub utc_offset: FixedOffset,
    pub upstream_timeout: std::time::Duration,
    pub streak_lookback_days: i64,
}

impl Default for CheckInPolicy {
    fn default() -> Self {
        Self {
            daily_limit: 5,
            expiry: Duration::hours(24),
            window_early: Duration::minutes(15),
            window_late: Duration::minutes(30),
            utc_offset: utc(),
            upstream_timeout: std::time::Duration::from_millis(1500),
            streak_lookback_days: 366,
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

impl CheckInPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            daily_limit: config.checkin_daily_limit,
            expiry: Duration::hours(config.checkin_expiry_hours),
            window_early: Duration::minutes(config.checkin_early_minutes),
            window_late: Duration::minutes(config.checkin_late_minutes),
            utc_offset: FixedOffset::east_opt(config.checkin_utc_offset_minutes * 60)
                .unwrap_or_else(utc),
            upstream_timeout: std::time::Duration::from_millis(config.upstream_timeout_ms),
            streak_lookback_days: config.streak_lookback_days,
        }
    }

    pub fn calendar_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }

    /// UTC bounds `[start, end)` of a calendar day.
    pub fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_midnight = day.and_time(NaiveTime::MIN);
        let offset = Duration::seconds(i64::from(self.utc_offset.local_minus_utc()));
        let start = Utc.from_utc_datetime(&(local_midnight - offset));
        (start, start + Duration::days(1))
    }
}
