use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::UpstreamError;
use crate::policy::CheckInPolicy;
use crate::sources::{AttendanceStore, bounded};

/// Consecutive attended days ending on `today`. Zero when `today` itself has
/// no attendance.
pub fn consecutive_days(days: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let attended: BTreeSet<NaiveDate> = days.into_iter().collect();
    let mut streak = 0;
    let mut day = Some(today);
    while let Some(d) = day {
        if !attended.contains(&d) {
            break;
        }
        streak += 1;
        day = d.pred_opt();
    }
    streak
}

pub struct StreakCalculator {
    store: Arc<dyn AttendanceStore>,
    policy: CheckInPolicy,
}

impl StreakCalculator {
    pub fn new(store: Arc<dyn AttendanceStore>, policy: CheckInPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn streak(&self, student_id: &str, now: DateTime<Utc>) -> Result<u32, UpstreamError> {
        let today = self.policy.calendar_day(now);
        let (since, _) = self
            .policy
            .day_bounds(today - Duration::days(self.policy.streak_lookback_days));
        let history = bounded(
            "attendance history",
            self.policy.upstream_timeout,
            self.store.checked_at_since(student_id, since),
        )
        .await?;
        Ok(consecutive_days(
            history.into_iter().map(|at| self.policy.calendar_day(at)),
            today,
        ))
    }
}
