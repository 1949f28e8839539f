//! Collaborators the check-in pipeline depends on.
//!
//! Each is a trait object so the production SeaORM store, in-memory doubles
//! and remote backends can be swapped without touching the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::UpstreamError;
use crate::model::{AttendanceRecord, Plan, Session, Student};
use crate::policy::CheckInPolicy;

/// Awaits a collaborator call for at most `timeout`. Expiry surfaces as
/// `UpstreamError::Timeout`, which callers treat as transient.
pub(crate) async fn bounded<T>(
    operation: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, UpstreamError>>,
) -> Result<T, UpstreamError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| UpstreamError::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        })?
}

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// `UpstreamError::NotFound` when no such student exists.
    async fn student(&self, student_id: &str) -> Result<Student, UpstreamError>;
}

#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn session(&self, session_id: &str) -> Result<Session, UpstreamError>;
}

#[async_trait]
pub trait PlanDirectory: Send + Sync {
    /// Plans of `student_id` that are active at `now`.
    async fn active_plans(
        &self,
        student_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Plan>, UpstreamError>;
}

/// Result of an atomic insert-if-absent keyed by fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    Inserted(AttendanceRecord),
    /// Another writer committed this fingerprint first.
    Existing(AttendanceRecord),
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<AttendanceRecord>, UpstreamError>;

    /// Must be atomic: of N concurrent calls with the same fingerprint,
    /// exactly one returns `Inserted`.
    async fn insert_if_absent(&self, record: AttendanceRecord) -> Result<Insertion, UpstreamError>;

    /// `checked_at` of the student's records at or after `since`, newest first.
    async fn checked_at_since(
        &self,
        student_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, UpstreamError>;

    async fn count_between(
        &self,
        student_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, UpstreamError>;
}

/// Attendance count per student and calendar day.
#[async_trait]
pub trait DailyCounter: Send + Sync {
    async fn count_on_day(&self, student_id: &str, at: DateTime<Utc>) -> Result<u32, UpstreamError>;
}

/// Daily counter derived from the durable records themselves.
pub struct RecordDailyCounter {
    store: Arc<dyn AttendanceStore>,
    policy: CheckInPolicy,
}

impl RecordDailyCounter {
    pub fn new(store: Arc<dyn AttendanceStore>, policy: CheckInPolicy) -> Self {
        Self { store, policy }
    }
}

#[async_trait]
impl DailyCounter for RecordDailyCounter {
    async fn count_on_day(&self, student_id: &str, at: DateTime<Utc>) -> Result<u32, UpstreamError> {
        let (from, to) = self.policy.day_bounds(self.policy.calendar_day(at));
        let count = self.store.count_between(student_id, from, to).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
