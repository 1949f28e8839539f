//! Once-per-day deduplication of check-ins.
//!
//! A fingerprint is the SHA-256 of `student:session:YYYY-MM-DD`, the date
//! being the calendar day of the request's reference instant. Reservation
//! relies on the store's atomic insert-if-absent so that concurrent requests
//! for the same fingerprint produce exactly one record.

use chrono::{FixedOffset, NaiveDate};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{CheckInError, UpstreamError};
use crate::model::{AttendanceContext, AttendanceRecord};
use crate::policy::CheckInPolicy;
use crate::sources::{AttendanceStore, Insertion, bounded};

fn recorded_offset(record: &AttendanceRecord) -> Option<FixedOffset> {
    let minutes = record.device_meta.as_ref()?.get("utc_offset_minutes")?.as_i64()?;
    FixedOffset::east_opt(i32::try_from(minutes).ok()?.checked_mul(60)?)
}

pub fn fingerprint(student_id: &str, session_id: &str, day: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{student_id}:{session_id}:{}", day.format("%Y-%m-%d")));
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// This request wrote the record.
    Fresh(AttendanceRecord),
    /// A record with the same fingerprint was already committed.
    Duplicate(AttendanceRecord),
}

pub struct DuplicateGuard {
    store: Arc<dyn AttendanceStore>,
    policy: CheckInPolicy,
}

impl DuplicateGuard {
    pub fn new(store: Arc<dyn AttendanceStore>, policy: CheckInPolicy) -> Self {
        Self { store, policy }
    }

    pub fn fingerprint(&self, context: &AttendanceContext) -> String {
        fingerprint(
            &context.student.id,
            &context.session.id,
            self.policy.calendar_day(context.load_started_at),
        )
    }

    /// Read-only lookup, used to answer replays without running the rules.
    pub async fn existing(&self, fingerprint: &str) -> Result<Option<AttendanceRecord>, UpstreamError> {
        bounded(
            "fingerprint lookup",
            self.policy.upstream_timeout,
            self.store.find_by_fingerprint(fingerprint),
        )
        .await
    }

    /// Inserts `record` unless its fingerprint is taken. Check and write are
    /// one atomic step in the store. A timeout may still have committed; the
    /// fingerprint turns the caller's retry into a duplicate.
    pub async fn check_and_reserve(&self, record: AttendanceRecord) -> Result<Reservation, UpstreamError> {
        let insertion = bounded(
            "attendance insert",
            self.policy.upstream_timeout,
            self.store.insert_if_absent(record),
        )
        .await?;
        Ok(match insertion {
            Insertion::Inserted(r) => Reservation::Fresh(r),
            Insertion::Existing(r) => Reservation::Duplicate(r),
        })
    }

    /// Recomputes the fingerprint from the record's own fields. The day is
    /// taken in the offset stamped on the record at write time, so changing
    /// the configured offset does not invalidate older records.
    pub fn verify(&self, record: &AttendanceRecord) -> Result<(), CheckInError> {
        let offset = recorded_offset(record).unwrap_or(self.policy.utc_offset);
        let expected = fingerprint(
            &record.student_id,
            &record.session_id,
            record.checked_at.with_timezone(&offset).date_naive(),
        );
        if expected == record.integrity_fingerprint {
            Ok(())
        } else {
            Err(CheckInError::Integrity {
                record_id: record.id.clone(),
                stored: record.integrity_fingerprint.clone(),
                expected,
            })
        }
    }
}
