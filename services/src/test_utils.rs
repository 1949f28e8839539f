//! In-memory collaborators and fixtures for exercising the pipeline without
//! a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::UpstreamError;
use crate::events::{AttendanceEvent, EventSink};
use crate::model::{AttendanceRecord, Plan, PlanStatus, Session, SessionStatus, Student};
use crate::policy::CheckInPolicy;
use crate::recorder::{AttendanceRecorder, Collaborators};
use crate::sources::{
    AttendanceStore, Clock, Insertion, PlanDirectory, SessionDirectory, StudentDirectory,
};

pub const STUDENT_ID: &str = "0b6c3f7e-2d1a-4c5b-9e8f-1a2b3c4d5e6f";
pub const SESSION_ID: &str = "c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f";

/// Clock whose time only moves when told to.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Store operations that can be made to misbehave one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FindByFingerprint,
    InsertIfAbsent,
    CheckedAtSince,
    CountBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with a non-transient store error.
    Error,
    /// Never answer.
    Stall,
}

/// Every directory and the attendance store in one place. The record map is
/// keyed by fingerprint and guarded by a mutex, so `insert_if_absent` is
/// atomic the way a unique index is.
#[derive(Default)]
pub struct MemoryBackend {
    students: Mutex<HashMap<String, Student>>,
    sessions: Mutex<HashMap<String, Session>>,
    plans: Mutex<HashMap<String, Vec<Plan>>>,
    records: Mutex<HashMap<String, AttendanceRecord>>,
    offline: AtomicBool,
    slow_sessions: Mutex<Option<std::time::Duration>>,
    faults: Mutex<HashMap<StoreOp, Fault>>,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_student(&self, id: &str) {
        self.students.lock().unwrap().insert(
            id.to_owned(),
            Student {
                id: id.to_owned(),
                name: format!("Student {}", &id[..8.min(id.len())]),
                active: true,
                created_at: Utc::now(),
            },
        );
    }

    pub fn add_session(&self, id: &str, course_id: &str, start_at: DateTime<Utc>, status: SessionStatus) {
        self.sessions.lock().unwrap().insert(
            id.to_owned(),
            Session {
                id: id.to_owned(),
                course_id: course_id.to_owned(),
                title: format!("{course_id} class"),
                start_at,
                status,
            },
        );
    }

    /// Adds an active plan valid for 30 days around `now`.
    pub fn add_plan(&self, student_id: &str, plan_id: &str, courses: &[&str], now: DateTime<Utc>) {
        self.add_plan_with(
            student_id,
            Plan {
                id: plan_id.to_owned(),
                status: PlanStatus::Active,
                start_date: now - Duration::days(15),
                end_date: now + Duration::days(15),
                courses: courses.iter().map(|c| c.to_string()).collect(),
            },
        );
    }

    pub fn add_plan_with(&self, student_id: &str, plan: Plan) {
        self.plans
            .lock()
            .unwrap()
            .entry(student_id.to_owned())
            .or_default()
            .push(plan);
    }

    pub fn add_record(&self, record: AttendanceRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.integrity_fingerprint.clone(), record);
    }

    /// Every call fails with `Unreachable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn delay_sessions(&self, delay: std::time::Duration) {
        *self.slow_sessions.lock().unwrap() = Some(delay);
    }

    /// Makes only `op` misbehave, leaving every other call healthy.
    pub fn inject(&self, op: StoreOp, fault: Fault) {
        self.faults.lock().unwrap().insert(op, fault);
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        let mut records: Vec<_> = self.records.lock().unwrap().values().cloned().collect();
        records.sort_by_key(|r| r.checked_at);
        records
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            Err(UpstreamError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }

    async fn enter_store(&self, op: StoreOp) -> Result<(), UpstreamError> {
        self.enter()?;
        let fault = self.faults.lock().unwrap().get(&op).copied();
        match fault {
            None => Ok(()),
            Some(Fault::Error) => Err(UpstreamError::Store(format!("{op:?} failed"))),
            Some(Fault::Stall) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl StudentDirectory for MemoryBackend {
    async fn student(&self, student_id: &str) -> Result<Student, UpstreamError> {
        self.enter()?;
        self.students
            .lock()
            .unwrap()
            .get(student_id)
            .cloned()
            .ok_or_else(|| UpstreamError::not_found("student", student_id))
    }
}

#[async_trait]
impl SessionDirectory for MemoryBackend {
    async fn session(&self, session_id: &str) -> Result<Session, UpstreamError> {
        self.enter()?;
        let delay = *self.slow_sessions.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| UpstreamError::not_found("session", session_id))
    }
}

#[async_trait]
impl PlanDirectory for MemoryBackend {
    /// Returns every stored plan unfiltered, like a sloppy upstream would.
    async fn active_plans(
        &self,
        student_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Plan>, UpstreamError> {
        self.enter()?;
        Ok(self
            .plans
            .lock()
            .unwrap()
            .get(student_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AttendanceStore for MemoryBackend {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<AttendanceRecord>, UpstreamError> {
        self.enter_store(StoreOp::FindByFingerprint).await?;
        Ok(self.records.lock().unwrap().get(fingerprint).cloned())
    }

    async fn insert_if_absent(&self, record: AttendanceRecord) -> Result<Insertion, UpstreamError> {
        self.enter_store(StoreOp::InsertIfAbsent).await?;
        // Yield so concurrent callers interleave between lookup and insert.
        tokio::task::yield_now().await;
        let mut records = self.records.lock().unwrap();
        match records.get(&record.integrity_fingerprint) {
            Some(existing) => Ok(Insertion::Existing(existing.clone())),
            None => {
                records.insert(record.integrity_fingerprint.clone(), record.clone());
                Ok(Insertion::Inserted(record))
            }
        }
    }

    async fn checked_at_since(
        &self,
        student_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, UpstreamError> {
        self.enter_store(StoreOp::CheckedAtSince).await?;
        let mut times: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.student_id == student_id && r.checked_at >= since)
            .map(|r| r.checked_at)
            .collect();
        times.sort_by(|a, b| b.cmp(a));
        Ok(times)
    }

    async fn count_between(
        &self,
        student_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, UpstreamError> {
        self.enter_store(StoreOp::CountBetween).await?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.student_id == student_id && r.checked_at >= from && r.checked_at < to)
            .count() as u64)
    }
}

/// Event sink that remembers what it was given.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<AttendanceEvent>>);

impl RecordingSink {
    pub fn events(&self) -> Vec<AttendanceEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: AttendanceEvent) -> usize {
        self.0.lock().unwrap().push(event);
        1
    }
}

pub fn recorder_for(backend: Arc<MemoryBackend>, clock: Arc<FixedClock>) -> AttendanceRecorder {
    let policy = CheckInPolicy {
        upstream_timeout: std::time::Duration::from_millis(200),
        ..CheckInPolicy::default()
    };
    AttendanceRecorder::new(Collaborators::from_backend(backend, clock, &policy), policy)
}

/// A student with one unrestricted plan and a session that started five
/// minutes before `now`.
pub fn seeded_backend(now: DateTime<Utc>) -> Arc<MemoryBackend> {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_session(SESSION_ID, "course-bjj", now - Duration::minutes(5), SessionStatus::Scheduled);
    backend.add_plan(STUDENT_ID, "plan-open", &[], now);
    backend
}
