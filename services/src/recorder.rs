//! The check-in façade.
//!
//! `checkin` runs validation, context loading, rule evaluation and the
//! atomic reservation in that order. Nothing is written before the
//! reservation, and the reservation is the write. Streak and post-commit
//! hooks run afterwards and never turn a committed check-in into a failure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context_loader::ContextLoader;
use crate::duplicate_guard::{DuplicateGuard, Reservation};
use crate::error::CheckInError;
use crate::hooks::{self, PostCommitHook};
use crate::input_validator::{CheckInRequest, Device, InputValidator, Trigger, ValidCheckIn};
use crate::model::{AttendanceContext, AttendanceRecord, AttendanceStatus, Source};
use crate::policy::CheckInPolicy;
use crate::rule_engine::{Approval, BusinessRuleEngine};
use crate::rules::RuleResult;
use crate::sources::{
    AttendanceStore, Clock, DailyCounter, PlanDirectory, RecordDailyCounter, SessionDirectory,
    StudentDirectory,
};
use crate::streak::StreakCalculator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInSuccess {
    pub attendance_id: String,
    pub student_id: String,
    pub session_id: String,
    pub checked_at: DateTime<Utc>,
    pub streak: u32,
    pub warnings: Vec<RuleResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInDuplicate {
    pub attendance_id: String,
    pub original_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOutcome {
    Success(CheckInSuccess),
    Duplicate(CheckInDuplicate),
}

/// Who recorded the check-in, from the client's context. No context or an
/// automatic trigger means an integration call.
pub fn infer_source(device: Option<Device>, trigger: Option<Trigger>) -> Source {
    match (device, trigger) {
        (None, _) | (_, Some(Trigger::Auto)) => Source::Api,
        (Some(Device::Desktop), _) => Source::Operator,
        (Some(Device::Kiosk | Device::Mobile), _) => Source::SelfService,
    }
}

/// Everything the recorder talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub students: Arc<dyn StudentDirectory>,
    pub sessions: Arc<dyn SessionDirectory>,
    pub plans: Arc<dyn PlanDirectory>,
    pub store: Arc<dyn AttendanceStore>,
    pub counter: Arc<dyn DailyCounter>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Wires one backend that serves every lookup, counting daily attendance
    /// from its records.
    pub fn from_backend<B>(backend: Arc<B>, clock: Arc<dyn Clock>, policy: &CheckInPolicy) -> Self
    where
        B: StudentDirectory + SessionDirectory + PlanDirectory + AttendanceStore + 'static,
    {
        let store: Arc<dyn AttendanceStore> = backend.clone();
        Self {
            students: backend.clone(),
            sessions: backend.clone(),
            plans: backend,
            counter: Arc::new(RecordDailyCounter::new(store.clone(), policy.clone())),
            store,
            clock,
        }
    }
}

pub struct AttendanceRecorder {
    validator: InputValidator,
    loader: ContextLoader,
    engine: BusinessRuleEngine,
    guard: DuplicateGuard,
    streaks: StreakCalculator,
    hooks: Vec<Arc<dyn PostCommitHook>>,
    clock: Arc<dyn Clock>,
    policy: CheckInPolicy,
}

impl AttendanceRecorder {
    pub fn new(collaborators: Collaborators, policy: CheckInPolicy) -> Self {
        let Collaborators {
            students,
            sessions,
            plans,
            store,
            counter,
            clock,
        } = collaborators;

        Self {
            validator: InputValidator,
            loader: ContextLoader::new(
                students,
                sessions,
                plans,
                clock.clone(),
                policy.upstream_timeout,
            ),
            engine: BusinessRuleEngine::new(counter, policy.clone()),
            guard: DuplicateGuard::new(store.clone(), policy.clone()),
            streaks: StreakCalculator::new(store, policy.clone()),
            hooks: Vec::new(),
            clock,
            policy,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn checkin(&self, request: &CheckInRequest) -> Result<CheckInOutcome, CheckInError> {
        let valid = self.validator.validate(request).inspect_err(|failure| {
            warn!(violations = ?failure.violations, "checkin.invalid");
        })?;

        let context = self.loader.load(&valid).await.inspect_err(|err| {
            warn!(
                student_id = %valid.student_id,
                session_id = %valid.session_id,
                error = %err,
                "checkin.upstream_failure"
            );
        })?;
        if !context.student.active {
            info!(student_id = %context.student.id, "Inactive student is checking in");
        }

        let approval = self.engine.evaluate(&context).await.inspect_err(|rule| {
            info!(
                student_id = %valid.student_id,
                session_id = %valid.session_id,
                code = %rule.code,
                "checkin.blocked"
            );
        })?;

        let fingerprint = self.guard.fingerprint(&context);
        if let Some(existing) = self.guard.existing(&fingerprint).await? {
            return self.duplicate(existing);
        }

        let draft = self.draft_record(&valid, &context, &approval, fingerprint);
        let record = match self.guard.check_and_reserve(draft).await.inspect_err(|err| {
            warn!(student_id = %valid.student_id, error = %err, "checkin.upstream_failure");
        })? {
            Reservation::Fresh(record) => record,
            Reservation::Duplicate(existing) => return self.duplicate(existing),
        };

        let streak = self.best_effort_streak(&record.student_id, context.load_started_at).await;
        hooks::run_detached(&self.hooks, &record);

        info!(
            attendance_id = %record.id,
            student_id = %record.student_id,
            session_id = %record.session_id,
            source = %record.source,
            streak,
            warnings = approval.warnings.len(),
            latency_ms = self.latency_ms(&context),
            "checkin.success"
        );

        Ok(CheckInOutcome::Success(CheckInSuccess {
            attendance_id: record.id,
            student_id: record.student_id,
            session_id: record.session_id,
            checked_at: record.checked_at,
            streak,
            warnings: approval.warnings,
        }))
    }

    /// Current streak of a student, as of now.
    pub async fn streak(&self, student_id: &str) -> Result<u32, CheckInError> {
        Ok(self.streaks.streak(student_id, self.clock.now()).await?)
    }

    fn duplicate(&self, existing: AttendanceRecord) -> Result<CheckInOutcome, CheckInError> {
        self.guard.verify(&existing).inspect_err(|err| {
            tracing::error!(attendance_id = %existing.id, error = %err, "checkin.integrity_mismatch");
        })?;

        info!(
            attendance_id = %existing.id,
            student_id = %existing.student_id,
            session_id = %existing.session_id,
            "checkin.duplicate"
        );
        Ok(CheckInOutcome::Duplicate(CheckInDuplicate {
            attendance_id: existing.id,
            original_time: existing.checked_at,
        }))
    }

    fn draft_record(
        &self,
        valid: &ValidCheckIn,
        context: &AttendanceContext,
        approval: &Approval,
        fingerprint: String,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            student_id: context.student.id.clone(),
            session_id: context.session.id.clone(),
            course_id: context.session.course_id.clone(),
            plan_id: approval.plan_id.clone(),
            checked_at: context.load_started_at,
            source: infer_source(valid.device, valid.trigger),
            status: AttendanceStatus::Present,
            integrity_fingerprint: fingerprint,
            device_meta: Some(json!({
                "device": valid.device,
                "trigger": valid.trigger,
                "latency_ms": self.latency_ms(context),
                "utc_offset_minutes": self.policy.utc_offset.local_minus_utc() / 60,
            })),
        }
    }

    async fn best_effort_streak(&self, student_id: &str, now: DateTime<Utc>) -> u32 {
        self.streaks
            .streak(student_id, now)
            .await
            .unwrap_or_else(|err| {
                warn!(student_id, error = %err, "streak.failed");
                0
            })
    }

    fn latency_ms(&self, context: &AttendanceContext) -> i64 {
        (self.clock.now() - context.load_started_at).num_milliseconds()
    }
}
