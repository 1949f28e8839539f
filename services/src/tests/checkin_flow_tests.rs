use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use crate::duplicate_guard::{DuplicateGuard, fingerprint};
use crate::error::{CheckInError, HookError, UpstreamError};
use crate::events::AttendanceEvent;
use crate::hooks::{PostCommitHook, PublishCheckIn};
use crate::input_validator::{CheckInRequest, RequestContext};
use crate::model::{
    AttendanceContext, AttendanceRecord, AttendanceStatus, Plan, PlanStatus, SessionStatus, Source,
};
use crate::policy::CheckInPolicy;
use crate::recorder::CheckInOutcome;
use crate::rules::RuleCode;
use crate::test_utils::{
    Fault, FixedClock, MemoryBackend, RecordingSink, SESSION_ID, STUDENT_ID, StoreOp, recorder_for,
    seeded_backend,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 6, 19, 5, 0).unwrap()
}

fn kiosk_request(student: &str, session: &str) -> CheckInRequest {
    CheckInRequest {
        student_id: Some(student.into()),
        session_id: Some(session.into()),
        context: Some(RequestContext {
            device: Some("kiosk".into()),
            trigger: Some("manual".into()),
        }),
    }
}

fn rule_code(result: Result<CheckInOutcome, CheckInError>) -> RuleCode {
    match result {
        Err(CheckInError::Rule(rule)) => rule.code,
        other => panic!("expected rule failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unrestricted_plan_and_live_session_succeeds() {
    let backend = seeded_backend(now());
    let sink = Arc::new(RecordingSink::default());
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()))
        .with_hook(Arc::new(PublishCheckIn::new(sink.clone())));

    let outcome = recorder
        .checkin(&kiosk_request(STUDENT_ID, SESSION_ID))
        .await
        .unwrap();

    let CheckInOutcome::Success(success) = outcome else {
        panic!("expected success");
    };
    assert!(success.streak >= 1);
    assert!(success.warnings.is_empty());
    assert_eq!(success.checked_at, now());

    let records = backend.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, success.attendance_id);
    assert_eq!(record.plan_id, "plan-open");
    assert_eq!(record.course_id, "course-bjj");
    assert_eq!(record.source, Source::SelfService);
    assert_eq!(record.status, AttendanceStatus::Present);
    assert_eq!(record.device_meta.as_ref().unwrap()["device"], "kiosk");

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let events = sink.events();
    assert_eq!(events.len(), 1);
    let AttendanceEvent::CheckInRecorded { attendance_id, .. } = &events[0];
    assert_eq!(attendance_id, &success.attendance_id);
}

#[tokio::test]
async fn no_active_plan_is_plan_required() {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_session(SESSION_ID, "course-bjj", now(), SessionStatus::Scheduled);
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    let result = recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)).await;
    assert_eq!(rule_code(result), RuleCode::PlanRequired);
    assert!(backend.records().is_empty());
}

#[tokio::test]
async fn lapsed_plans_from_upstream_are_ignored() {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_session(SESSION_ID, "course-bjj", now(), SessionStatus::Scheduled);
    backend.add_plan_with(
        STUDENT_ID,
        Plan {
            id: "expired".into(),
            status: PlanStatus::Active,
            start_date: now() - Duration::days(60),
            end_date: now() - Duration::days(30),
            courses: Default::default(),
        },
    );
    backend.add_plan_with(
        STUDENT_ID,
        Plan {
            id: "suspended".into(),
            status: PlanStatus::Suspended,
            start_date: now() - Duration::days(1),
            end_date: now() + Duration::days(1),
            courses: Default::default(),
        },
    );
    let recorder = recorder_for(backend, FixedClock::at(now()));

    let result = recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)).await;
    assert_eq!(rule_code(result), RuleCode::PlanRequired);
}

#[tokio::test]
async fn plan_for_other_course_is_plan_mismatch() {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_session(SESSION_ID, "Y", now(), SessionStatus::Scheduled);
    backend.add_plan(STUDENT_ID, "plan-x", &["X"], now());
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    let result = recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)).await;
    assert_eq!(rule_code(result), RuleCode::PlanMismatch);
    assert!(backend.records().is_empty());
}

#[tokio::test]
async fn second_plan_can_cover_the_course() {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_session(SESSION_ID, "Y", now(), SessionStatus::Scheduled);
    backend.add_plan(STUDENT_ID, "plan-x", &["X"], now());
    backend.add_plan(STUDENT_ID, "plan-y", &["Y", "Z"], now());
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    recorder
        .checkin(&kiosk_request(STUDENT_ID, SESSION_ID))
        .await
        .unwrap();
    assert_eq!(backend.records()[0].plan_id, "plan-y");
}

#[tokio::test]
async fn cancelled_session_is_reported_before_expiry() {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_session(
        SESSION_ID,
        "course-bjj",
        now() - Duration::days(3),
        SessionStatus::Cancelled,
    );
    backend.add_plan(STUDENT_ID, "plan-open", &[], now());
    let recorder = recorder_for(backend, FixedClock::at(now()));

    let result = recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)).await;
    assert_eq!(rule_code(result), RuleCode::SessionCancelled);
}

#[tokio::test]
async fn expiry_boundary_through_the_pipeline() {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_plan(STUDENT_ID, "plan-open", &[], now());

    let expired = "aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa";
    let open = "bbbbbbbb-bbbb-4bbb-8bbb-bbbbbbbbbbbb";
    backend.add_session(
        expired,
        "course-bjj",
        now() - Duration::hours(24) - Duration::seconds(1),
        SessionStatus::Scheduled,
    );
    backend.add_session(
        open,
        "course-bjj",
        now() - Duration::hours(23) - Duration::minutes(59) - Duration::seconds(59),
        SessionStatus::Scheduled,
    );
    let recorder = recorder_for(backend, FixedClock::at(now()));

    let result = recorder.checkin(&kiosk_request(STUDENT_ID, expired)).await;
    assert_eq!(rule_code(result), RuleCode::SessionExpired);

    let outcome = recorder
        .checkin(&kiosk_request(STUDENT_ID, open))
        .await
        .unwrap();
    let CheckInOutcome::Success(success) = outcome else {
        panic!("expected success");
    };
    let codes: Vec<_> = success.warnings.iter().map(|w| w.code).collect();
    assert_eq!(codes, vec![RuleCode::CheckinWindow]);
}

#[tokio::test]
async fn same_day_resubmission_is_duplicate_of_first() {
    let backend = seeded_backend(now());
    let clock = FixedClock::at(now());
    let recorder = recorder_for(backend.clone(), clock.clone());

    let first = recorder
        .checkin(&kiosk_request(STUDENT_ID, SESSION_ID))
        .await
        .unwrap();
    let CheckInOutcome::Success(first) = first else {
        panic!("expected success");
    };

    clock.advance(Duration::minutes(10));
    let second = recorder
        .checkin(&kiosk_request(STUDENT_ID, SESSION_ID))
        .await
        .unwrap();

    let CheckInOutcome::Duplicate(duplicate) = second else {
        panic!("expected duplicate");
    };
    assert_eq!(duplicate.attendance_id, first.attendance_id);
    assert_eq!(duplicate.original_time, first.checked_at);
    assert_eq!(backend.records().len(), 1);
}

#[tokio::test]
async fn consecutive_days_build_a_streak() {
    let backend = MemoryBackend::new();
    backend.add_student(STUDENT_ID);
    backend.add_plan(STUDENT_ID, "plan-open", &[], now());
    let clock = FixedClock::at(now() - Duration::days(2));
    let recorder = recorder_for(backend.clone(), clock.clone());

    let sessions = [
        "11111111-1111-4111-8111-111111111111",
        "22222222-2222-4222-8222-222222222222",
        "33333333-3333-4333-8333-333333333333",
    ];
    let mut streaks = Vec::new();
    for (day, session) in sessions.iter().enumerate() {
        let at = now() - Duration::days(2) + Duration::days(day as i64);
        backend.add_session(session, "course-bjj", at, SessionStatus::Scheduled);
        clock.set(at);
        match recorder.checkin(&kiosk_request(STUDENT_ID, session)).await.unwrap() {
            CheckInOutcome::Success(s) => streaks.push(s.streak),
            other => panic!("expected success, got {other:?}"),
        }
    }

    assert_eq!(streaks, vec![1, 2, 3]);
    assert_eq!(recorder.streak(STUDENT_ID).await.unwrap(), 3);

    clock.advance(Duration::days(2));
    assert_eq!(recorder.streak(STUDENT_ID).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_request_never_reaches_collaborators() {
    let backend = seeded_backend(now());
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    let request = CheckInRequest {
        student_id: Some("nope".into()),
        session_id: None,
        context: Some(RequestContext {
            device: Some("fridge".into()),
            trigger: Some("sometimes".into()),
        }),
    };
    match recorder.checkin(&request).await {
        Err(CheckInError::Validation(failure)) => assert_eq!(failure.violations.len(), 4),
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn unknown_student_is_upstream_not_found() {
    let backend = seeded_backend(now());
    let recorder = recorder_for(backend, FixedClock::at(now()));

    let stranger = "99999999-9999-4999-8999-999999999999";
    match recorder.checkin(&kiosk_request(stranger, SESSION_ID)).await {
        Err(CheckInError::Upstream(UpstreamError::NotFound { entity, id })) => {
            assert_eq!(entity, "student");
            assert_eq!(id, stranger);
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_lookup_times_out() {
    let backend = seeded_backend(now());
    backend.delay_sessions(std::time::Duration::from_secs(2));
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    match recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)).await {
        Err(CheckInError::Upstream(err @ UpstreamError::Timeout { .. })) => {
            assert!(err.is_transient());
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(backend.records().is_empty());
}

#[tokio::test]
async fn daily_limit_only_warns() {
    let backend = seeded_backend(now());
    let policy = CheckInPolicy::default();
    for i in 0..policy.daily_limit {
        let session = format!("{i:08}-0000-4000-8000-000000000000");
        backend.add_record(AttendanceRecord {
            id: format!("earlier-{i}"),
            student_id: STUDENT_ID.into(),
            session_id: session.clone(),
            course_id: "course-bjj".into(),
            plan_id: "plan-open".into(),
            checked_at: now() - Duration::hours(i64::from(i) + 1),
            source: Source::Operator,
            status: AttendanceStatus::Present,
            integrity_fingerprint: fingerprint(STUDENT_ID, &session, now().date_naive()),
            device_meta: None,
        });
    }
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    let outcome = recorder
        .checkin(&kiosk_request(STUDENT_ID, SESSION_ID))
        .await
        .unwrap();
    let CheckInOutcome::Success(success) = outcome else {
        panic!("expected success");
    };
    assert_eq!(success.warnings.len(), 1);
    assert_eq!(success.warnings[0].code, RuleCode::DailyLimit);
    assert_eq!(backend.records().len(), policy.daily_limit as usize + 1);
}

#[tokio::test]
async fn tampered_record_is_integrity_mismatch() {
    let backend = seeded_backend(now());
    backend.add_record(AttendanceRecord {
        id: "tampered".into(),
        student_id: STUDENT_ID.into(),
        session_id: SESSION_ID.into(),
        course_id: "course-bjj".into(),
        plan_id: "plan-open".into(),
        // Moved to another day after the fingerprint was computed.
        checked_at: now() - Duration::days(3),
        source: Source::SelfService,
        status: AttendanceStatus::Present,
        integrity_fingerprint: fingerprint(STUDENT_ID, SESSION_ID, now().date_naive()),
        device_meta: None,
    });
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    match recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)).await {
        Err(CheckInError::Integrity { record_id, .. }) => assert_eq!(record_id, "tampered"),
        other => panic!("expected integrity mismatch, got {other:?}"),
    }
    assert_eq!(backend.records().len(), 1);
}

struct FailingHook;

#[async_trait]
impl PostCommitHook for FailingHook {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn after_commit(&self, _record: &AttendanceRecord) -> Result<(), HookError> {
        Err(HookError::Failed("analytics down".into()))
    }
}

#[tokio::test]
async fn failing_hook_does_not_fail_checkin() {
    let backend = seeded_backend(now());
    let recorder =
        recorder_for(backend.clone(), FixedClock::at(now())).with_hook(Arc::new(FailingHook));

    let outcome = recorder
        .checkin(&kiosk_request(STUDENT_ID, SESSION_ID))
        .await
        .unwrap();
    assert!(matches!(outcome, CheckInOutcome::Success(_)));
    assert_eq!(backend.records().len(), 1);
}

#[tokio::test]
async fn failed_insert_records_nothing_and_skips_hooks() {
    let backend = seeded_backend(now());
    backend.inject(StoreOp::InsertIfAbsent, Fault::Error);
    let sink = Arc::new(RecordingSink::default());
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()))
        .with_hook(Arc::new(PublishCheckIn::new(sink.clone())));

    match recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)).await {
        Err(CheckInError::Upstream(err @ UpstreamError::Store(_))) => {
            assert!(!err.is_transient());
        }
        other => panic!("expected store failure, got {other:?}"),
    }
    assert!(backend.records().is_empty());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn stalled_insert_times_out() {
    let backend = seeded_backend(now());
    backend.inject(StoreOp::InsertIfAbsent, Fault::Stall);
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)),
    )
    .await
    .expect("checkin must finish within the upstream timeout");

    match result {
        Err(CheckInError::Upstream(UpstreamError::Timeout { operation, .. })) => {
            assert_eq!(operation, "attendance insert");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn stalled_fingerprint_lookup_times_out() {
    let backend = seeded_backend(now());
    backend.inject(StoreOp::FindByFingerprint, Fault::Stall);
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)),
    )
    .await
    .expect("checkin must finish within the upstream timeout");

    assert!(matches!(
        result,
        Err(CheckInError::Upstream(UpstreamError::Timeout { .. }))
    ));
    assert!(backend.records().is_empty());
}

#[tokio::test]
async fn stalled_daily_counter_does_not_block() {
    let backend = seeded_backend(now());
    backend.inject(StoreOp::CountBetween, Fault::Stall);
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)),
    )
    .await
    .expect("checkin must finish within the upstream timeout")
    .unwrap();

    let CheckInOutcome::Success(success) = outcome else {
        panic!("expected success");
    };
    assert!(success.warnings.is_empty());
    assert_eq!(backend.records().len(), 1);
}

#[tokio::test]
async fn failing_streak_query_still_succeeds_with_zero() {
    for fault in [Fault::Error, Fault::Stall] {
        let backend = seeded_backend(now());
        backend.inject(StoreOp::CheckedAtSince, fault);
        let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            recorder.checkin(&kiosk_request(STUDENT_ID, SESSION_ID)),
        )
        .await
        .expect("checkin must finish within the upstream timeout")
        .unwrap();

        let CheckInOutcome::Success(success) = outcome else {
            panic!("expected success with {fault:?}");
        };
        assert_eq!(success.streak, 0, "{fault:?}");
        assert_eq!(backend.records().len(), 1, "{fault:?}");
    }
}

#[tokio::test]
async fn record_carries_offset_it_was_written_under() {
    let backend = seeded_backend(now());
    let recorder = recorder_for(backend.clone(), FixedClock::at(now()));

    recorder
        .checkin(&kiosk_request(STUDENT_ID, SESSION_ID))
        .await
        .unwrap();

    let records = backend.records();
    assert_eq!(records[0].device_meta.as_ref().unwrap()["utc_offset_minutes"], 0);
}

#[tokio::test]
async fn fingerprint_ignores_time_of_day() {
    let backend = seeded_backend(now());
    let guard = DuplicateGuard::new(backend.clone(), CheckInPolicy::default());
    let student = crate::model::Student {
        id: STUDENT_ID.into(),
        name: "Ana".into(),
        active: true,
        created_at: now(),
    };
    let session = crate::model::Session {
        id: SESSION_ID.into(),
        course_id: "course-bjj".into(),
        title: "Evening".into(),
        start_at: now(),
        status: SessionStatus::Scheduled,
    };
    let context = |at: DateTime<Utc>| AttendanceContext {
        student: student.clone(),
        session: session.clone(),
        active_plans: vec![],
        load_started_at: at,
    };

    let a = guard.fingerprint(&context(now()));
    let b = guard.fingerprint(&context(now() + Duration::milliseconds(437)));
    let c = guard.fingerprint(&context(now() + Duration::days(1)));
    assert_eq!(a, b);
    assert_ne!(a, c);
}
