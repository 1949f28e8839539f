//! Ordered evaluation of the business rules.
//!
//! Evaluators are pure functions over a [`RuleInput`]. Blocking rules run
//! first and the first block wins; warnings are collected afterwards.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::model::{AttendanceContext, SessionStatus};
use crate::policy::CheckInPolicy;
use crate::rules::{RuleCatalog, RuleCode, RuleResult};
use crate::sources::{DailyCounter, bounded};

pub struct RuleInput<'a> {
    pub context: &'a AttendanceContext,
    pub now: DateTime<Utc>,
    /// Attendances already recorded for the student on `now`'s calendar day.
    pub attendance_today: u32,
    pub policy: &'a CheckInPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Pass,
    Block(RuleResult),
    Warn(RuleResult),
}

type Evaluator = fn(&RuleInput<'_>) -> RuleOutcome;

/// Blocking rules in evaluation order, then warnings.
const RULES: [(RuleCode, Evaluator); 6] = [
    (RuleCode::PlanRequired, plan_required),
    (RuleCode::PlanMismatch, plan_mismatch),
    (RuleCode::SessionCancelled, session_cancelled),
    (RuleCode::SessionExpired, session_expired),
    (RuleCode::CheckinWindow, checkin_window),
    (RuleCode::DailyLimit, daily_limit),
];

fn plan_required(input: &RuleInput<'_>) -> RuleOutcome {
    if input.context.active_plans.is_empty() {
        RuleOutcome::Block(RuleCatalog::result(RuleCode::PlanRequired))
    } else {
        RuleOutcome::Pass
    }
}

fn plan_mismatch(input: &RuleInput<'_>) -> RuleOutcome {
    match input.context.covering_plan() {
        Some(_) => RuleOutcome::Pass,
        None => RuleOutcome::Block(RuleCatalog::result_with(
            RuleCode::PlanMismatch,
            format!(
                "No active plan covers course {}",
                input.context.session.course_id
            ),
        )),
    }
}

fn session_cancelled(input: &RuleInput<'_>) -> RuleOutcome {
    if input.context.session.status == SessionStatus::Cancelled {
        RuleOutcome::Block(RuleCatalog::result(RuleCode::SessionCancelled))
    } else {
        RuleOutcome::Pass
    }
}

fn session_expired(input: &RuleInput<'_>) -> RuleOutcome {
    let elapsed = input.now - input.context.session.start_at;
    if elapsed > input.policy.expiry {
        RuleOutcome::Block(RuleCatalog::result_with(
            RuleCode::SessionExpired,
            format!(
                "Session started {} minutes ago; check-in closes after {} minutes",
                elapsed.num_minutes(),
                input.policy.expiry.num_minutes()
            ),
        ))
    } else {
        RuleOutcome::Pass
    }
}

fn checkin_window(input: &RuleInput<'_>) -> RuleOutcome {
    let start = input.context.session.start_at;
    let opens = start - input.policy.window_early;
    let closes = start + input.policy.window_late;
    if input.now < opens || input.now > closes {
        RuleOutcome::Warn(RuleCatalog::result(RuleCode::CheckinWindow))
    } else {
        RuleOutcome::Pass
    }
}

fn daily_limit(input: &RuleInput<'_>) -> RuleOutcome {
    if input.attendance_today >= input.policy.daily_limit {
        RuleOutcome::Warn(RuleCatalog::result_with(
            RuleCode::DailyLimit,
            format!(
                "{} attendances already recorded today (limit {})",
                input.attendance_today, input.policy.daily_limit
            ),
        ))
    } else {
        RuleOutcome::Pass
    }
}

/// Runs every rule in order. `Err` carries the first blocking result,
/// `Ok` the warnings in rule order.
pub fn evaluate_rules(input: &RuleInput<'_>) -> Result<Vec<RuleResult>, RuleResult> {
    let mut warnings = Vec::new();
    for (_, evaluate) in RULES.iter() {
        match evaluate(input) {
            RuleOutcome::Pass => {}
            RuleOutcome::Block(result) => return Err(result),
            RuleOutcome::Warn(result) => warnings.push(result),
        }
    }
    Ok(warnings)
}

/// A check-in that cleared every blocking rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    /// The plan that authorises attendance to this session.
    pub plan_id: String,
    pub warnings: Vec<RuleResult>,
}

pub struct BusinessRuleEngine {
    counter: Arc<dyn DailyCounter>,
    policy: CheckInPolicy,
}

impl BusinessRuleEngine {
    pub fn new(counter: Arc<dyn DailyCounter>, policy: CheckInPolicy) -> Self {
        Self { counter, policy }
    }

    pub async fn evaluate(&self, context: &AttendanceContext) -> Result<Approval, RuleResult> {
        let now = context.load_started_at;

        // The daily limit only warns, so a failing or stalled counter must not block.
        let attendance_today = match bounded(
            "daily count",
            self.policy.upstream_timeout,
            self.counter.count_on_day(&context.student.id, now),
        )
        .await
        {
            Ok(count) => count,
            Err(err) => {
                warn!(student_id = %context.student.id, error = %err, "Daily counter unavailable");
                0
            }
        };

        let input = RuleInput {
            context,
            now,
            attendance_today,
            policy: &self.policy,
        };
        let warnings = evaluate_rules(&input)?;

        let plan_id = context
            .covering_plan()
            .map(|p| p.id.clone())
            .ok_or_else(|| RuleCatalog::result(RuleCode::PlanMismatch))?;

        Ok(Approval { plan_id, warnings })
    }
}
