//! Domain types shared by the check-in pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

pub use db::models::attendance_record::{AttendanceStatus, Model as AttendanceRecord, Source};
pub use db::models::class_session::{Model as Session, SessionStatus};
pub use db::models::plan::PlanStatus;
pub use db::models::student::Model as Student;

/// A plan as the rule engine sees it: lifecycle, validity window and course
/// whitelist. An empty whitelist means every course is covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: String,
    pub status: PlanStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub courses: BTreeSet<String>,
}

impl Plan {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PlanStatus::Active && self.start_date <= now && now <= self.end_date
    }

    pub fn covers(&self, course_id: &str) -> bool {
        self.courses.is_empty() || self.courses.contains(course_id)
    }
}

impl From<(db::models::plan::Model, Vec<String>)> for Plan {
    fn from((plan, courses): (db::models::plan::Model, Vec<String>)) -> Self {
        Self {
            id: plan.id,
            status: plan.status,
            start_date: plan.start_date,
            end_date: plan.end_date,
            courses: courses.into_iter().collect(),
        }
    }
}

/// Everything the rules need about one request, loaded in one fan-out.
#[derive(Debug, Clone)]
pub struct AttendanceContext {
    pub student: Student,
    pub session: Session,
    /// Plans active at `load_started_at`, oldest first.
    pub active_plans: Vec<Plan>,
    /// Reference instant of the request. Rules, the fingerprint and the
    /// record's `checked_at` are all evaluated against it.
    pub load_started_at: DateTime<Utc>,
}

impl AttendanceContext {
    /// First active plan whose whitelist includes the session's course.
    pub fn covering_plan(&self) -> Option<&Plan> {
        self.active_plans
            .iter()
            .find(|p| p.covers(&self.session.course_id))
    }
}
