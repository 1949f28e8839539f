use std::sync::Arc;
use std::time::Duration;

use crate::error::UpstreamError;
use crate::input_validator::ValidCheckIn;
use crate::model::AttendanceContext;
use crate::sources::{Clock, PlanDirectory, SessionDirectory, StudentDirectory, bounded};

/// Loads student, session and active plans concurrently.
pub struct ContextLoader {
    students: Arc<dyn StudentDirectory>,
    sessions: Arc<dyn SessionDirectory>,
    plans: Arc<dyn PlanDirectory>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ContextLoader {
    pub fn new(
        students: Arc<dyn StudentDirectory>,
        sessions: Arc<dyn SessionDirectory>,
        plans: Arc<dyn PlanDirectory>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            students,
            sessions,
            plans,
            clock,
            timeout,
        }
    }

    /// Fails as soon as any lookup fails; nothing is cached between calls.
    pub async fn load(&self, request: &ValidCheckIn) -> Result<AttendanceContext, UpstreamError> {
        let load_started_at = self.clock.now();

        let (student, session, plans) = tokio::try_join!(
            bounded(
                "student lookup",
                self.timeout,
                self.students.student(&request.student_id)
            ),
            bounded(
                "session lookup",
                self.timeout,
                self.sessions.session(&request.session_id)
            ),
            bounded(
                "plan lookup",
                self.timeout,
                self.plans.active_plans(&request.student_id, load_started_at)
            ),
        )?;

        // Directories may hand back plans that lapsed between query and use.
        let active_plans = plans
            .into_iter()
            .filter(|p| p.is_active_at(load_started_at))
            .collect();

        Ok(AttendanceContext {
            student,
            session,
            active_plans,
            load_started_at,
        })
    }
}
