//! In-process attendance event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{AttendanceRecord, Source};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AttendanceEvent {
    CheckInRecorded {
        attendance_id: String,
        student_id: String,
        session_id: String,
        course_id: String,
        source: Source,
        checked_at: DateTime<Utc>,
    },
}

impl From<&AttendanceRecord> for AttendanceEvent {
    fn from(record: &AttendanceRecord) -> Self {
        Self::CheckInRecorded {
            attendance_id: record.id.clone(),
            student_id: record.student_id.clone(),
            session_id: record.session_id.clone(),
            course_id: record.course_id.clone(),
            source: record.source,
            checked_at: record.checked_at,
        }
    }
}

/// Destination for attendance events. Publishing never waits on consumers.
pub trait EventSink: Send + Sync {
    /// Number of receivers the event reached.
    fn publish(&self, event: AttendanceEvent) -> usize;
}

/// Broadcast fan-out to any number of subscribers. Slow subscribers lag and
/// drop old events instead of stalling publishers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AttendanceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: AttendanceEvent) -> usize {
        // No subscribers is not an error for fire-and-forget events.
        self.tx.send(event).unwrap_or(0)
    }
}
