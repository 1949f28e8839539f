//! Side effects that run after a record is committed.
//!
//! Hooks are detached from the request: their failures are logged and never
//! change the reply the client already received.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::HookError;
use crate::events::{AttendanceEvent, EventSink};
use crate::model::AttendanceRecord;

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn after_commit(&self, record: &AttendanceRecord) -> Result<(), HookError>;
}

/// Announces new records on an [`EventSink`].
pub struct PublishCheckIn {
    sink: Arc<dyn EventSink>,
}

impl PublishCheckIn {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl PostCommitHook for PublishCheckIn {
    fn name(&self) -> &'static str {
        "publish_check_in"
    }

    async fn after_commit(&self, record: &AttendanceRecord) -> Result<(), HookError> {
        let receivers = self.sink.publish(AttendanceEvent::from(record));
        debug!(attendance_id = %record.id, receivers, "Published check-in event");
        Ok(())
    }
}

/// Spawns every hook for `record` and returns without waiting for them.
pub fn run_detached(hooks: &[Arc<dyn PostCommitHook>], record: &AttendanceRecord) {
    for hook in hooks {
        let hook = Arc::clone(hook);
        let record = record.clone();
        tokio::spawn(async move {
            if let Err(err) = hook.after_commit(&record).await {
                error!(
                    hook = hook.name(),
                    attendance_id = %record.id,
                    error = %err,
                    "hook.failed"
                );
            }
        });
    }
}
