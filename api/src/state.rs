//! Application state shared across Axum route handlers.

use common::config::AppConfig;
use sea_orm::DatabaseConnection;
use services::error::QueueError;
use services::events::EventBus;
use services::hooks::PublishCheckIn;
use services::sources::SystemClock;
use services::store::SeaOrmStore;
use services::{AttendanceRecorder, CheckInPolicy, Collaborators, OfflineQueue, RetryPolicy};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    recorder: Arc<AttendanceRecorder>,
    offline: Arc<OfflineQueue>,
    events: EventBus,
}

impl AppState {
    /// Wires the recorder over `db` and reopens the offline queue.
    /// `queue_path` of `None` keeps the queue in memory.
    pub async fn new(
        db: DatabaseConnection,
        config: &AppConfig,
        queue_path: Option<PathBuf>,
    ) -> Result<Self, QueueError> {
        let policy = CheckInPolicy::from_config(config);
        let events = EventBus::new(256);

        let store = Arc::new(SeaOrmStore::new(db.clone()));
        let recorder = Arc::new(
            AttendanceRecorder::new(
                Collaborators::from_backend(store, Arc::new(SystemClock), &policy),
                policy,
            )
            .with_hook(Arc::new(PublishCheckIn::new(Arc::new(events.clone())))),
        );

        let offline = Arc::new(
            OfflineQueue::open(recorder.clone(), queue_path, RetryPolicy::from_config(config))
                .await?,
        );

        Ok(Self {
            db,
            recorder,
            offline,
            events,
        })
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn recorder(&self) -> &AttendanceRecorder {
        &self.recorder
    }

    pub fn offline(&self) -> Arc<OfflineQueue> {
        self.offline.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
