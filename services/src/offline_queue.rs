//! Store-and-forward for check-ins that could not reach the backend.
//!
//! Entries hold the raw request and are replayed through the full pipeline,
//! oldest first. The queue is mirrored to a JSON file so it survives
//! restarts. Replays that fail transiently stay queued in their original
//! position; every other outcome removes the entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::config::AppConfig;

use crate::error::{CheckInError, QueueError};
use crate::input_validator::CheckInRequest;
use crate::recorder::AttendanceRecorder;
use crate::reply::CheckInReply;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total tries before a submission is queued. Zero behaves like one.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            attempts: config.offline_retry_attempts,
            base_delay: Duration::from_millis(config.offline_retry_base_ms),
        }
    }

    /// Backoff before try `attempt + 1`: base, 2x base, 4x base, ...
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCheckIn {
    pub request: CheckInRequest,
    pub queued_at: DateTime<Utc>,
    /// Replays attempted so far.
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    pub request: CheckInRequest,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    pub reply: CheckInReply,
    pub requeued: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Submission {
    Completed { reply: CheckInReply },
    /// The backend stayed unreachable; the request waits in the queue.
    Queued { position: usize, reply: CheckInReply },
}

pub struct OfflineQueue {
    recorder: Arc<AttendanceRecorder>,
    entries: Mutex<VecDeque<QueuedCheckIn>>,
    path: Option<PathBuf>,
    retry: RetryPolicy,
    draining: AtomicBool,
    // Serialises file writes so snapshots land in order.
    write_gate: Mutex<()>,
}

struct DrainFlag<'a>(&'a AtomicBool);

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn load_entries(path: &Path) -> Result<VecDeque<QueuedCheckIn>, QueueError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(VecDeque::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VecDeque::new()),
        Err(e) => Err(e.into()),
    }
}

impl OfflineQueue {
    /// Opens the queue, reloading entries persisted at `path` if any.
    /// `None` keeps the queue in memory only.
    pub async fn open(
        recorder: Arc<AttendanceRecorder>,
        path: Option<PathBuf>,
        retry: RetryPolicy,
    ) -> Result<Self, QueueError> {
        let entries = match &path {
            Some(p) => load_entries(p).await?,
            None => VecDeque::new(),
        };
        if !entries.is_empty() {
            info!(pending = entries.len(), "Reloaded offline check-ins");
        }

        Ok(Self {
            recorder,
            entries: Mutex::new(entries),
            path,
            retry,
            draining: AtomicBool::new(false),
            write_gate: Mutex::new(()),
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn pending(&self) -> Vec<QueuedCheckIn> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Appends `request` and returns its 1-based position.
    pub async fn enqueue(&self, request: CheckInRequest) -> Result<usize, QueueError> {
        let position = {
            let mut entries = self.entries.lock().await;
            entries.push_back(QueuedCheckIn {
                request,
                queued_at: self.recorder.now(),
                attempts: 0,
            });
            entries.len()
        };
        self.persist().await?;
        info!(position, "offline.enqueued");
        Ok(position)
    }

    /// Runs the check-in, retrying transient upstream failures with
    /// exponential backoff. Queues the request once retries are exhausted.
    pub async fn submit(&self, request: CheckInRequest) -> Result<Submission, QueueError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let at = self.recorder.now();
            match self.recorder.checkin(&request).await {
                Err(CheckInError::Upstream(err)) if err.is_transient() => {
                    if attempt >= attempts {
                        let reply = CheckInReply::from_result(Err(err.into()), at);
                        let position = self.enqueue(request).await?;
                        return Ok(Submission::Queued { position, reply });
                    }
                    let delay = self.retry.delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying check-in");
                    tokio::time::sleep(delay).await;
                }
                other => {
                    return Ok(Submission::Completed {
                        reply: CheckInReply::from_result(other, at),
                    });
                }
            }
        }
    }

    /// Replays every entry queued before the call, in order. A concurrent
    /// drain returns an empty result instead of replaying twice.
    pub async fn drain(&self) -> Result<Vec<ReplayResult>, QueueError> {
        if self.draining.swap(true, Ordering::AcqRel) {
            debug!("Offline drain already running");
            return Ok(Vec::new());
        }
        let _flag = DrainFlag(&self.draining);

        let mut remaining = self.len().await;
        let mut cursor = 0;
        let mut results = Vec::with_capacity(remaining);

        // Only a drain removes entries, so `cursor` stays valid while
        // enqueue appends behind it.
        while remaining > 0 {
            remaining -= 1;
            let Some(entry) = self.entries.lock().await.get(cursor).cloned() else {
                break;
            };

            let at = self.recorder.now();
            let reply = CheckInReply::from_result(self.recorder.checkin(&entry.request).await, at);
            let requeued = !reply.is_terminal();

            {
                let mut entries = self.entries.lock().await;
                if requeued {
                    if let Some(slot) = entries.get_mut(cursor) {
                        slot.attempts += 1;
                    }
                    cursor += 1;
                } else {
                    entries.remove(cursor);
                }
            }

            if requeued {
                warn!(attempts = entry.attempts + 1, "Offline replay failed, keeping entry");
            }
            results.push(ReplayResult {
                request: entry.request,
                queued_at: entry.queued_at,
                attempts: entry.attempts + 1,
                reply,
                requeued,
            });
        }

        self.persist().await?;
        info!(
            replayed = results.len(),
            requeued = results.iter().filter(|r| r.requeued).count(),
            "offline.replayed"
        );
        Ok(results)
    }

    async fn persist(&self) -> Result<(), QueueError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _gate = self.write_gate.lock().await;

        let snapshot = {
            let entries = self.entries.lock().await;
            serde_json::to_vec_pretty(&*entries)?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, snapshot).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
