//! Attendance check-in engine: validation, rule evaluation, once-per-day
//! recording and offline replay.

pub mod context_loader;
pub mod duplicate_guard;
pub mod error;
pub mod events;
pub mod hooks;
pub mod input_validator;
pub mod model;
pub mod offline_queue;
pub mod policy;
pub mod recorder;
pub mod reply;
pub mod rule_engine;
pub mod rules;
pub mod sources;
pub mod store;
pub mod streak;
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use error::{CheckInError, UpstreamError};
pub use input_validator::CheckInRequest;
pub use offline_queue::{OfflineQueue, RetryPolicy, Submission};
pub use policy::CheckInPolicy;
pub use recorder::{AttendanceRecorder, CheckInOutcome, Collaborators};
pub use reply::CheckInReply;
