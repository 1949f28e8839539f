use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

use crate::rules::RuleResult;

/// Failure talking to a collaborator (directory, store, counter).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Coarse category of an [`UpstreamError`], safe to hand to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamKind {
    NotFound,
    Timeout,
    Unreachable,
    Store,
}

impl UpstreamError {
    pub fn kind(&self) -> UpstreamKind {
        match self {
            Self::NotFound { .. } => UpstreamKind::NotFound,
            Self::Timeout { .. } => UpstreamKind::Timeout,
            Self::Unreachable(_) => UpstreamKind::Unreachable,
            Self::Store(_) => UpstreamKind::Store,
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether repeating the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unreachable(_))
    }
}

impl From<DbErr> for UpstreamError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(e) => Self::Unreachable(e.to_string()),
            DbErr::Conn(e) => Self::Unreachable(e.to_string()),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Aggregated input problems. Never produced after a collaborator was called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub violations: Vec<String>,
}

impl ValidationFailure {
    pub fn message(&self) -> String {
        self.violations.join("; ")
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid check-in request: {}", self.message())
    }
}

#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("{0}")]
    Validation(ValidationFailure),

    #[error("{0}")]
    Rule(RuleResult),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("integrity mismatch on attendance {record_id}: stored {stored}, expected {expected}")]
    Integrity {
        record_id: String,
        stored: String,
        expected: String,
    },
}

impl From<ValidationFailure> for CheckInError {
    fn from(failure: ValidationFailure) -> Self {
        Self::Validation(failure)
    }
}

impl From<RuleResult> for CheckInError {
    fn from(result: RuleResult) -> Self {
        Self::Rule(result)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("offline queue io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offline queue file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),
}
