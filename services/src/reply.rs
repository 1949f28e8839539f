use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::{CheckInError, UpstreamKind};
use crate::recorder::CheckInOutcome;
use crate::rules::{RuleCatalog, RuleCode, RuleResult, Severity};

/// Wire form of a check-in result. Carries enough structure for a client to
/// render the outcome without re-deriving business meaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckInReply {
    Success {
        attendance_id: String,
        student_id: String,
        session_id: String,
        checked_at: DateTime<Utc>,
        streak: u32,
        warnings: Vec<RuleResult>,
    },
    Duplicate {
        attendance_id: String,
        original_time: DateTime<Utc>,
    },
    RuleFailure {
        code: RuleCode,
        severity: Severity,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
    ValidationFailure {
        message: String,
        violations: Vec<String>,
    },
    UpstreamFailure {
        kind: UpstreamKind,
        message: String,
        retryable: bool,
    },
}

impl CheckInReply {
    pub fn from_result(result: Result<CheckInOutcome, CheckInError>, at: DateTime<Utc>) -> Self {
        match result {
            Ok(CheckInOutcome::Success(s)) => Self::Success {
                attendance_id: s.attendance_id,
                student_id: s.student_id,
                session_id: s.session_id,
                checked_at: s.checked_at,
                streak: s.streak,
                warnings: s.warnings,
            },
            Ok(CheckInOutcome::Duplicate(d)) => Self::Duplicate {
                attendance_id: d.attendance_id,
                original_time: d.original_time,
            },
            Err(CheckInError::Validation(failure)) => Self::ValidationFailure {
                message: failure.message(),
                violations: failure.violations,
            },
            Err(CheckInError::Rule(rule)) => Self::RuleFailure {
                code: rule.code,
                severity: rule.severity,
                message: rule.message,
                details: None,
                timestamp: at,
            },
            Err(CheckInError::Integrity {
                record_id,
                stored,
                expected,
            }) => {
                let rule = RuleCatalog::lookup(RuleCode::IntegrityMismatch);
                Self::RuleFailure {
                    code: rule.code,
                    severity: rule.severity,
                    message: rule.message.to_owned(),
                    details: Some(json!({
                        "attendance_id": record_id,
                        "stored_fingerprint": stored,
                        "expected_fingerprint": expected,
                    })),
                    timestamp: at,
                }
            }
            Err(CheckInError::Upstream(err)) => Self::UpstreamFailure {
                kind: err.kind(),
                retryable: err.is_transient(),
                message: err.to_string(),
            },
        }
    }

    /// A transient upstream failure may succeed on replay; everything else is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::UpstreamFailure { retryable: true, .. })
    }
}
