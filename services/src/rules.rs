//! Catalog of the business rules a check-in is judged against.
//!
//! Codes and severities are stable identifiers surfaced to clients. A `Block`
//! rejects the check-in; a `Warn` is attached to a successful reply.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCode {
    PlanRequired,
    PlanMismatch,
    DuplicateCheckin,
    SessionExpired,
    SessionCancelled,
    CheckinWindow,
    DailyLimit,
    IntegrityMismatch,
}

impl RuleCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlanRequired => "PLAN_REQUIRED",
            Self::PlanMismatch => "PLAN_MISMATCH",
            Self::DuplicateCheckin => "DUPLICATE_CHECKIN",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionCancelled => "SESSION_CANCELLED",
            Self::CheckinWindow => "CHECKIN_WINDOW",
            Self::DailyLimit => "DAILY_LIMIT",
            Self::IntegrityMismatch => "INTEGRITY_MISMATCH",
        }
    }
}

impl fmt::Display for RuleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Block,
    Warn,
}

/// Static description of one rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleDefinition {
    pub id: &'static str,
    pub code: RuleCode,
    pub severity: Severity,
    pub message: &'static str,
}

/// Outcome attached to a rejection or to a successful reply as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub code: RuleCode,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for RuleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// Indexed by `RuleCode` discriminant.
static CATALOG: [RuleDefinition; 8] = [
    RuleDefinition {
        id: "R1",
        code: RuleCode::PlanRequired,
        severity: Severity::Block,
        message: "Student has no active plan",
    },
    RuleDefinition {
        id: "R2",
        code: RuleCode::PlanMismatch,
        severity: Severity::Block,
        message: "No active plan covers this session's course",
    },
    RuleDefinition {
        id: "R3",
        code: RuleCode::DuplicateCheckin,
        severity: Severity::Block,
        message: "Already checked in to this session today",
    },
    RuleDefinition {
        id: "R4",
        code: RuleCode::SessionExpired,
        severity: Severity::Block,
        message: "Session started more than the allowed time ago",
    },
    RuleDefinition {
        id: "R5",
        code: RuleCode::SessionCancelled,
        severity: Severity::Block,
        message: "Session has been cancelled",
    },
    RuleDefinition {
        id: "R6",
        code: RuleCode::CheckinWindow,
        severity: Severity::Warn,
        message: "Check-in is outside the live window for this session",
    },
    RuleDefinition {
        id: "R7",
        code: RuleCode::DailyLimit,
        severity: Severity::Warn,
        message: "Daily attendance limit reached",
    },
    RuleDefinition {
        id: "R8",
        code: RuleCode::IntegrityMismatch,
        severity: Severity::Block,
        message: "Stored attendance failed integrity verification",
    },
];

pub struct RuleCatalog;

impl RuleCatalog {
    pub fn all() -> &'static [RuleDefinition] {
        &CATALOG
    }

    pub fn lookup(code: RuleCode) -> &'static RuleDefinition {
        &CATALOG[code as usize]
    }

    pub fn result(code: RuleCode) -> RuleResult {
        let rule = Self::lookup(code);
        RuleResult {
            code,
            severity: rule.severity,
            message: rule.message.to_owned(),
        }
    }

    /// Same as [`RuleCatalog::result`] with a situation-specific message.
    pub fn result_with(code: RuleCode, message: impl Into<String>) -> RuleResult {
        RuleResult {
            message: message.into(),
            ..Self::result(code)
        }
    }
}
