//! Shape validation and sanitisation of raw check-in requests.
//!
//! Runs before any collaborator is called. Every problem is reported at once
//! so a client can fix its payload in one round trip.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::ValidationFailure;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[1-8][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("uuid pattern compiles")
});

/// A check-in as received from a client. Fields stay optional and untyped so
/// malformed input reaches validation instead of failing deserialisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct CheckInRequest {
    #[serde(default, alias = "studentId")]
    #[validate(
        required(message = "student_id is required"),
        regex(path = *UUID_RE, message = "student_id must be a valid UUID")
    )]
    pub student_id: Option<String>,

    #[serde(default, alias = "sessionId")]
    #[validate(
        required(message = "session_id is required"),
        regex(path = *UUID_RE, message = "session_id must be a valid UUID")
    )]
    pub session_id: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub context: Option<RequestContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RequestContext {
    #[serde(default)]
    #[validate(custom(
        function = "validate_device",
        message = "context.device must be one of kiosk, mobile, desktop"
    ))]
    pub device: Option<String>,

    #[serde(default)]
    #[validate(custom(
        function = "validate_trigger",
        message = "context.trigger must be one of manual, auto"
    ))]
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Kiosk,
    Mobile,
    Desktop,
}

impl Device {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "kiosk" => Some(Self::Kiosk),
            "mobile" => Some(Self::Mobile),
            "desktop" => Some(Self::Desktop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Auto,
}

impl Trigger {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

fn validate_device(value: &str) -> Result<(), ValidationError> {
    Device::parse(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("device"))
}

fn validate_trigger(value: &str) -> Result<(), ValidationError> {
    Trigger::parse(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("trigger"))
}

/// A request that passed validation: ids are canonical lower-case UUIDs and
/// context values are typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidCheckIn {
    pub student_id: String,
    pub session_id: String,
    pub device: Option<Device>,
    pub trigger: Option<Trigger>,
}

fn sanitize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputValidator;

impl InputValidator {
    /// Trims and lower-cases every field, then checks presence and shape.
    pub fn validate(&self, request: &CheckInRequest) -> Result<ValidCheckIn, ValidationFailure> {
        let context = request.context.clone().map(|c| RequestContext {
            device: sanitize(c.device),
            trigger: sanitize(c.trigger),
        });
        let cleaned = CheckInRequest {
            student_id: sanitize(request.student_id.clone()),
            session_id: sanitize(request.session_id.clone()),
            context,
        };

        cleaned.validate().map_err(|errors| ValidationFailure {
            violations: common::validation_messages(&errors),
        })?;

        let (device, trigger) = match &cleaned.context {
            Some(c) => (
                c.device.as_deref().and_then(Device::parse),
                c.trigger.as_deref().and_then(Trigger::parse),
            ),
            None => (None, None),
        };

        match (cleaned.student_id, cleaned.session_id) {
            (Some(student_id), Some(session_id)) => Ok(ValidCheckIn {
                student_id,
                session_id,
                device,
                trigger,
            }),
            // `required` has already rejected a missing id.
            _ => Err(ValidationFailure {
                violations: vec!["student_id and session_id are required".into()],
            }),
        }
    }
}
