use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by the HTTP routes.
#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Unavailable(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Unavailable(_) => "unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Unavailable(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Rejections produced by control-queue operations. None of these are fatal;
/// callers log them and leave state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    AlreadyQueued(String),
    AgentCannotQueue(String),
    UnknownSession(String),
    InvalidTime { requested: i64 },
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::AlreadyQueued(sid) => write!(f, "session {sid} is already queued"),
            ControlError::AgentCannotQueue(sid) => {
                write!(f, "agent session {sid} cannot join the control queue")
            }
            ControlError::UnknownSession(sid) => write!(f, "session {sid} is not in the queue"),
            ControlError::InvalidTime { requested } => write!(
                f,
                "turn length {requested}s is outside {}..={}s",
                crate::control::queue::MIN_TURN_SECS,
                crate::control::queue::MAX_TURN_SECS
            ),
        }
    }
}

impl std::error::Error for ControlError {}

/// A control payload that could not be normalized into a `ControlCommand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    UnrecognizedButton(String),
    UnknownThrottle(String),
    UnknownTurn(String),
    PercentOutOfRange { field: &'static str, value: i64 },
    UnsupportedShape,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnrecognizedButton(s) => write!(f, "unrecognized button event {s:?}"),
            CommandError::UnknownThrottle(s) => write!(f, "unknown throttle value {s:?}"),
            CommandError::UnknownTurn(s) => write!(f, "unknown turn value {s:?}"),
            CommandError::PercentOutOfRange { field, value } => {
                write!(f, "{field} must be within 0..=100, got {value}")
            }
            CommandError::UnsupportedShape => write!(f, "unsupported control payload shape"),
        }
    }
}

impl std::error::Error for CommandError {}

/// An inbound gateway frame that could not be turned into a client message.
#[derive(Debug)]
pub enum DecodeError {
    Json(serde_json::Error),
    UnknownEvent(String),
    MissingPayload(&'static str),
    InvalidPayload { event: &'static str, reason: String },
    Command(CommandError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "malformed frame: {e}"),
            DecodeError::UnknownEvent(name) => write!(f, "unknown event type {name:?}"),
            DecodeError::MissingPayload(event) => write!(f, "{event} requires a payload"),
            DecodeError::InvalidPayload { event, reason } => {
                write!(f, "invalid {event} payload: {reason}")
            }
            DecodeError::Command(e) => write!(f, "invalid control command: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e)
    }
}

impl From<CommandError> for DecodeError {
    fn from(e: CommandError) -> Self {
        DecodeError::Command(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Unavailable("down".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Unauthorized("no".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Unauthorized("x".into()).code(), "unauthorized");
        assert_eq!(AppError::Unavailable("x".into()).code(), "unavailable");
    }

    #[test]
    fn test_invalid_time_names_bounds() {
        let msg = ControlError::InvalidTime { requested: 5 }.to_string();
        assert_eq!(msg, "turn length 5s is outside 10..=300s");
    }
}
