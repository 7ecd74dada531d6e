use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;
use crate::models::command::{as_number, ControlCommand};
use crate::models::queue::{QueueEntry, QueueSnapshot};

/// Client→server event names.
pub mod event {
    pub const USER_REQUEST_ADD: &str = "userRequestAdd";
    pub const IDENTIFY: &str = "identify";
    pub const TIMEOVER: &str = "timeover";
    pub const TIMELEFT: &str = "timeleft";
    pub const MESSAGE: &str = "message";
    pub const CONTROL_DATA: &str = "controlData";
    pub const ADMIN_REQUEST_QUEUE: &str = "adminRequestQueue";
    pub const ADMIN_SET_DEFAULT_TIME: &str = "adminSetDefaultTime";
    pub const ADMIN_UPDATE_USER: &str = "adminUpdateUser";
    pub const ADMIN_REMOVE_USER: &str = "adminRemoveUser";
    pub const ADMIN_FORCE_NEXT: &str = "adminForceNext";
    pub const ADMIN_EMERGENCY_STOP: &str = "adminEmergencyStop";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Gateway frame envelope: `{"type": ..., "data": ...}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server→client events. Serialized with the same envelope as inbound frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "hello")]
    Hello {
        session_id: String,
        heartbeat_interval: u64,
    },
    #[serde(rename = "timestart")]
    TimeStart(u32),
    #[serde(rename = "controlOff")]
    ControlOff(&'static str),
    #[serde(rename = "pi_command")]
    PiCommand(ControlCommand),
    #[serde(rename = "adminResponseQueue")]
    AdminResponseQueue(QueueSnapshot),
    #[serde(rename = "adminResponseRow")]
    AdminResponseRow(QueueEntry),
    #[serde(rename = "adminNotification")]
    AdminNotification { message: String, timestamp: f64 },
    #[serde(rename = "piStatus")]
    PiStatus { connected: bool },
    #[serde(rename = "heartbeat_ack")]
    HeartbeatAck,
}

impl ServerEvent {
    pub fn control_off() -> Self {
        ServerEvent::ControlOff("ack")
    }

    /// Admin notification stamped with the current time in fractional Unix seconds.
    pub fn notification(message: impl Into<String>) -> Self {
        ServerEvent::AdminNotification {
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Hello { .. } => "hello",
            ServerEvent::TimeStart(_) => "timestart",
            ServerEvent::ControlOff(_) => "controlOff",
            ServerEvent::PiCommand(_) => "pi_command",
            ServerEvent::AdminResponseQueue(_) => "adminResponseQueue",
            ServerEvent::AdminResponseRow(_) => "adminResponseRow",
            ServerEvent::AdminNotification { .. } => "adminNotification",
            ServerEvent::PiStatus { .. } => "piStatus",
            ServerEvent::HeartbeatAck => "heartbeat_ack",
        }
    }

    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct IdentifyData {
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeLeftData {
    message: Value,
}

#[derive(Debug, Default, Deserialize)]
struct AdminRequestData {
    passphrase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetDefaultTimeData {
    time: Value,
}

#[derive(Debug, Deserialize)]
struct UpdateUserData {
    sid: String,
    #[serde(rename = "timeAllowed")]
    time_allowed: Value,
}

#[derive(Debug, Deserialize)]
struct RemoveUserData {
    sid: String,
}

/// A decoded client→server event, ready for the arbiter.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    RequestAdd,
    Identify { user_agent: Option<String> },
    TimeOver,
    TimeLeft { remaining: u32 },
    Control(ControlCommand),
    AdminRequestQueue { passphrase: Option<String> },
    AdminSetDefaultTime { time: i64 },
    AdminUpdateUser { sid: String, time_allowed: i64 },
    AdminRemoveUser { sid: String },
    AdminForceNext,
    AdminEmergencyStop,
}

impl ClientMessage {
    pub fn decode(msg: GatewayMessage) -> Result<Self, DecodeError> {
        let data = msg.data;
        let decoded = match msg.event_type.as_str() {
            event::USER_REQUEST_ADD => ClientMessage::RequestAdd,
            event::IDENTIFY => {
                let identify: IdentifyData = optional_payload(data)?;
                ClientMessage::Identify {
                    user_agent: identify.user_agent,
                }
            }
            event::TIMEOVER => ClientMessage::TimeOver,
            event::TIMELEFT => {
                let report: TimeLeftData = required_payload(event::TIMELEFT, data)?;
                let seconds = as_number(&report.message).ok_or(DecodeError::InvalidPayload {
                    event: event::TIMELEFT,
                    reason: "message must be a number of seconds".to_string(),
                })?;
                ClientMessage::TimeLeft {
                    remaining: seconds.round().clamp(0.0, u32::MAX as f64) as u32,
                }
            }
            event::MESSAGE | event::CONTROL_DATA => {
                let payload = data.ok_or(DecodeError::MissingPayload(event::CONTROL_DATA))?;
                ClientMessage::Control(ControlCommand::from_payload(&payload)?)
            }
            event::ADMIN_REQUEST_QUEUE => {
                let request: AdminRequestData = optional_payload(data)?;
                ClientMessage::AdminRequestQueue {
                    passphrase: request.passphrase,
                }
            }
            event::ADMIN_SET_DEFAULT_TIME => {
                let payload: SetDefaultTimeData =
                    required_payload(event::ADMIN_SET_DEFAULT_TIME, data)?;
                ClientMessage::AdminSetDefaultTime {
                    time: whole_seconds(event::ADMIN_SET_DEFAULT_TIME, &payload.time)?,
                }
            }
            event::ADMIN_UPDATE_USER => {
                let payload: UpdateUserData = required_payload(event::ADMIN_UPDATE_USER, data)?;
                ClientMessage::AdminUpdateUser {
                    time_allowed: whole_seconds(event::ADMIN_UPDATE_USER, &payload.time_allowed)?,
                    sid: payload.sid,
                }
            }
            event::ADMIN_REMOVE_USER => {
                let payload: RemoveUserData = required_payload(event::ADMIN_REMOVE_USER, data)?;
                ClientMessage::AdminRemoveUser { sid: payload.sid }
            }
            event::ADMIN_FORCE_NEXT => ClientMessage::AdminForceNext,
            event::ADMIN_EMERGENCY_STOP => ClientMessage::AdminEmergencyStop,
            other => return Err(DecodeError::UnknownEvent(other.to_string())),
        };
        Ok(decoded)
    }
}

/// Payloads whose fields are all optional; a missing or non-object payload decodes as default.
fn optional_payload<T>(data: Option<Value>) -> Result<T, DecodeError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match data {
        Some(v @ Value::Object(_)) => Ok(serde_json::from_value(v)?),
        _ => Ok(T::default()),
    }
}

fn required_payload<T>(event: &'static str, data: Option<Value>) -> Result<T, DecodeError>
where
    T: for<'de> Deserialize<'de>,
{
    let data = data.ok_or(DecodeError::MissingPayload(event))?;
    serde_json::from_value(data).map_err(|e| DecodeError::InvalidPayload {
        event,
        reason: e.to_string(),
    })
}

fn whole_seconds(event: &'static str, value: &Value) -> Result<i64, DecodeError> {
    as_number(value)
        .map(|n| n.trunc() as i64)
        .ok_or(DecodeError::InvalidPayload {
            event,
            reason: "expected a number of seconds".to_string(),
        })
}
