//! The single control-command schema forwarded to the vehicle agent.
//!
//! Controllers have historically sent several payload shapes (button strings,
//! signed `{t, s}` percentages, `{throttle, turn}` objects with optional
//! magnitudes). `ControlCommand::from_payload` folds all of them into one
//! tagged form at the gateway boundary so the core only ever sees this type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommandError;

/// Magnitude used when a payload names a direction but no percentage.
pub const DEFAULT_PERCENT: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Throttle {
    Forward,
    Backward,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Turn {
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "none")]
    Straight,
}

impl Throttle {
    fn parse(s: &str) -> Result<Self, CommandError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Throttle::Forward),
            "backward" => Ok(Throttle::Backward),
            "stop" | "none" => Ok(Throttle::Stop),
            _ => Err(CommandError::UnknownThrottle(s.to_string())),
        }
    }

    fn from_signed(value: f64) -> Self {
        if value > 0.0 {
            Throttle::Forward
        } else if value < 0.0 {
            Throttle::Backward
        } else {
            Throttle::Stop
        }
    }
}

impl Turn {
    fn parse(s: &str) -> Result<Self, CommandError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Turn::Left),
            "right" => Ok(Turn::Right),
            "none" | "straight" | "" => Ok(Turn::Straight),
            _ => Err(CommandError::UnknownTurn(s.to_string())),
        }
    }

    fn from_signed(value: f64) -> Self {
        if value > 0.0 {
            Turn::Right
        } else if value < 0.0 {
            Turn::Left
        } else {
            Turn::Straight
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub throttle: Throttle,
    pub turn: Turn,
    pub throttle_percent: u8,
    pub turn_percent: u8,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub emergency: bool,
}

impl ControlCommand {
    pub fn new(throttle: Throttle, turn: Turn, throttle_percent: u8, turn_percent: u8) -> Self {
        Self {
            throttle,
            turn,
            throttle_percent,
            turn_percent,
            emergency: false,
        }
        .normalized()
    }

    /// The canonical full stop sent on every turn change and on admin emergency stop.
    pub fn emergency_stop() -> Self {
        Self {
            throttle: Throttle::Stop,
            turn: Turn::Straight,
            throttle_percent: 0,
            turn_percent: 0,
            emergency: true,
        }
    }

    /// Zero the magnitude of any axis with no direction.
    fn normalized(mut self) -> Self {
        if self.throttle == Throttle::Stop {
            self.throttle_percent = 0;
        }
        if self.turn == Turn::Straight {
            self.turn_percent = 0;
        }
        self
    }

    /// Normalize any accepted wire shape into a command.
    pub fn from_payload(payload: &Value) -> Result<Self, CommandError> {
        match payload {
            Value::String(s) => Self::from_button(s),
            Value::Object(map) => {
                if map.contains_key("throttle") || map.contains_key("turn") {
                    Self::from_named(map)
                } else if map.contains_key("t") || map.contains_key("s") {
                    let t = map.get("t").and_then(as_number).unwrap_or(0.0);
                    let s = map.get("s").and_then(as_number).unwrap_or(0.0);
                    Ok(Self::new(
                        Throttle::from_signed(t),
                        Turn::from_signed(s),
                        clamp_magnitude(t),
                        clamp_magnitude(s),
                    ))
                } else {
                    Err(CommandError::UnsupportedShape)
                }
            }
            _ => Err(CommandError::UnsupportedShape),
        }
    }

    /// Button events of the form `"UP pressed"` / `"LEFT released"`.
    fn from_button(s: &str) -> Result<Self, CommandError> {
        let mut parts = s.split_whitespace();
        let (Some(key), Some(action), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CommandError::UnrecognizedButton(s.to_string()));
        };

        match (
            key.to_ascii_uppercase().as_str(),
            action.to_ascii_lowercase().as_str(),
        ) {
            (_, "released") if is_button(key) => {
                Ok(Self::new(Throttle::Stop, Turn::Straight, 0, 0))
            }
            ("UP", "pressed") => Ok(Self::new(Throttle::Forward, Turn::Straight, DEFAULT_PERCENT, 0)),
            ("DOWN", "pressed") => {
                Ok(Self::new(Throttle::Backward, Turn::Straight, DEFAULT_PERCENT, 0))
            }
            ("LEFT", "pressed") => Ok(Self::new(Throttle::Stop, Turn::Left, 0, DEFAULT_PERCENT)),
            ("RIGHT", "pressed") => Ok(Self::new(Throttle::Stop, Turn::Right, 0, DEFAULT_PERCENT)),
            _ => Err(CommandError::UnrecognizedButton(s.to_string())),
        }
    }

    fn from_named(map: &serde_json::Map<String, Value>) -> Result<Self, CommandError> {
        // A numeric throttle is a signed speed (slider clients).
        let (throttle, signed_throttle) = match map.get("throttle") {
            None | Some(Value::Null) => (Throttle::Stop, None),
            Some(v) => match as_number(v) {
                Some(n) => (Throttle::from_signed(n), Some(n)),
                None => match v.as_str() {
                    Some(s) => (Throttle::parse(s)?, None),
                    None => return Err(CommandError::UnknownThrottle(v.to_string())),
                },
            },
        };

        let turn = match map.get("turn") {
            None | Some(Value::Null) => Turn::Straight,
            Some(Value::String(s)) => Turn::parse(s)?,
            Some(v) => return Err(CommandError::UnknownTurn(v.to_string())),
        };

        let throttle_percent = match map.get("throttle_percent") {
            Some(v) => explicit_percent("throttle_percent", v)?,
            None => map
                .get("throttleValue")
                .and_then(as_number)
                .or(signed_throttle)
                .map(clamp_magnitude)
                .unwrap_or(DEFAULT_PERCENT),
        };

        let turn_percent = match map.get("turn_percent") {
            Some(v) => explicit_percent("turn_percent", v)?,
            None => map
                .get("turnValue")
                .and_then(as_number)
                .map(clamp_magnitude)
                .unwrap_or(DEFAULT_PERCENT),
        };

        Ok(Self::new(throttle, turn, throttle_percent, turn_percent))
    }
}

fn is_button(key: &str) -> bool {
    matches!(
        key.to_ascii_uppercase().as_str(),
        "UP" | "DOWN" | "LEFT" | "RIGHT"
    )
}

/// Accept JSON numbers and numeric strings.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn clamp_magnitude(value: f64) -> u8 {
    value.abs().round().min(100.0) as u8
}

fn explicit_percent(field: &'static str, value: &Value) -> Result<u8, CommandError> {
    let n = as_number(value).ok_or(CommandError::UnsupportedShape)?;
    let rounded = n.round() as i64;
    if !(0..=100).contains(&rounded) {
        return Err(CommandError::PercentOutOfRange {
            field,
            value: rounded,
        });
    }
    Ok(rounded as u8)
}
