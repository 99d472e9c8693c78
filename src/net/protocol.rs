//! Inbound multiplayer message definitions
//! Messages arrive as a kind plus loosely typed key/value parameters; the
//! transport that carries them lives outside this crate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::race::laptime::Millis;

/// Message kinds exchanged between peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Position and lap state of a remote car
    Update,
    Chat,
    Start,
    Stop,
    Pause,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "update",
            Self::Chat => "chat",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
        };
        f.write_str(name)
    }
}

/// A parameter value: peers may send numbers either as numbers or as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Message decoding errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MessageError {
    #[error("Missing parameter '{0}'")]
    MissingParam(&'static str),

    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParam { name: &'static str, value: String },

    #[error("Expected an update message, got '{0}'")]
    WrongKind(MessageKind),
}

/// Message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetMessage {
    pub kind: MessageKind,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl NetMessage {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn chat(text: &str) -> Self {
        Self::new(MessageKind::Chat).with("text", text)
    }

    fn required(&self, name: &'static str) -> Result<&ParamValue, MessageError> {
        self.param(name).ok_or(MessageError::MissingParam(name))
    }

    fn float(&self, name: &'static str) -> Result<f32, MessageError> {
        let value = self.required(name)?;
        value
            .as_f64()
            .map(|v| v as f32)
            .filter(|v| v.is_finite())
            .ok_or_else(|| MessageError::InvalidParam {
                name,
                value: value.as_text(),
            })
    }

    fn optional_float(&self, name: &'static str) -> Result<Option<f32>, MessageError> {
        match self.param(name) {
            None => Ok(None),
            Some(_) => self.float(name).map(Some),
        }
    }

    fn unsigned(&self, name: &'static str) -> Result<u64, MessageError> {
        let value = self.required(name)?;
        value
            .as_i64()
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| MessageError::InvalidParam {
                name,
                value: value.as_text(),
            })
    }

    fn optional_unsigned(&self, name: &'static str) -> Result<Option<u64>, MessageError> {
        match self.param(name) {
            None => Ok(None),
            Some(_) => self.unsigned(name).map(Some),
        }
    }
}

/// Authoritative state of a remote car, decoded from an update message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DroneUpdate {
    pub id: Uuid,
    pub x: f32,
    /// Height is optional; the local terrain supplies it otherwise
    pub y: Option<f32>,
    pub z: f32,
    pub orientation: f32,
    pub direction: f32,
    pub lap: u32,
    pub intermediate: usize,
    pub point: usize,
    /// Elapsed time of the lap in progress
    pub laptime: Millis,
    pub speed: f32,
    pub angular_speed: f32,
    /// Time of the lap just completed, when the peer sends it
    pub last_lap: Option<Millis>,
}

impl DroneUpdate {
    pub fn from_message(msg: &NetMessage) -> Result<Self, MessageError> {
        if msg.kind != MessageKind::Update {
            return Err(MessageError::WrongKind(msg.kind));
        }

        let id_value = msg.required("id")?;
        let id = Uuid::parse_str(id_value.as_text().trim()).map_err(|_| {
            MessageError::InvalidParam {
                name: "id",
                value: id_value.as_text(),
            }
        })?;

        let narrow = |name: &'static str, v: u64| -> Result<u32, MessageError> {
            u32::try_from(v).map_err(|_| MessageError::InvalidParam {
                name,
                value: v.to_string(),
            })
        };

        let last_lap = match msg.optional_unsigned("last_lap")? {
            Some(v) => Some(narrow("last_lap", v)?),
            None => None,
        };

        Ok(Self {
            id,
            x: msg.float("x")?,
            y: msg.optional_float("y")?,
            z: msg.float("z")?,
            orientation: msg.float("orientation")?,
            direction: msg.float("direction")?,
            lap: narrow("lap", msg.unsigned("lap")?)?,
            intermediate: msg.unsigned("intermediate")? as usize,
            point: msg.unsigned("point")? as usize,
            laptime: narrow("laptime", msg.unsigned("laptime")?)?,
            speed: msg.float("speed")?,
            angular_speed: msg.float("angular_speed")?,
            last_lap,
        })
    }

    /// Encode as an update message
    pub fn to_message(&self) -> NetMessage {
        let mut msg = NetMessage::new(MessageKind::Update)
            .with("id", self.id.to_string().as_str())
            .with("x", self.x)
            .with("z", self.z)
            .with("orientation", self.orientation)
            .with("direction", self.direction)
            .with("lap", self.lap as i64)
            .with("intermediate", self.intermediate as i64)
            .with("point", self.point as i64)
            .with("laptime", self.laptime as i64)
            .with("speed", self.speed)
            .with("angular_speed", self.angular_speed);
        if let Some(y) = self.y {
            msg = msg.with("y", y);
        }
        if let Some(last) = self.last_lap {
            msg = msg.with("last_lap", last as i64);
        }
        msg
    }
}
