use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::ConsoleError;

use super::ConnectionState;

/// Reserved event name carrying connection state transitions.
pub const CONNECTION_EVENT: &str = "connection";
pub const CONNECT_EVENT: &str = "connect";
pub const DISCONNECT_EVENT: &str = "disconnect";
pub const STATUS_EVENT: &str = "status";
pub const HAZARD_EVENT: &str = "hazard";
pub const VIDEO_FRAME_EVENT: &str = "video_frame";
pub const COLOR_FRAME_EVENT: &str = "color_frame";

/// A single message as it travels on the wire, one JSON object per line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireMessage {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "forward" | "f" | "up" => Some(Self::Forward),
            "backward" | "b" | "back" | "down" => Some(Self::Backward),
            "left" | "l" => Some(Self::Left),
            "right" | "r" => Some(Self::Right),
            "stop" | "s" => Some(Self::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera head axis, moved independently of the drive train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadDirection {
    #[serde(rename = "u")]
    Up,
    #[serde(rename = "d")]
    Down,
    #[serde(rename = "l")]
    Left,
    #[serde(rename = "r")]
    Right,
    #[serde(rename = "stop")]
    Stop,
}

impl HeadDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "u",
            Self::Down => "d",
            Self::Left => "l",
            Self::Right => "r",
            Self::Stop => "stop",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "u" | "up" => Some(Self::Up),
            "d" | "down" => Some(Self::Down),
            "l" | "left" => Some(Self::Left),
            "r" | "right" => Some(Self::Right),
            "stop" | "s" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Color name sent with color detection directives. Always trimmed, lowercase and non-empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorName(String);

impl ColorName {
    pub fn new(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ColorName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ColorName::new(&value).ok_or_else(|| "color name cannot be empty".to_string())
    }
}

impl From<ColorName> for String {
    fn from(value: ColorName) -> Self {
        value.0
    }
}

impl fmt::Display for ColorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commands published from the console to the vehicle controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    ManualControl { direction: Direction, speed: u8 },
    Stop,
    StartAutonomous,
    StopAutonomous,
    HeadControl { direction: HeadDirection },
    StartStream,
    StopStream,
    StartLineFollowing,
    StopLineFollowing,
    DetectColor { color: ColorName },
    CloseColorDetect { color: ColorName },
    IncreaseSpeed { speed: u8 },
}

impl Command {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ManualControl { .. } => "manual_control",
            Self::Stop => "stop",
            Self::StartAutonomous => "start_autonomous",
            Self::StopAutonomous => "stop_autonomous",
            Self::HeadControl { .. } => "head_control",
            Self::StartStream => "video-stream",
            Self::StopStream => "stop_stream",
            Self::StartLineFollowing => "start_line_following",
            Self::StopLineFollowing => "stop_line_following",
            Self::DetectColor { .. } => "detect-color",
            Self::CloseColorDetect { .. } => "close_color_detect",
            Self::IncreaseSpeed { .. } => "increase_speed",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::ManualControl { direction, speed } => {
                json!({ "direction": direction.as_str(), "speed": speed })
            }
            Self::HeadControl { direction } => json!({ "direction": direction.as_str() }),
            Self::DetectColor { color } | Self::CloseColorDetect { color } => {
                json!({ "color": color.as_str() })
            }
            Self::IncreaseSpeed { speed } => json!({ "speed": speed }),
            Self::Stop
            | Self::StartAutonomous
            | Self::StopAutonomous
            | Self::StartStream
            | Self::StopStream
            | Self::StartLineFollowing
            | Self::StopLineFollowing => Value::Object(Map::new()),
        }
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage::new(self.event_name(), self.payload())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.event_name(), self.payload())
    }
}

/// Raw status payload. Every field is optional, a missing or malformed field keeps the
/// previously known value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatusReport {
    pub voltage: Option<f64>,
    pub wifi: Option<bool>,
    pub cpu: Option<f64>,
}

impl StatusReport {
    pub fn from_value(data: &Value) -> Self {
        let number = |key: &str| {
            data.get(key)
                .and_then(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                })
                .filter(|n| n.is_finite())
        };
        let wifi = data.get("wifi").and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().filter(|n| n.is_finite()).map(|n| n != 0.),
            _ => None,
        });

        Self {
            voltage: number("voltage"),
            wifi,
            cpu: number("cpu"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardKind {
    #[default]
    Cliff,
    Obstacle,
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cliff => f.write_str("cliff"),
            Self::Obstacle => f.write_str("obstacle"),
        }
    }
}

fn hazard_detected_default() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardSignal {
    #[serde(default)]
    pub kind: HazardKind,
    #[serde(default = "hazard_detected_default")]
    pub detected: bool,
}

impl HazardSignal {
    pub fn detected(kind: HazardKind) -> Self {
        Self {
            kind,
            detected: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Video,
    Color,
}

#[derive(Deserialize)]
struct FramePayload {
    image: String,
}

/// Typed inbound events, after parsing a [`WireMessage`] or a transport state change.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Connection(ConnectionState),
    Status(StatusReport),
    Hazard(HazardSignal),
    Frame { kind: FrameKind, data: Vec<u8> },
}

impl Inbound {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connection(_) => CONNECTION_EVENT,
            Self::Status(_) => STATUS_EVENT,
            Self::Hazard(_) => HAZARD_EVENT,
            Self::Frame {
                kind: FrameKind::Video,
                ..
            } => VIDEO_FRAME_EVENT,
            Self::Frame {
                kind: FrameKind::Color,
                ..
            } => COLOR_FRAME_EVENT,
        }
    }

    /// Whether a subscription registered for `event` should see this event. Connection
    /// changes are also delivered under the `connect` and `disconnect` names.
    pub fn matches(&self, event: &str) -> bool {
        if event == self.event_name() {
            return true;
        }
        match self {
            Self::Connection(ConnectionState::Connected) => event == CONNECT_EVENT,
            Self::Connection(ConnectionState::Disconnected) => event == DISCONNECT_EVENT,
            _ => false,
        }
    }

    pub fn from_wire(message: WireMessage) -> Result<Self, ConsoleError> {
        match message.event.as_str() {
            STATUS_EVENT => Ok(Self::Status(StatusReport::from_value(&message.data))),
            // a bare hazard event without payload is a cliff detection
            HAZARD_EVENT if message.data.is_null() => {
                Ok(Self::Hazard(HazardSignal::detected(HazardKind::default())))
            }
            HAZARD_EVENT => serde_json::from_value::<HazardSignal>(message.data)
                .map(Self::Hazard)
                .map_err(|e| ConsoleError::MalformedPayload {
                    event: message.event,
                    source: e,
                }),
            VIDEO_FRAME_EVENT => decode_frame(FrameKind::Video, message),
            COLOR_FRAME_EVENT => decode_frame(FrameKind::Color, message),
            _ => Err(ConsoleError::UnknownEvent {
                event: message.event,
            }),
        }
    }
}

fn decode_frame(kind: FrameKind, message: WireMessage) -> Result<Inbound, ConsoleError> {
    let payload: FramePayload =
        serde_json::from_value(message.data).map_err(|e| ConsoleError::MalformedPayload {
            event: message.event.clone(),
            source: e,
        })?;
    // some controllers send a full data URL rather than the bare base64 body
    let encoded = payload
        .image
        .split_once("base64,")
        .map(|(_, body)| body)
        .unwrap_or(&payload.image);
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ConsoleError::InvalidFrame {
            event: message.event,
            source: e,
        })?;
    Ok(Inbound::Frame { kind, data })
}
