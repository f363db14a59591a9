use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::{ColorName, Command, FrameKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveMode {
    #[default]
    Manual,
    Autonomous,
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Autonomous => f.write_str("autonomous"),
        }
    }
}

/// Vision driven behaviours of the vehicle. Only one may be active at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerceptionMode {
    #[default]
    Idle,
    Recording,
    LineFollowing,
    ColorDetecting(ColorName),
}

impl PerceptionMode {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Directive that starts this mode on the controller.
    pub fn start_command(&self) -> Option<Command> {
        match self {
            Self::Idle => None,
            Self::Recording => Some(Command::StartStream),
            Self::LineFollowing => Some(Command::StartLineFollowing),
            Self::ColorDetecting(color) => Some(Command::DetectColor {
                color: color.clone(),
            }),
        }
    }

    /// Directive that stops this mode on the controller.
    pub fn stop_command(&self) -> Option<Command> {
        match self {
            Self::Idle => None,
            Self::Recording => Some(Command::StopStream),
            Self::LineFollowing => Some(Command::StopLineFollowing),
            Self::ColorDetecting(color) => Some(Command::CloseColorDetect {
                color: color.clone(),
            }),
        }
    }

    /// Kind of frames the controller streams while this mode is active.
    pub fn frame_kind(&self) -> Option<FrameKind> {
        match self {
            Self::Recording => Some(FrameKind::Video),
            Self::ColorDetecting(_) => Some(FrameKind::Color),
            Self::Idle | Self::LineFollowing => None,
        }
    }
}

impl fmt::Display for PerceptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Recording => f.write_str("recording"),
            Self::LineFollowing => f.write_str("line following"),
            Self::ColorDetecting(color) => write!(f, "detecting {}", color),
        }
    }
}

/// What a latched hazard does to drive mode switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardModePolicy {
    /// No drive mode switch while a hazard is latched
    #[default]
    BlockAll,
    /// Only switching into autonomous is blocked, falling back to manual is allowed
    BlockAutonomousOnly,
    Allow,
}

impl HazardModePolicy {
    pub fn blocks(&self, target: DriveMode) -> bool {
        match self {
            Self::BlockAll => true,
            Self::BlockAutonomousOnly => target == DriveMode::Autonomous,
            Self::Allow => false,
        }
    }
}
