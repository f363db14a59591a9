pub mod mode;

use log::{debug, warn};
use snafu::Snafu;

use crate::channel::{Command, CommandSink, Direction, HeadDirection};

pub use mode::{DriveMode, HazardModePolicy, PerceptionMode};

pub const DEFAULT_SPEED_PCT: u8 = 50;
pub const MAX_SPEED_PCT: u8 = 100;

/// An operator intent refused locally. Nothing is published when an intent is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum Rejection {
    #[snafu(display("Directional commands are not accepted in autonomous mode"))]
    AutonomousMode,
    #[snafu(display("A hazard is active, movement is blocked until it clears"))]
    HazardActive,
    #[snafu(display("Drive mode cannot change to {target} while a hazard is active"))]
    ModeSwitchDuringHazard { target: DriveMode },
}

/// Correlates an accepted directional press with its release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DirectionToken(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeldDirection {
    direction: Direction,
    /// speed sent with the press, later speed changes are not retransmitted
    speed: u8,
    token: DirectionToken,
}

/// What the override stop did when a hazard latched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HazardOverride {
    pub released_direction: Option<Direction>,
    pub stopped_line_following: bool,
}

/// Arbitrates every operator intent before it reaches the channel.
///
/// Each operation takes the sink commands are published to, so the machine itself holds no
/// reference to the transport. Every method leaves the state fully consistent before it
/// returns.
#[derive(Debug)]
pub struct ControlStateMachine {
    drive_mode: DriveMode,
    perception_mode: PerceptionMode,
    held: Option<HeldDirection>,
    speed_percent: u8,
    hazard: bool,
    hazard_policy: HazardModePolicy,
    next_token: u64,
}

impl Default for ControlStateMachine {
    fn default() -> Self {
        ControlStateMachine::new(DEFAULT_SPEED_PCT, HazardModePolicy::default())
    }
}

impl ControlStateMachine {
    pub fn new(speed_percent: u8, hazard_policy: HazardModePolicy) -> Self {
        Self {
            drive_mode: DriveMode::Manual,
            perception_mode: PerceptionMode::Idle,
            held: None,
            speed_percent: speed_percent.min(MAX_SPEED_PCT),
            hazard: false,
            hazard_policy,
            next_token: 0,
        }
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.drive_mode
    }

    pub fn perception_mode(&self) -> &PerceptionMode {
        &self.perception_mode
    }

    pub fn active_direction(&self) -> Option<Direction> {
        self.held.map(|held| held.direction)
    }

    pub fn speed_percent(&self) -> u8 {
        self.speed_percent
    }

    pub fn hazard_active(&self) -> bool {
        self.hazard
    }

    pub fn hazard_policy(&self) -> HazardModePolicy {
        self.hazard_policy
    }

    /// Starts (or changes) a press-and-hold movement.
    ///
    /// Pressing the direction that is already held at the speed already sent is absorbed
    /// and returns the existing token, so duplicate press events never reach the channel.
    /// A held `Stop` absorbs further `Stop` presses whatever the speed.
    pub fn request_direction(
        &mut self,
        direction: Direction,
        sink: &mut impl CommandSink,
    ) -> Result<DirectionToken, Rejection> {
        if self.drive_mode == DriveMode::Autonomous {
            return Err(Rejection::AutonomousMode);
        }
        if self.hazard {
            return Err(Rejection::HazardActive);
        }
        if let Some(held) = self.held {
            let same_speed = held.speed == self.speed_percent || direction == Direction::Stop;
            if held.direction == direction && same_speed {
                debug!("{} already held, press absorbed", direction);
                return Ok(held.token);
            }
        }

        self.next_token += 1;
        let token = DirectionToken(self.next_token);
        let command = match direction {
            Direction::Stop => Command::Stop,
            _ => Command::ManualControl {
                direction,
                speed: self.speed_percent,
            },
        };
        sink.publish(command);
        self.held = Some(HeldDirection {
            direction,
            speed: self.speed_percent,
            token,
        });
        Ok(token)
    }

    /// Ends the current hold with a single stop. Returns whether anything was released.
    /// Releasing with nothing held publishes nothing, and neither does releasing a `Stop`
    /// hold since the vehicle was already told to stop.
    pub fn release_direction(&mut self, sink: &mut impl CommandSink) -> bool {
        match self.held.take() {
            Some(held) => {
                if held.direction != Direction::Stop {
                    sink.publish(Command::Stop);
                }
                true
            }
            None => false,
        }
    }

    /// Releases only if `token` belongs to the current hold. A late release from an
    /// earlier press leaves a newer hold alone.
    pub fn release_direction_with(
        &mut self,
        token: DirectionToken,
        sink: &mut impl CommandSink,
    ) -> bool {
        match self.held {
            Some(held) if held.token == token => self.release_direction(sink),
            _ => false,
        }
    }

    /// Publishes again the directive the vehicle should currently be following: the held
    /// movement, or a stop when nothing is held. Autonomous mode has no directive to
    /// repeat. Returns the command sent.
    pub fn reassert_directive(&self, sink: &mut impl CommandSink) -> Option<Command> {
        if self.drive_mode == DriveMode::Autonomous {
            return None;
        }
        let command = match self.held {
            Some(held) if held.direction != Direction::Stop => Command::ManualControl {
                direction: held.direction,
                speed: held.speed,
            },
            _ => Command::Stop,
        };
        sink.publish(command.clone());
        Some(command)
    }

    /// Stores the new speed, clamped to 0-100. It applies from the next press on.
    pub fn set_speed(&mut self, value: i32) -> u8 {
        self.speed_percent = value.clamp(0, i32::from(MAX_SPEED_PCT)) as u8;
        self.speed_percent
    }

    /// Sends the stored speed on its own, without a movement.
    pub fn sync_speed(&mut self, sink: &mut impl CommandSink) {
        sink.publish(Command::IncreaseSpeed {
            speed: self.speed_percent,
        });
    }

    /// Returns `Ok(false)` when `mode` is already active.
    pub fn set_drive_mode(
        &mut self,
        mode: DriveMode,
        sink: &mut impl CommandSink,
    ) -> Result<bool, Rejection> {
        if mode == self.drive_mode {
            return Ok(false);
        }
        if self.hazard && self.hazard_policy.blocks(mode) {
            return Err(Rejection::ModeSwitchDuringHazard { target: mode });
        }

        match mode {
            DriveMode::Autonomous => {
                self.release_direction(sink);
                sink.publish(Command::StartAutonomous);
            }
            DriveMode::Manual => sink.publish(Command::StopAutonomous),
        }
        self.drive_mode = mode;
        Ok(true)
    }

    /// Switches perception mode, always stopping the previous mode before starting the
    /// next. Returns `Ok(false)` when `mode` is already active.
    pub fn set_perception_mode(
        &mut self,
        mode: PerceptionMode,
        sink: &mut impl CommandSink,
    ) -> Result<bool, Rejection> {
        if mode == self.perception_mode {
            return Ok(false);
        }
        if self.hazard && mode == PerceptionMode::LineFollowing {
            return Err(Rejection::HazardActive);
        }

        if let Some(stop) = self.perception_mode.stop_command() {
            sink.publish(stop);
        }
        if let Some(start) = mode.start_command() {
            sink.publish(start);
        }
        self.perception_mode = mode;
        Ok(true)
    }

    pub fn move_head(&mut self, direction: HeadDirection, sink: &mut impl CommandSink) {
        sink.publish(Command::HeadControl { direction });
    }

    /// Latches the hazard and performs the override stop, whatever the current mode.
    pub(crate) fn engage_hazard(&mut self, sink: &mut impl CommandSink) -> HazardOverride {
        self.hazard = true;
        let released_direction = self.active_direction();
        self.release_direction(sink);

        let stopped_line_following = self.perception_mode == PerceptionMode::LineFollowing;
        if stopped_line_following {
            warn!("Stopping line following for hazard");
            sink.publish(Command::StopLineFollowing);
            self.perception_mode = PerceptionMode::Idle;
        }

        HazardOverride {
            released_direction,
            stopped_line_following,
        }
    }

    /// Unlatches the hazard. Nothing is resumed, the operator has to press again.
    pub(crate) fn clear_hazard(&mut self) {
        self.hazard = false;
    }
}
