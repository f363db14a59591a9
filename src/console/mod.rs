mod status_view;

use log::debug;

use crate::{
    ConsoleError,
    channel::{Channel, ColorName, Direction, HeadDirection},
    control::{DriveMode, PerceptionMode},
    session::Session,
};

pub use status_view::{render_log, render_status};

pub(crate) const HELP: &str = "commands: press <forward|backward|left|right|stop>, release, \
speed <0-100>, sync-speed, mode <manual|auto>, record <on|off>, line <on|off>, \
color <name|off>, head <u|d|l|r|stop>, status, log, quit";

/// One line typed by the operator, already validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Press(Direction),
    Release,
    Speed(i32),
    SyncSpeed,
    Mode(DriveMode),
    Record(bool),
    LineFollowing(bool),
    /// `None` turns color detection off
    Color(Option<ColorName>),
    Head(HeadDirection),
    Status,
    Log,
    Help,
    Quit,
}

fn invalid(input: &str, reason: impl Into<String>) -> ConsoleError {
    ConsoleError::InvalidOperatorCommand {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn parse_switch(input: &str, value: Option<&str>) -> Result<bool, ConsoleError> {
    match value {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(invalid(input, "expected on or off")),
    }
}

pub fn parse_intent(line: &str) -> Result<Intent, ConsoleError> {
    let input = line.trim();
    let lowered = input.to_lowercase();
    let mut words = lowered.split_whitespace();
    let Some(command) = words.next() else {
        return Err(invalid(input, "empty command"));
    };
    let argument = words.next();
    if words.next().is_some() {
        return Err(invalid(input, "too many arguments"));
    }

    let intent = match command {
        "press" | "go" => {
            let direction = argument
                .and_then(Direction::parse)
                .ok_or_else(|| invalid(input, "expected forward, backward, left, right or stop"))?;
            Intent::Press(direction)
        }
        "release" => Intent::Release,
        "speed" => {
            let value = argument
                .ok_or_else(|| invalid(input, "missing speed value"))?
                .parse::<i32>()
                .map_err(|e| invalid(input, e.to_string()))?;
            Intent::Speed(value)
        }
        "sync-speed" => Intent::SyncSpeed,
        "mode" => match argument {
            Some("manual") => Intent::Mode(DriveMode::Manual),
            Some("auto") | Some("autonomous") => Intent::Mode(DriveMode::Autonomous),
            _ => return Err(invalid(input, "expected manual or auto")),
        },
        "record" => Intent::Record(parse_switch(input, argument)?),
        "line" => Intent::LineFollowing(parse_switch(input, argument)?),
        "color" => match argument {
            Some("off") => Intent::Color(None),
            Some(name) => Intent::Color(Some(
                ColorName::new(name).ok_or_else(|| invalid(input, "empty color name"))?,
            )),
            None => return Err(invalid(input, "missing color name")),
        },
        "head" => {
            let direction = argument
                .and_then(HeadDirection::parse)
                .ok_or_else(|| invalid(input, "expected u, d, l, r or stop"))?;
            Intent::Head(direction)
        }
        "status" => Intent::Status,
        "log" => Intent::Log,
        "help" | "?" => Intent::Help,
        "quit" | "exit" => Intent::Quit,
        _ => return Err(invalid(input, "unknown command")),
    };

    // only commands that take an argument may carry one
    let takes_argument = matches!(
        intent,
        Intent::Press(_)
            | Intent::Speed(_)
            | Intent::Mode(_)
            | Intent::Record(_)
            | Intent::LineFollowing(_)
            | Intent::Color(_)
            | Intent::Head(_)
    );
    if !takes_argument && argument.is_some() {
        return Err(invalid(input, "unexpected argument"));
    }
    Ok(intent)
}

/// Turning a perception mode off only applies to the mode that is actually running.
fn perception_target(
    current: &PerceptionMode,
    requested: PerceptionMode,
    on: bool,
) -> Option<PerceptionMode> {
    if on {
        Some(requested)
    } else if std::mem::discriminant(current) == std::mem::discriminant(&requested) {
        Some(PerceptionMode::Idle)
    } else {
        None
    }
}

/// Applies `intent` to the session and returns the feedback line for the operator.
pub fn apply_intent<C: Channel>(session: &mut Session<C>, intent: Intent) -> String {
    debug!("Applying operator intent {:?}", intent);
    match intent {
        Intent::Press(direction) => match session.request_direction(direction) {
            Ok(_) => format!(
                "{} at {}%",
                direction,
                session.control().speed_percent()
            ),
            Err(rejection) => format!("rejected: {}", rejection),
        },
        Intent::Release => {
            if session.release_direction() {
                "stopped".to_string()
            } else {
                "nothing to release".to_string()
            }
        }
        Intent::Speed(value) => format!("speed set to {}%", session.set_speed(value)),
        Intent::SyncSpeed => {
            session.sync_speed();
            format!("speed {}% sent", session.control().speed_percent())
        }
        Intent::Mode(mode) => match session.set_drive_mode(mode) {
            Ok(true) => format!("{} mode enabled", mode),
            Ok(false) => format!("already in {} mode", mode),
            Err(rejection) => format!("rejected: {}", rejection),
        },
        Intent::Record(on) => set_perception(session, PerceptionMode::Recording, on),
        Intent::LineFollowing(on) => set_perception(session, PerceptionMode::LineFollowing, on),
        Intent::Color(Some(color)) => {
            set_perception(session, PerceptionMode::ColorDetecting(color), true)
        }
        Intent::Color(None) => {
            let current = session.control().perception_mode().clone();
            match current {
                PerceptionMode::ColorDetecting(_) => set_perception(session, current, false),
                _ => "color detection is not active".to_string(),
            }
        }
        Intent::Head(direction) => {
            session.move_head(direction);
            format!("head {}", direction.as_str())
        }
        Intent::Status => render_status(session),
        Intent::Log => render_log(session.event_log()),
        Intent::Help => HELP.to_string(),
        Intent::Quit => "bye".to_string(),
    }
}

fn set_perception<C: Channel>(
    session: &mut Session<C>,
    requested: PerceptionMode,
    on: bool,
) -> String {
    let Some(target) = perception_target(session.control().perception_mode(), requested.clone(), on)
    else {
        return format!("{} is not active", requested);
    };
    match session.set_perception_mode(target) {
        Ok(true) => format!("perception: {}", session.control().perception_mode()),
        Ok(false) => format!("already {}", session.control().perception_mode()),
        Err(rejection) => format!("rejected: {}", rejection),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{
        channel::{Command, MockChannel},
        session::SessionSettings,
    };

    fn session() -> Session<MockChannel> {
        let mut session = Session::new(MockChannel::new(), SessionSettings::default());
        session.connect().unwrap();
        session.poll(Instant::now());
        session
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_intent("press forward").unwrap(),
            Intent::Press(Direction::Forward)
        );
        assert_eq!(parse_intent("  SPEED 80 ").unwrap(), Intent::Speed(80));
        assert_eq!(
            parse_intent("mode auto").unwrap(),
            Intent::Mode(DriveMode::Autonomous)
        );
        assert_eq!(parse_intent("record on").unwrap(), Intent::Record(true));
        assert_eq!(parse_intent("color off").unwrap(), Intent::Color(None));
        assert_eq!(
            parse_intent("color Red").unwrap(),
            Intent::Color(ColorName::new("red"))
        );
        assert_eq!(
            parse_intent("head u").unwrap(),
            Intent::Head(HeadDirection::Up)
        );
        assert_eq!(parse_intent("quit").unwrap(), Intent::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for line in [
            "",
            "fly",
            "press sideways",
            "speed fast",
            "record maybe",
            "status now",
            "press forward now",
        ] {
            assert!(
                matches!(
                    parse_intent(line),
                    Err(ConsoleError::InvalidOperatorCommand { .. })
                ),
                "{line:?} should not parse"
            );
        }
    }

    #[test]
    fn test_press_and_release() {
        let mut session = session();
        apply_intent(&mut session, Intent::Speed(80));
        assert_eq!(
            apply_intent(&mut session, Intent::Press(Direction::Forward)),
            "forward at 80%"
        );
        assert_eq!(apply_intent(&mut session, Intent::Release), "stopped");
        assert_eq!(
            apply_intent(&mut session, Intent::Release),
            "nothing to release"
        );
        assert_eq!(
            session.channel().published(),
            &[
                Command::ManualControl {
                    direction: Direction::Forward,
                    speed: 80
                },
                Command::Stop
            ]
        );
    }

    #[test]
    fn test_rejections_are_reported() {
        let mut session = session();
        apply_intent(&mut session, Intent::Mode(DriveMode::Autonomous));
        let reply = apply_intent(&mut session, Intent::Press(Direction::Left));
        assert!(reply.starts_with("rejected:"));
    }

    #[test]
    fn test_switching_off_inactive_mode_is_noop() {
        let mut session = session();
        apply_intent(&mut session, Intent::Record(true));
        session.channel_mut().take_published();

        assert_eq!(
            apply_intent(&mut session, Intent::LineFollowing(false)),
            "line following is not active"
        );
        assert_eq!(
            apply_intent(&mut session, Intent::Color(None)),
            "color detection is not active"
        );
        assert!(session.channel().published().is_empty());

        apply_intent(&mut session, Intent::Record(false));
        assert_eq!(session.channel().published(), &[Command::StopStream]);
        assert!(session.control().perception_mode().is_idle());
    }
}
