// End to end operator scenarios over the in-memory channel
//
// Every test drives a Session the way the console does and checks the exact directive
// stream the vehicle would have received.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use rover_console::{
    Command, DriveMode, Inbound, MockChannel, PerceptionMode, Rejection, Session,
    SessionSettings,
    channel::{ColorName, Direction, HazardKind, HazardSignal, HeadDirection, WireMessage},
    control::HazardModePolicy,
};
use serde_json::json;

fn session_with(settings: SessionSettings) -> Session<MockChannel> {
    let mut session = Session::new(MockChannel::new(), settings);
    session.connect().unwrap();
    session.poll(Instant::now());
    session
}

fn session() -> Session<MockChannel> {
    session_with(SessionSettings::default())
}

fn forward(speed: u8) -> Command {
    Command::ManualControl {
        direction: Direction::Forward,
        speed,
    }
}

fn hazard(session: &mut Session<MockChannel>, at: Instant) {
    session
        .channel_mut()
        .push_inbound(Inbound::Hazard(HazardSignal::detected(HazardKind::Cliff)));
    session.poll(at);
}

#[test]
fn test_press_release_and_spurious_release() {
    let mut session = session();
    session.set_speed(80);

    session.request_direction(Direction::Forward).unwrap();
    assert!(session.release_direction());
    assert!(!session.release_direction());

    assert_eq!(session.channel().published(), &[forward(80), Command::Stop]);
}

#[test]
fn test_hazard_while_driving_stops_without_release() {
    let start = Instant::now();
    let mut session = session();
    session.set_speed(80);
    session.request_direction(Direction::Forward).unwrap();

    hazard(&mut session, start);
    assert_eq!(session.control().active_direction(), None);
    assert_eq!(session.channel().published(), &[forward(80), Command::Stop]);
    assert_eq!(
        session.request_direction(Direction::Forward),
        Err(Rejection::HazardActive)
    );

    // the operator lets go of the key while the hazard is latched
    assert!(!session.release_direction());

    session.poll(start + Duration::from_secs(5));
    assert!(!session.control().hazard_active());
    assert_eq!(session.control().active_direction(), None);
    // nothing resumed on its own
    assert_eq!(session.channel().published(), &[forward(80), Command::Stop]);
}

#[test]
fn test_repeated_hazard_extends_the_cooldown() {
    let start = Instant::now();
    let mut session = session();
    hazard(&mut session, start);
    hazard(&mut session, start + Duration::from_secs(3));

    session.poll(start + Duration::from_secs(6));
    assert!(session.control().hazard_active());
    session.poll(start + Duration::from_secs(8));
    assert!(!session.control().hazard_active());
}

#[test]
fn test_hazard_stops_line_following() {
    let start = Instant::now();
    let mut session = session();
    session.set_perception_mode(PerceptionMode::LineFollowing).unwrap();
    session.channel_mut().take_published();

    hazard(&mut session, start);
    assert_eq!(session.channel().published(), &[Command::StopLineFollowing]);
    assert!(session.control().perception_mode().is_idle());
    assert_eq!(
        session.set_perception_mode(PerceptionMode::LineFollowing),
        Err(Rejection::HazardActive)
    );
}

#[test]
fn test_autonomous_switch_sends_one_stop_first() {
    let mut session = session();
    session.request_direction(Direction::Left).unwrap();
    session.channel_mut().take_published();

    assert_eq!(session.set_drive_mode(DriveMode::Autonomous), Ok(true));
    assert_eq!(
        session.channel().published(),
        &[Command::Stop, Command::StartAutonomous]
    );
    assert_eq!(
        session.request_direction(Direction::Right),
        Err(Rejection::AutonomousMode)
    );
    assert_eq!(session.set_drive_mode(DriveMode::Autonomous), Ok(false));

    assert_eq!(session.set_drive_mode(DriveMode::Manual), Ok(true));
    assert_eq!(
        session.channel().published().last(),
        Some(&Command::StopAutonomous)
    );
}

#[test]
fn test_mode_switch_policy_during_hazard() {
    let start = Instant::now();
    let mut blocked = session();
    hazard(&mut blocked, start);
    assert_eq!(
        blocked.set_drive_mode(DriveMode::Autonomous),
        Err(Rejection::ModeSwitchDuringHazard {
            target: DriveMode::Autonomous
        })
    );

    let mut allowed = session_with(SessionSettings {
        hazard_policy: HazardModePolicy::Allow,
        ..Default::default()
    });
    hazard(&mut allowed, start);
    assert_eq!(allowed.set_drive_mode(DriveMode::Autonomous), Ok(true));
}

#[test]
fn test_perception_switch_stops_before_starting() {
    let mut session = session();
    let red = ColorName::new("red").unwrap();
    session.set_perception_mode(PerceptionMode::Recording).unwrap();
    session
        .set_perception_mode(PerceptionMode::ColorDetecting(red.clone()))
        .unwrap();
    session.set_perception_mode(PerceptionMode::Idle).unwrap();

    assert_eq!(
        session.channel().published(),
        &[
            Command::StartStream,
            Command::StopStream,
            Command::DetectColor { color: red.clone() },
            Command::CloseColorDetect { color: red },
        ]
    );
}

#[test]
fn test_speed_change_is_not_retransmitted() {
    let mut session = session();
    session.request_direction(Direction::Forward).unwrap();
    session.set_speed(30);
    assert_eq!(session.control().speed_percent(), 30);
    assert_eq!(session.channel().published(), &[forward(50)]);

    session.sync_speed();
    assert_eq!(
        session.channel().published().last(),
        Some(&Command::IncreaseSpeed { speed: 30 })
    );

    session.request_direction(Direction::Forward).unwrap();
    assert_eq!(session.channel().published().last(), Some(&forward(30)));
}

#[test]
fn test_stale_release_token_is_ignored() {
    let mut session = session();
    let first = session.request_direction(Direction::Left).unwrap();
    let second = session.request_direction(Direction::Right).unwrap();

    assert!(!session.release_direction_with(first));
    assert_eq!(session.control().active_direction(), Some(Direction::Right));
    assert!(session.release_direction_with(second));
}

#[test]
fn test_head_moves_during_hazard() {
    let mut session = session();
    hazard(&mut session, Instant::now());
    session.move_head(HeadDirection::Left);
    assert_eq!(
        session.channel().published().last(),
        Some(&Command::HeadControl {
            direction: HeadDirection::Left
        })
    );
}

#[test]
fn test_wire_frames_follow_the_active_mode() {
    let mut session = session();
    session.set_perception_mode(PerceptionMode::Recording).unwrap();
    session
        .channel_mut()
        .push_wire(WireMessage::new(
            "video_frame",
            json!({"image": "data:image/jpeg;base64,AQID"}),
        ))
        .unwrap();
    session
        .channel_mut()
        .push_wire(WireMessage::new("color_frame", json!({"image": "BAU="})))
        .unwrap();
    session.poll(Instant::now());

    let frame = session.current_frame().unwrap();
    assert_eq!(frame.data, vec![1, 2, 3]);
}

#[test]
fn test_link_loss_keeps_control_state() {
    let mut session = session();
    session.request_direction(Direction::Forward).unwrap();
    session.channel_mut().drop_link();
    session.poll(Instant::now());

    assert_eq!(session.control().active_direction(), Some(Direction::Forward));
    session.channel_mut().restore_link();
    session.poll(Instant::now());
    // the held movement is sent again once the link is back
    assert_eq!(session.channel().published(), &[forward(50), forward(50)]);
    assert!(session.release_direction());
    assert_eq!(session.channel().published().last(), Some(&Command::Stop));
}

#[test]
fn test_reconnect_during_hazard_sends_stop() {
    let start = Instant::now();
    let mut session = session();
    session.request_direction(Direction::Backward).unwrap();
    hazard(&mut session, start);
    session.channel_mut().drop_link();
    session.poll(start);
    session.channel_mut().take_published();

    session.channel_mut().restore_link();
    session.poll(start + Duration::from_secs(1));
    assert!(session.control().hazard_active());
    assert_eq!(session.channel().published(), &[Command::Stop]);
}

#[test]
fn test_reconnect_in_autonomous_mode_sends_nothing() {
    let mut session = session();
    session.set_drive_mode(DriveMode::Autonomous).unwrap();
    session.channel_mut().take_published();

    session.channel_mut().drop_link();
    session.poll(Instant::now());
    session.channel_mut().restore_link();
    session.poll(Instant::now());
    assert!(session.channel().published().is_empty());
}

#[derive(Clone, Debug)]
enum Step {
    Press(Direction),
    Release,
    Speed(i32),
    Hazard,
    Tick(u64),
}

fn step() -> impl Strategy<Value = Step> {
    let direction = prop_oneof![
        Just(Direction::Forward),
        Just(Direction::Backward),
        Just(Direction::Left),
        Just(Direction::Right),
        Just(Direction::Stop),
    ];
    prop_oneof![
        direction.prop_map(Step::Press),
        Just(Step::Release),
        (-50i32..150).prop_map(Step::Speed),
        Just(Step::Hazard),
        (0u64..6_000).prop_map(Step::Tick),
    ]
}

/// Whether ending a hold of `held` has to tell the vehicle to stop.
fn is_movement(held: Option<Direction>) -> bool {
    matches!(held, Some(direction) if direction != Direction::Stop)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A stop is only sent for a `Stop` press or to end a movement.
    #[test]
    fn test_stop_only_ends_a_movement(steps in prop::collection::vec(step(), 1..60)) {
        let start = Instant::now();
        let mut elapsed = 0;
        let mut session = session();
        for step in steps {
            let held = session.control().active_direction();
            let latched = session.control().hazard_active();
            let before = session.channel().published().len();
            let quiet = matches!(step, Step::Speed(_) | Step::Tick(_));
            match step {
                Step::Press(direction) => {
                    let accepted = session.request_direction(direction).is_ok();
                    let sent = &session.channel().published()[before..];
                    prop_assert!(sent.len() <= 1);
                    if !accepted || sent.is_empty() {
                        // rejected, or absorbed by the same hold
                        prop_assert!(!accepted || held == Some(direction));
                        prop_assert!(sent.is_empty());
                    } else if direction == Direction::Stop {
                        prop_assert_eq!(sent, &[Command::Stop]);
                    } else {
                        prop_assert!(matches!(sent[0], Command::ManualControl { .. }), "expected ManualControl");
                    }
                }
                Step::Release => {
                    prop_assert_eq!(session.release_direction(), held.is_some());
                    let sent = &session.channel().published()[before..];
                    if is_movement(held) {
                        prop_assert_eq!(sent, &[Command::Stop]);
                    } else {
                        prop_assert!(sent.is_empty());
                    }
                }
                Step::Speed(value) => { session.set_speed(value); }
                Step::Hazard => {
                    hazard(&mut session, start + Duration::from_millis(elapsed));
                    let sent = &session.channel().published()[before..];
                    if is_movement(held) && !latched {
                        prop_assert_eq!(sent, &[Command::Stop]);
                    } else {
                        prop_assert!(sent.is_empty());
                    }
                }
                Step::Tick(ms) => {
                    elapsed += ms;
                    session.poll(start + Duration::from_millis(elapsed));
                }
            }
            if quiet {
                prop_assert_eq!(session.channel().published().len(), before);
            }
            prop_assert!(session.control().speed_percent() <= 100);
            if session.control().hazard_active() {
                prop_assert_eq!(session.control().active_direction(), None);
            }
        }
    }
}
