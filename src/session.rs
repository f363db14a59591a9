use std::time::{Duration, Instant};

use log::{info, warn};

use crate::{
    ConsoleError,
    channel::{Channel, ConnectionState, Direction, HazardSignal, HeadDirection, Inbound},
    control::{
        ControlStateMachine, DEFAULT_SPEED_PCT, DirectionToken, DriveMode, HazardModePolicy,
        PerceptionMode, Rejection,
    },
    event_log::{EVENT_LOG_CAPACITY, EventLog},
    frames::{Frame, FrameBuffer},
    safety::{HAZARD_COOLDOWN_MS, InterlockOutcome, SafetyInterlock},
    telemetry::{BatteryCalibration, BatteryLevel, BatteryReading, TelemetrySnapshot, TelemetryStore},
};

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub default_speed: u8,
    pub hazard_cooldown: Duration,
    pub hazard_policy: HazardModePolicy,
    pub battery: BatteryCalibration,
    pub event_log_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_speed: DEFAULT_SPEED_PCT,
            hazard_cooldown: Duration::from_millis(HAZARD_COOLDOWN_MS),
            hazard_policy: HazardModePolicy::default(),
            battery: BatteryCalibration::default(),
            event_log_capacity: EVENT_LOG_CAPACITY,
        }
    }
}

/// One operator session against one vehicle.
///
/// The session owns the channel for its whole lifetime and is the only place session state
/// is mutated. Operator intents and inbound events are both handled synchronously on the
/// caller's thread, each call returns with the state consistent.
///
/// Inbound handling runs on the time passed to [`Session::poll`]. Intents the hazard can
/// block first clear an expired hazard against the wall clock, so a caller that never
/// polls is not latched for good.
pub struct Session<C: Channel> {
    channel: C,
    control: ControlStateMachine,
    interlock: SafetyInterlock,
    telemetry: TelemetryStore,
    frames: FrameBuffer,
    log: EventLog,
    battery_level: Option<BatteryLevel>,
    /// Set when an established link drops, cleared once the directive is re-sent
    link_lost: bool,
}

impl<C: Channel> Session<C> {
    pub fn new(channel: C, settings: SessionSettings) -> Self {
        Self {
            channel,
            control: ControlStateMachine::new(settings.default_speed, settings.hazard_policy),
            interlock: SafetyInterlock::new(settings.hazard_cooldown),
            telemetry: TelemetryStore::new(settings.battery),
            frames: FrameBuffer::default(),
            log: EventLog::new(settings.event_log_capacity),
            battery_level: None,
            link_lost: false,
        }
    }

    pub fn connect(&mut self) -> Result<(), ConsoleError> {
        self.channel.connect()
    }

    /// Drains inbound events, applies them and advances the interlock timer. Returns the
    /// number of events handled.
    ///
    /// An expired hazard is cleared before the batch is applied, so a signal arriving
    /// after the cooldown engages a new hazard instead of extending the old one.
    pub fn poll(&mut self, now: Instant) -> usize {
        self.tick(now);
        let events = self.channel.poll();
        let handled = events.len();
        for event in events {
            self.handle_inbound(event, now);
        }
        self.tick(now);
        handled
    }

    pub fn handle_inbound(&mut self, event: Inbound, now: Instant) {
        match event {
            Inbound::Connection(state) => self.on_connection(state),
            Inbound::Status(report) => {
                self.telemetry.apply_status(&report);
                self.check_battery();
            }
            Inbound::Hazard(signal) => self.on_hazard(&signal, now),
            Inbound::Frame { kind, data } => {
                self.frames
                    .on_frame(kind, data, self.control.perception_mode());
            }
        }
    }

    /// Clears the hazard once its cooldown has run out.
    pub fn tick(&mut self, now: Instant) {
        if self.interlock.tick(now, &mut self.control) {
            self.log.success("Hazard cleared, controls enabled");
        }
    }

    fn on_connection(&mut self, state: ConnectionState) {
        let previous = self.telemetry.read().connection;
        self.telemetry.set_connection(state);
        match state {
            ConnectionState::Connected => {
                self.log.success("Connected to controller");
                if std::mem::take(&mut self.link_lost) {
                    // whatever was published during the outage never arrived
                    if let Some(command) = self.control.reassert_directive(&mut self.channel) {
                        info!("Link restored, re-sent {}", command);
                    }
                }
            }
            ConnectionState::Disconnected if previous == ConnectionState::Connected => {
                warn!("Controller link lost");
                self.link_lost = true;
                self.log.warning("Connection to controller lost");
            }
            _ => {}
        }
    }

    fn on_hazard(&mut self, signal: &HazardSignal, now: Instant) {
        let outcome = self
            .interlock
            .on_signal(signal, now, &mut self.control, &mut self.channel);
        if let InterlockOutcome::Engaged(stop) = outcome {
            self.log
                .warning(format!("{} detected - stopping", capitalize(&signal.kind.to_string())));
            if stop.stopped_line_following {
                self.frames.on_mode_change();
                self.log.warning("Line following stopped");
            }
        }
    }

    fn check_battery(&mut self) {
        let level = self.telemetry.battery().level;
        if self.battery_level != Some(level) {
            match level {
                BatteryLevel::Critical => self.log.warning("Low battery warning"),
                BatteryLevel::Low if self.battery_level == Some(BatteryLevel::Good) => {
                    self.log.info("Battery below 60%")
                }
                _ => {}
            }
            self.battery_level = Some(level);
        }
    }

    pub fn request_direction(&mut self, direction: Direction) -> Result<DirectionToken, Rejection> {
        self.tick(Instant::now());
        let before = self.control.active_direction();
        match self.control.request_direction(direction, &mut self.channel) {
            Ok(token) => {
                if before != Some(direction) {
                    info!("Moving {}", direction);
                    self.log.info(movement_message(direction));
                }
                Ok(token)
            }
            Err(rejection) => {
                warn!("Rejected {}: {}", direction, rejection);
                Err(rejection)
            }
        }
    }

    pub fn release_direction(&mut self) -> bool {
        let released = self.control.release_direction(&mut self.channel);
        if released {
            self.log.info("Stopped");
        }
        released
    }

    pub fn release_direction_with(&mut self, token: DirectionToken) -> bool {
        let released = self
            .control
            .release_direction_with(token, &mut self.channel);
        if released {
            self.log.info("Stopped");
        }
        released
    }

    pub fn set_speed(&mut self, value: i32) -> u8 {
        let previous = self.control.speed_percent();
        let speed = self.control.set_speed(value);
        if speed != previous {
            self.log.info(format!("Speed changed to {}%", speed));
        }
        speed
    }

    pub fn sync_speed(&mut self) {
        self.control.sync_speed(&mut self.channel);
    }

    pub fn set_drive_mode(&mut self, mode: DriveMode) -> Result<bool, Rejection> {
        self.tick(Instant::now());
        let changed = self
            .control
            .set_drive_mode(mode, &mut self.channel)
            .inspect_err(|rejection| warn!("Rejected drive mode change: {}", rejection))?;
        if changed {
            info!("Drive mode is now {}", mode);
            self.log.info(match mode {
                DriveMode::Autonomous => "Autonomous mode enabled",
                DriveMode::Manual => "Manual mode enabled",
            });
        }
        Ok(changed)
    }

    pub fn set_perception_mode(&mut self, mode: PerceptionMode) -> Result<bool, Rejection> {
        self.tick(Instant::now());
        let previous = self.control.perception_mode().clone();
        let changed = self
            .control
            .set_perception_mode(mode, &mut self.channel)
            .inspect_err(|rejection| warn!("Rejected perception mode change: {}", rejection))?;
        if changed {
            self.frames.on_mode_change();
            let current = self.control.perception_mode().clone();
            info!("Perception mode {} -> {}", previous, current);
            if let Some(message) = perception_stopped_message(&previous) {
                self.log.info(message);
            }
            if let Some(message) = perception_started_message(&current) {
                self.log.info(message);
            }
        }
        Ok(changed)
    }

    pub fn move_head(&mut self, direction: HeadDirection) {
        self.control.move_head(direction, &mut self.channel);
    }

    pub fn control(&self) -> &ControlStateMachine {
        &self.control
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.read()
    }

    pub fn telemetry_store(&self) -> &TelemetryStore {
        &self.telemetry
    }

    pub fn battery(&self) -> BatteryReading {
        self.telemetry.battery()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.current_frame()
    }

    pub fn interlock(&self) -> &SafetyInterlock {
        &self.interlock
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.log
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Ends the session: releases any held direction, closes the channel and hands it back.
    pub fn close(mut self) -> C {
        self.release_direction();
        self.channel.close();
        self.channel
    }
}

fn movement_message(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "Moving forward",
        Direction::Backward => "Moving backward",
        Direction::Left => "Turning left",
        Direction::Right => "Turning right",
        Direction::Stop => "Stop requested",
    }
}

fn perception_started_message(mode: &PerceptionMode) -> Option<String> {
    match mode {
        PerceptionMode::Idle => None,
        PerceptionMode::Recording => Some("Recording started".to_string()),
        PerceptionMode::LineFollowing => Some("Line tracking active".to_string()),
        PerceptionMode::ColorDetecting(color) => Some(format!("Detecting {} objects", color)),
    }
}

fn perception_stopped_message(mode: &PerceptionMode) -> Option<String> {
    match mode {
        PerceptionMode::Idle => None,
        PerceptionMode::Recording => Some("Recording stopped".to_string()),
        PerceptionMode::LineFollowing => Some("Line tracking stopped".to_string()),
        PerceptionMode::ColorDetecting(color) => Some(format!("Stopped detecting {}", color)),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
