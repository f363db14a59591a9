use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::{
    channel::{CommandSink, HazardKind, HazardSignal},
    control::{ControlStateMachine, HazardOverride},
};

pub const HAZARD_COOLDOWN_MS: u64 = 5_000;

/// Result of feeding a hazard signal to the interlock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterlockOutcome {
    /// The hazard latched and the override stop was performed
    Engaged(HazardOverride),
    /// A hazard was already latched, the cooldown restarted
    Extended,
    /// The signal did not report a hazard
    Ignored,
}

/// Forces an override stop on hazard signals, independent of what the operator is doing.
///
/// Time is always passed in by the caller, the interlock never reads the clock itself.
#[derive(Debug)]
pub struct SafetyInterlock {
    cooldown: Duration,
    last_signal: Option<Instant>,
    kind: Option<HazardKind>,
    last_cleared: Option<Instant>,
}

impl Default for SafetyInterlock {
    fn default() -> Self {
        SafetyInterlock::new(Duration::from_millis(HAZARD_COOLDOWN_MS))
    }
}

impl SafetyInterlock {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_signal: None,
            kind: None,
            last_cleared: None,
        }
    }

    pub fn is_latched(&self) -> bool {
        self.kind.is_some()
    }

    pub fn latched_kind(&self) -> Option<HazardKind> {
        self.kind
    }

    pub fn last_cleared(&self) -> Option<Instant> {
        self.last_cleared
    }

    /// When the latched hazard will clear if no further signal arrives.
    pub fn clears_at(&self) -> Option<Instant> {
        match (self.kind, self.last_signal) {
            (Some(_), Some(last)) => Some(last + self.cooldown),
            _ => None,
        }
    }

    pub fn on_signal(
        &mut self,
        signal: &HazardSignal,
        now: Instant,
        control: &mut ControlStateMachine,
        sink: &mut impl CommandSink,
    ) -> InterlockOutcome {
        if !signal.detected {
            debug!("{} signal without detection, ignored", signal.kind);
            return InterlockOutcome::Ignored;
        }

        self.last_signal = Some(now);
        if self.kind.is_some() {
            debug!("{} detected again, cooldown restarted", signal.kind);
            self.kind = Some(signal.kind);
            return InterlockOutcome::Extended;
        }

        warn!("{} detected, forcing stop", signal.kind);
        self.kind = Some(signal.kind);
        InterlockOutcome::Engaged(control.engage_hazard(sink))
    }

    /// Clears the hazard once the cooldown has elapsed since the last signal. Returns
    /// whether the hazard cleared on this call.
    pub fn tick(&mut self, now: Instant, control: &mut ControlStateMachine) -> bool {
        let Some(clears_at) = self.clears_at() else {
            return false;
        };
        if now < clears_at {
            return false;
        }

        info!("Hazard cleared after cooldown");
        self.kind = None;
        self.last_cleared = Some(now);
        control.clear_hazard();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Command, Direction};

    #[test]
    fn test_hazard_stops_and_clears_without_resuming() {
        let start = Instant::now();
        let mut interlock = SafetyInterlock::new(Duration::from_secs(5));
        let mut control = ControlStateMachine::default();
        let mut sent = Vec::new();
        control.request_direction(Direction::Forward, &mut sent).unwrap();
        sent.clear();

        let outcome = interlock.on_signal(
            &HazardSignal::detected(HazardKind::Cliff),
            start,
            &mut control,
            &mut sent,
        );
        assert!(matches!(outcome, InterlockOutcome::Engaged(o) if o.released_direction == Some(Direction::Forward)));
        assert_eq!(sent, vec![Command::Stop]);
        assert_eq!(control.active_direction(), None);

        assert!(!interlock.tick(start + Duration::from_secs(4), &mut control));
        assert!(control.hazard_active());

        assert!(interlock.tick(start + Duration::from_secs(5), &mut control));
        assert!(!control.hazard_active());
        assert_eq!(control.active_direction(), None);
        assert_eq!(interlock.last_cleared(), Some(start + Duration::from_secs(5)));
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn test_new_signal_restarts_cooldown() {
        let start = Instant::now();
        let mut interlock = SafetyInterlock::new(Duration::from_secs(5));
        let mut control = ControlStateMachine::default();
        let mut sent = Vec::new();
        let cliff = HazardSignal::detected(HazardKind::Cliff);

        interlock.on_signal(&cliff, start, &mut control, &mut sent);
        let outcome = interlock.on_signal(
            &HazardSignal::detected(HazardKind::Obstacle),
            start + Duration::from_secs(3),
            &mut control,
            &mut sent,
        );
        assert_eq!(outcome, InterlockOutcome::Extended);
        assert_eq!(interlock.latched_kind(), Some(HazardKind::Obstacle));

        assert!(!interlock.tick(start + Duration::from_secs(6), &mut control));
        assert!(interlock.tick(start + Duration::from_secs(8), &mut control));
        assert!(!interlock.is_latched());
    }

    #[test]
    fn test_undetected_signal_does_not_clear_early() {
        let start = Instant::now();
        let mut interlock = SafetyInterlock::default();
        let mut control = ControlStateMachine::default();
        let mut sent = Vec::new();

        interlock.on_signal(
            &HazardSignal::detected(HazardKind::Cliff),
            start,
            &mut control,
            &mut sent,
        );
        let all_clear = HazardSignal {
            kind: HazardKind::Cliff,
            detected: false,
        };
        assert_eq!(
            interlock.on_signal(&all_clear, start + Duration::from_secs(1), &mut control, &mut sent),
            InterlockOutcome::Ignored
        );
        assert!(interlock.is_latched());
        assert_eq!(
            interlock.clears_at(),
            Some(start + Duration::from_millis(HAZARD_COOLDOWN_MS))
        );
    }

    #[test]
    fn test_hazard_in_autonomous_mode_latches_without_stop() {
        let mut interlock = SafetyInterlock::default();
        let mut control = ControlStateMachine::default();
        let mut sent = Vec::new();
        control
            .set_drive_mode(crate::control::DriveMode::Autonomous, &mut sent)
            .unwrap();
        sent.clear();

        interlock.on_signal(
            &HazardSignal::detected(HazardKind::Obstacle),
            Instant::now(),
            &mut control,
            &mut sent,
        );
        assert!(control.hazard_active());
        assert!(sent.is_empty());
    }
}
