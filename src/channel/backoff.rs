use std::time::Duration;

pub(crate) const RECONNECT_INITIAL_WAIT_MS: u64 = 200;
pub(crate) const RECONNECT_MAX_WAIT_MS: u64 = 10_000;

/// Capped exponential backoff for reconnection attempts. Attempts are never limited, only
/// the delay between them is.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(
            Duration::from_millis(RECONNECT_INITIAL_WAIT_MS),
            Duration::from_millis(RECONNECT_MAX_WAIT_MS),
        )
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
