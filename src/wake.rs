//! Wake/sleep state for the assistant
//!
//! The assistant starts asleep and ignores everything until the wake
//! phrase appears in a transcript. While awake, every interaction refreshes
//! the activity timestamp; the orchestration loop checks for timeout once
//! per iteration before processing the next utterance.

use std::time::{Duration, Instant};

/// Awake flag plus last-interaction timestamp
#[derive(Debug)]
pub struct WakeState {
    awake: bool,
    last_interaction: Instant,
    timeout: Duration,
}

impl WakeState {
    /// Create in the asleep state with the given inactivity timeout
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            awake: false,
            last_interaction: Instant::now(),
            timeout,
        }
    }

    /// Whether the assistant is currently awake
    #[must_use]
    pub const fn is_awake(&self) -> bool {
        self.awake
    }

    /// Transition to awake and refresh the activity timestamp
    pub fn wake_up(&mut self) {
        self.awake = true;
        self.last_interaction = Instant::now();
        tracing::info!("awake");
    }

    /// Refresh the activity timestamp
    pub fn touch(&mut self) {
        self.last_interaction = Instant::now();
    }

    /// Transition to asleep immediately
    pub fn sleep_now(&mut self) {
        if self.awake {
            tracing::info!("going to sleep");
        }
        self.awake = false;
    }

    /// Check the inactivity timeout, sleeping if it elapsed; returns `true`
    /// if this call put the assistant to sleep
    pub fn check_timeout(&mut self) -> bool {
        if self.awake && self.last_interaction.elapsed() >= self.timeout {
            tracing::info!("inactivity timeout, going to sleep");
            self.awake = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_asleep() {
        let state = WakeState::new(Duration::from_secs(120));
        assert!(!state.is_awake());
    }

    #[test]
    fn wake_then_sleep() {
        let mut state = WakeState::new(Duration::from_secs(120));
        state.wake_up();
        assert!(state.is_awake());
        state.sleep_now();
        assert!(!state.is_awake());
    }

    #[test]
    fn timeout_puts_to_sleep() {
        let mut state = WakeState::new(Duration::from_millis(0));
        state.wake_up();
        assert!(state.check_timeout());
        assert!(!state.is_awake());
    }

    #[test]
    fn touch_defers_timeout() {
        let mut state = WakeState::new(Duration::from_secs(60));
        state.wake_up();
        state.touch();
        assert!(!state.check_timeout());
        assert!(state.is_awake());
    }

    #[test]
    fn timeout_ignored_while_asleep() {
        let mut state = WakeState::new(Duration::from_millis(0));
        assert!(!state.check_timeout());
    }
}
