//! Bounded exponential-backoff recovery for tab readers.
//!
//! A reader that stops while its process is still alive is restarted after
//! a backoff that doubles per attempt. Attempts are counted in a rolling
//! window; once the cap is reached inside one window the tab is given up on
//! and detached, leaving any external session alive for manual recovery.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub window: Duration,
    pub max_attempts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            window: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

/// What to do about a reader that stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Schedule a restart tick carrying `epoch` after `after`.
    Restart { after: Duration, attempt: u32, epoch: u64 },
    /// The budget for this window is spent; detach the tab.
    GiveUp,
    /// The process itself is gone, so restarting the reader cannot help.
    ProcessClosed,
}

/// Per-tab restart bookkeeping.
///
/// `recent` holds the times of granted restarts that are still inside the
/// window, oldest first.
#[derive(Clone, Debug, Default)]
pub struct RestartState {
    backoff: Duration,
    recent: VecDeque<Instant>,
    epoch: u64,
}

impl RestartState {
    /// Restarts granted within the window ending at the last decision.
    pub fn attempts(&self) -> u32 {
        self.recent.len() as u32
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a restart tick tagged with `epoch` is still the one we want.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Decide how to react to the reader stopping at `now`.
    pub fn on_stopped(
        &mut self,
        policy: &RestartPolicy,
        now: Instant,
        process_closed: bool,
    ) -> Decision {
        // Any tick still in flight belongs to the previous failure.
        self.epoch = self.epoch.wrapping_add(1);

        if process_closed {
            return Decision::ProcessClosed;
        }

        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) < policy.window {
                break;
            }
            self.recent.pop_front();
        }
        // A full window without restarts starts the backoff over.
        if self.recent.is_empty() {
            self.backoff = policy.initial_backoff;
        }

        if self.attempts() >= policy.max_attempts {
            return Decision::GiveUp;
        }

        self.recent.push_back(now);
        let after = self.backoff;
        self.backoff = (self.backoff * 2).min(policy.max_backoff);
        Decision::Restart {
            after,
            attempt: self.attempts(),
            epoch: self.epoch,
        }
    }

    /// Forget all history, e.g. after a manual restart or reattach.
    ///
    /// Also invalidates any pending restart tick.
    pub fn reset(&mut self) {
        self.backoff = Duration::ZERO;
        self.recent.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restart_delay(decision: Decision) -> Duration {
        match decision {
            Decision::Restart { after, .. } => after,
            other => panic!("expected a restart, got {other:?}"),
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let policy = RestartPolicy {
            max_attempts: 10,
            ..RestartPolicy::default()
        };
        let mut state = RestartState::default();
        let now = Instant::now();

        let delays: Vec<u64> = (0..7)
            .map(|_| restart_delay(state.on_stopped(&policy, now, false)).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3200, 5000, 5000]);
    }

    #[test]
    fn test_gives_up_after_cap_within_window() {
        let policy = RestartPolicy::default();
        let mut state = RestartState::default();
        let start = Instant::now();

        for i in 0..5 {
            let now = start + Duration::from_secs(i * 5);
            assert!(matches!(
                state.on_stopped(&policy, now, false),
                Decision::Restart { .. }
            ));
        }
        assert_eq!(
            state.on_stopped(&policy, start + Duration::from_secs(30), false),
            Decision::GiveUp
        );
        // Still inside the window: stays given up.
        assert_eq!(
            state.on_stopped(&policy, start + Duration::from_secs(40), false),
            Decision::GiveUp
        );
    }

    #[test]
    fn test_window_resets_after_it_elapses() {
        let policy = RestartPolicy::default();
        let mut state = RestartState::default();
        let start = Instant::now();

        for _ in 0..5 {
            state.on_stopped(&policy, start, false);
        }
        let later = start + policy.window;
        let decision = state.on_stopped(&policy, later, false);
        assert_eq!(restart_delay(decision), policy.initial_backoff);
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn test_cap_holds_across_window_boundary() {
        let policy = RestartPolicy::default();
        let mut state = RestartState::default();
        let start = Instant::now();
        let stops = [0u64, 55, 56, 57, 58, 60, 61, 62, 63, 64];

        let granted: Vec<u64> = stops
            .iter()
            .copied()
            .filter(|&secs| {
                let now = start + Duration::from_secs(secs);
                matches!(
                    state.on_stopped(&policy, now, false),
                    Decision::Restart { .. }
                )
            })
            .collect();
        assert_eq!(granted, vec![0, 55, 56, 57, 58, 60]);

        // No span of one window may contain more than the cap.
        for &from in &granted {
            let inside = granted
                .iter()
                .filter(|&&t| t >= from && t < from + policy.window.as_secs())
                .count();
            assert!(inside <= policy.max_attempts as usize, "{inside} restarts from {from}s");
        }
    }

    #[test]
    fn test_slots_free_up_as_attempts_age_out() {
        let policy = RestartPolicy::default();
        let mut state = RestartState::default();
        let start = Instant::now();

        for i in 0..5 {
            state.on_stopped(&policy, start + Duration::from_secs(i * 10), false);
        }
        assert_eq!(
            state.on_stopped(&policy, start + Duration::from_secs(59), false),
            Decision::GiveUp
        );
        // The first attempt left the window; one slot opens and backoff keeps growing.
        let decision = state.on_stopped(&policy, start + Duration::from_secs(60), false);
        assert_eq!(restart_delay(decision), policy.max_backoff);
        assert_eq!(state.attempts(), 5);
    }

    #[test]
    fn test_closed_process_is_never_restarted() {
        let mut state = RestartState::default();
        let decision = state.on_stopped(&RestartPolicy::default(), Instant::now(), true);
        assert_eq!(decision, Decision::ProcessClosed);
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn test_each_decision_invalidates_older_ticks() {
        let policy = RestartPolicy::default();
        let mut state = RestartState::default();
        let now = Instant::now();

        let first = match state.on_stopped(&policy, now, false) {
            Decision::Restart { epoch, .. } => epoch,
            other => panic!("unexpected {other:?}"),
        };
        assert!(state.is_current(first));

        state.on_stopped(&policy, now, false);
        assert!(!state.is_current(first));

        let before_reset = state.epoch();
        state.reset();
        assert!(!state.is_current(before_reset));
        assert_eq!(state.attempts(), 0);
    }
}
