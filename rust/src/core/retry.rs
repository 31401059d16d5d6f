// Automatic re-send with exponential backoff, per temporary id.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::transport::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryPhase {
    Attempting,
    WaitingBackoff,
    Exhausted,
    /// The backend refused the payload; only a manual retry re-enters `Attempting`.
    Rejected,
}

#[derive(Debug)]
pub(crate) struct RetryState {
    pub(crate) room_id: String,
    pub(crate) attempt_count: u32,
    pub(crate) phase: RetryPhase,
    pub(crate) next_delay: Option<Duration>,
    pub(crate) last_error: Option<ErrorClass>,
    timer: Option<BackoffTimer>,
}

#[derive(Debug)]
struct BackoffTimer {
    token: u64,
    handle: Option<AbortHandle>,
}

impl BackoffTimer {
    fn cancel(self) {
        if let Some(h) = self.handle {
            h.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Wait `delay`, then attempt again with the same temporary id.
    Backoff { delay: Duration, token: u64 },
    /// Automatic retries used up; the message becomes FAILED.
    Exhausted { attempts: u32 },
    /// Not a transient failure; surface it right away.
    Surface,
}

/// `base * 2^attempt_count`; the wait before retry N is `base * 2^(N-1)`.
pub(crate) fn backoff_delay(base: Duration, attempt_count: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt_count).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

pub(crate) struct RetryController {
    max_attempts: u32,
    base: Duration,
    states: HashMap<String, RetryState>,
    next_token: u64,
}

impl RetryController {
    pub(crate) fn new(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            base,
            states: HashMap::new(),
            next_token: 0,
        }
    }

    pub(crate) fn get(&self, temporary_id: &str) -> Option<&RetryState> {
        self.states.get(temporary_id)
    }

    pub(crate) fn attempt_count(&self, temporary_id: &str) -> u32 {
        self.states
            .get(temporary_id)
            .map(|s| s.attempt_count)
            .unwrap_or(0)
    }

    /// IDLE -> ATTEMPTING for a newly allocated message.
    pub(crate) fn begin(&mut self, temporary_id: &str, room_id: &str) {
        if let Some(old) = self.states.remove(temporary_id) {
            if let Some(t) = old.timer {
                t.cancel();
            }
        }
        self.states.insert(
            temporary_id.to_string(),
            RetryState {
                room_id: room_id.to_string(),
                attempt_count: 0,
                phase: RetryPhase::Attempting,
                next_delay: None,
                last_error: None,
                timer: None,
            },
        );
    }

    /// User-triggered retry: back to zero attempts, same id.
    pub(crate) fn reset_for_manual_retry(&mut self, temporary_id: &str) -> bool {
        let Some(state) = self.states.get_mut(temporary_id) else {
            return false;
        };
        if let Some(t) = state.timer.take() {
            t.cancel();
        }
        state.attempt_count = 0;
        state.phase = RetryPhase::Attempting;
        state.next_delay = None;
        true
    }

    pub(crate) fn on_failure(&mut self, temporary_id: &str, class: ErrorClass) -> RetryDecision {
        self.next_token += 1;
        let token = self.next_token;
        let max_attempts = self.max_attempts;
        let base = self.base;

        let Some(state) = self.states.get_mut(temporary_id) else {
            return RetryDecision::Surface;
        };
        state.last_error = Some(class);
        if class != ErrorClass::Network {
            state.phase = RetryPhase::Rejected;
            state.next_delay = None;
            return RetryDecision::Surface;
        }
        if state.attempt_count >= max_attempts {
            state.phase = RetryPhase::Exhausted;
            state.next_delay = None;
            return RetryDecision::Exhausted {
                attempts: state.attempt_count,
            };
        }

        let delay = backoff_delay(base, state.attempt_count);
        if let Some(old) = state.timer.take() {
            old.cancel();
        }
        state.phase = RetryPhase::WaitingBackoff;
        state.next_delay = Some(delay);
        state.timer = Some(BackoffTimer {
            token,
            handle: None,
        });
        RetryDecision::Backoff { delay, token }
    }

    /// Attach the spawned sleep so cancellation can abort it.
    pub(crate) fn arm_timer(&mut self, temporary_id: &str, token: u64, handle: AbortHandle) {
        match self.states.get_mut(temporary_id) {
            Some(RetryState {
                timer: Some(timer), ..
            }) if timer.token == token => timer.handle = Some(handle),
            _ => handle.abort(),
        }
    }

    /// WAITING_BACKOFF -> ATTEMPTING. `false` for stale or cancelled timers.
    pub(crate) fn timer_fired(&mut self, temporary_id: &str, token: u64) -> bool {
        let Some(state) = self.states.get_mut(temporary_id) else {
            return false;
        };
        let current = state.timer.as_ref().map(|t| t.token);
        if state.phase != RetryPhase::WaitingBackoff || current != Some(token) {
            return false;
        }
        state.timer = None;
        state.phase = RetryPhase::Attempting;
        state.next_delay = None;
        state.attempt_count += 1;
        true
    }

    /// Stop waiting without discarding the state (screen unmounted).
    /// Returns `true` when a timer was actually pending.
    pub(crate) fn interrupt(&mut self, temporary_id: &str) -> bool {
        let Some(state) = self.states.get_mut(temporary_id) else {
            return false;
        };
        if state.phase != RetryPhase::WaitingBackoff {
            return false;
        }
        if let Some(t) = state.timer.take() {
            t.cancel();
        }
        state.phase = RetryPhase::Exhausted;
        state.next_delay = None;
        true
    }

    /// A failure that arrived after the room was closed: record it but do not
    /// schedule another attempt.
    pub(crate) fn pause(&mut self, temporary_id: &str, class: ErrorClass) -> bool {
        let Some(state) = self.states.get_mut(temporary_id) else {
            return false;
        };
        if let Some(t) = state.timer.take() {
            t.cancel();
        }
        state.last_error = Some(class);
        state.phase = RetryPhase::Exhausted;
        state.next_delay = None;
        true
    }

    pub(crate) fn waiting_in_room(&self, room_id: &str) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.room_id == room_id && s.phase == RetryPhase::WaitingBackoff)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// SUCCEEDED or cancelled: drop the state and any pending timer.
    pub(crate) fn discard(&mut self, temporary_id: &str) {
        if let Some(state) = self.states.remove(temporary_id) {
            if let Some(t) = state.timer {
                t.cancel();
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        for (_, state) in self.states.drain() {
            if let Some(t) = state.timer {
                t.cancel();
            }
        }
    }
}
