//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads - the caller is responsible for calling `tick()` periodically.
//!
//! ## State Transitions
//!
//! ```text
//! Idle(phase) -> Running(phase) -> Idle(phase)          (pause / completion)
//! Idle(phase) -> Idle(next phase)                       (switch_phase)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(SystemClock, &TimerPreferences::default());
//! engine.start();
//! // In a loop:
//! let outcome = engine.tick(); // outcome.completed is Some(..) once, at zero
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::phase::{Phase, TimerPreferences};
use crate::clock::{Clock, SystemClock};
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
}

/// The in-memory countdown. Serializable so hosts can persist it between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: Phase,
    pub remaining_seconds: u64,
    pub running: bool,
    /// Wall-clock instant up to which elapsed time has been applied.
    /// Always set while running.
    #[serde(default)]
    pub last_tick: Option<DateTime<Utc>>,
    /// Focus seconds consumed over the lifetime of this engine.
    #[serde(default)]
    pub accumulated_focus_seconds: u64,
    /// Length the current phase was set to, for progress display.
    #[serde(default)]
    pub phase_duration_seconds: u64,
}

impl TimerState {
    pub fn idle(phase: Phase, duration: u64) -> Self {
        Self {
            phase,
            remaining_seconds: duration,
            running: false,
            last_tick: None,
            accumulated_focus_seconds: 0,
            phase_duration_seconds: duration,
        }
    }

    pub fn status(&self) -> TimerStatus {
        if self.running {
            TimerStatus::Running
        } else {
            TimerStatus::Idle
        }
    }
}

/// Raised once when a phase's countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub phase: Phase,
    pub at: DateTime<Utc>,
}

/// Result of a single `tick()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Phase the consumed seconds belong to.
    pub phase: Phase,
    pub consumed_seconds: u64,
    pub completed: Option<Completion>,
}

impl TickOutcome {
    fn nothing(phase: Phase) -> Self {
        Self {
            phase,
            consumed_seconds: 0,
            completed: None,
        }
    }

    /// Seconds to forward to the session recorder.
    pub fn focus_seconds(&self) -> u64 {
        if self.phase.is_focus() {
            self.consumed_seconds
        } else {
            0
        }
    }
}

/// Core timer engine.
///
/// Operates on wall-clock deltas -- no internal thread.
/// Every operation is total: calls that make no sense in the current state
/// are no-ops and return `None`.
#[derive(Debug, Clone)]
pub struct TimerEngine<C = SystemClock> {
    clock: C,
    state: TimerState,
}

impl<C: Clock> TimerEngine<C> {
    /// Create a new timer engine in Idle-Focus with the configured focus duration.
    pub fn new(clock: C, prefs: &TimerPreferences) -> Self {
        Self {
            clock,
            state: TimerState::idle(Phase::Focus, prefs.focus_duration),
        }
    }

    /// Restore a previously persisted state.
    ///
    /// A running state without a tick stamp is re-stamped at the current time.
    pub fn from_state(clock: C, mut state: TimerState) -> Self {
        if state.running && state.last_tick.is_none() {
            state.last_tick = Some(clock.now());
        }
        if state.remaining_seconds == 0 {
            state.running = false;
            state.last_tick = None;
        }
        Self { clock, state }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn status(&self) -> TimerStatus {
        self.state.status()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.state.remaining_seconds
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 0.0 .. 1.0 progress within the current phase.
    pub fn progress(&self) -> f64 {
        let total = self.state.phase_duration_seconds;
        if total == 0 {
            return 0.0;
        }
        (1.0 - (self.state.remaining_seconds as f64 / total as f64)).clamp(0.0, 1.0)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        if self.state.running {
            return None;
        }
        if self.state.remaining_seconds == 0 {
            debug!(phase = %self.state.phase, "start ignored, countdown already at zero");
            return None;
        }
        let now = self.clock.now();
        self.state.running = true;
        self.state.last_tick = Some(now);
        Some(Event::TimerStarted {
            phase: self.state.phase,
            remaining_secs: self.state.remaining_seconds,
            at: now,
        })
    }

    /// Stops the countdown. Whole seconds not yet applied by a tick are dropped,
    /// so callers that want them counted tick first.
    pub fn pause(&mut self) -> Option<Event> {
        if !self.state.running {
            return None;
        }
        self.state.running = false;
        self.state.last_tick = None;
        Some(Event::TimerPaused {
            phase: self.state.phase,
            remaining_secs: self.state.remaining_seconds,
            at: self.clock.now(),
        })
    }

    /// Call periodically. Applies whole elapsed seconds since the last applied tick.
    pub fn tick(&mut self) -> TickOutcome {
        let phase = self.state.phase;
        if !self.state.running || self.state.remaining_seconds == 0 {
            return TickOutcome::nothing(phase);
        }
        let Some(last) = self.state.last_tick else {
            return TickOutcome::nothing(phase);
        };

        let now = self.clock.now();
        let delta = (now - last).num_seconds();
        if delta < 1 {
            return TickOutcome::nothing(phase);
        }

        let consumed = (delta as u64).min(self.state.remaining_seconds);
        self.state.remaining_seconds -= consumed;
        // Advance by whole seconds only; the sub-second remainder carries over.
        self.state.last_tick = Some(last + Duration::seconds(delta));
        if phase.is_focus() {
            self.state.accumulated_focus_seconds += consumed;
        }

        let mut outcome = TickOutcome {
            phase,
            consumed_seconds: consumed,
            completed: None,
        };

        if self.state.remaining_seconds == 0 {
            self.state.running = false;
            self.state.last_tick = None;
            outcome.completed = Some(Completion { phase, at: now });
            debug!(%phase, "phase completed");
        }
        outcome
    }

    /// Only valid while not running. Never touches sessions.
    pub fn reset_timer(&mut self, duration: u64) -> Option<Event> {
        if self.state.running {
            return None;
        }
        self.state.remaining_seconds = duration;
        self.state.phase_duration_seconds = duration;
        Some(Event::TimerReset {
            remaining_secs: duration,
            at: self.clock.now(),
        })
    }

    /// Stops the countdown and loads `new_phase` with `duration`.
    pub fn switch_phase(&mut self, new_phase: Phase, duration: u64) -> Event {
        let from = self.state.phase;
        self.state.running = false;
        self.state.last_tick = None;
        self.state.phase = new_phase;
        self.state.remaining_seconds = duration;
        self.state.phase_duration_seconds = duration;
        Event::PhaseSwitched {
            from,
            to: new_phase,
            duration_secs: duration,
            skipped: false,
            at: self.clock.now(),
        }
    }
}
