use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::achievements::AchievementId;
use crate::timer::{Phase, TimerStatus};

/// Every state change in the engine produces an Event.
/// The host polls for events and fans them out to display and notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// The countdown reached zero. Raised exactly once per phase run.
    TimerCompleted {
        phase: Phase,
        at: DateTime<Utc>,
    },
    PhaseSwitched {
        from: Phase,
        to: Phase,
        duration_secs: u64,
        /// True when the switch came from a manual skip.
        skipped: bool,
        at: DateTime<Utc>,
    },
    TimerReset {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionOpened {
        /// `None` when the store was unreachable and the session is held in memory.
        session_id: Option<String>,
        subject_id: Option<String>,
        at: DateTime<Utc>,
    },
    SessionClosed {
        session_id: String,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// A store call failed. Non-fatal; progress is kept in memory.
    PersistenceWarning {
        message: String,
        at: DateTime<Utc>,
    },
    AchievementUnlocked {
        achievement: AchievementId,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        status: TimerStatus,
        phase: Phase,
        remaining_secs: u64,
        total_secs: u64,
        progress: f64,
        accumulated_focus_secs: u64,
        completed_focus: u32,
        open_session_id: Option<String>,
        open_session_elapsed_secs: Option<u64>,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::TimerStarted { at, .. }
            | Event::TimerPaused { at, .. }
            | Event::TimerCompleted { at, .. }
            | Event::PhaseSwitched { at, .. }
            | Event::TimerReset { at, .. }
            | Event::SessionOpened { at, .. }
            | Event::SessionClosed { at, .. }
            | Event::PersistenceWarning { at, .. }
            | Event::AchievementUnlocked { at, .. }
            | Event::StateSnapshot { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let at = Utc::now();
        let event = Event::TimerCompleted {
            phase: Phase::ShortBreak,
            at,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "timer_completed");
        assert_eq!(json["phase"], "short_break");
        assert_eq!(event.at(), at);
    }
}
