//! Achievement unlocks derived from session statistics.
//!
//! The rule set is closed. Each achievement is monotonic: once unlocked it
//! stays unlocked, and its unlock is queued for display exactly once.

mod evaluator;
mod refresh;

pub use evaluator::{AchievementEvaluator, AchievementInput, Unlock};
pub use refresh::refresh_unlocks;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementId {
    /// First closed session ever.
    FirstSession,
    /// Streak of at least `streak_days` days.
    Streak,
    /// At least `focus_hours` of cumulative focus.
    FocusHours,
    /// At least `sessions` closed sessions.
    SessionCount,
    /// A session that ended inside the night window.
    NightOwl,
}

impl AchievementId {
    pub const ALL: [AchievementId; 5] = [
        AchievementId::FirstSession,
        AchievementId::Streak,
        AchievementId::FocusHours,
        AchievementId::SessionCount,
        AchievementId::NightOwl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementId::FirstSession => "first_session",
            AchievementId::Streak => "streak",
            AchievementId::FocusHours => "focus_hours",
            AchievementId::SessionCount => "session_count",
            AchievementId::NightOwl => "night_owl",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AchievementId::FirstSession => "First Steps",
            AchievementId::Streak => "On a Roll",
            AchievementId::FocusHours => "Deep Diver",
            AchievementId::SessionCount => "Dedicated",
            AchievementId::NightOwl => "Night Owl",
        }
    }

    pub fn description(&self, thresholds: &AchievementThresholds) -> String {
        match self {
            AchievementId::FirstSession => "Complete your first focus session".to_string(),
            AchievementId::Streak => {
                format!("Study {} days in a row", thresholds.streak_days)
            }
            AchievementId::FocusHours => {
                format!("Accumulate {} hours of focus", thresholds.focus_hours)
            }
            AchievementId::SessionCount => {
                format!("Complete {} focus sessions", thresholds.sessions)
            }
            AchievementId::NightOwl => format!(
                "Finish a session between {:02}:00 and {:02}:59",
                thresholds.night_start_hour,
                (thresholds.night_end_hour + 23) % 24
            ),
        }
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AchievementId::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| format!("unknown achievement '{s}'"))
    }
}

/// Rule thresholds, read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementThresholds {
    #[serde(default = "default_streak_days")]
    pub streak_days: u32,
    #[serde(default = "default_focus_hours")]
    pub focus_hours: f64,
    #[serde(default = "default_sessions")]
    pub sessions: u64,
    /// First local hour of the night window (inclusive).
    #[serde(default = "default_night_start")]
    pub night_start_hour: u32,
    /// Local hour the night window ends at (exclusive).
    #[serde(default = "default_night_end")]
    pub night_end_hour: u32,
}

fn default_streak_days() -> u32 {
    3
}
fn default_focus_hours() -> f64 {
    10.0
}
fn default_sessions() -> u64 {
    50
}
fn default_night_start() -> u32 {
    22
}
fn default_night_end() -> u32 {
    4
}

impl Default for AchievementThresholds {
    fn default() -> Self {
        Self {
            streak_days: default_streak_days(),
            focus_hours: default_focus_hours(),
            sessions: default_sessions(),
            night_start_hour: default_night_start(),
            night_end_hour: default_night_end(),
        }
    }
}

impl AchievementThresholds {
    /// Whether a local hour falls in the night window. Handles windows that
    /// wrap past midnight.
    pub fn is_night_hour(&self, hour: u32) -> bool {
        let (start, end) = (self.night_start_hour, self.night_end_hour);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

/// A persisted unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    pub id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
}

/// Persistence for unlocked achievement ids.
pub trait AchievementStore: Clone + Send + Sync + 'static {
    fn unlocked_achievements(
        &self,
    ) -> impl Future<Output = Result<Vec<UnlockRecord>, PersistenceError>> + Send;

    /// Recording an already-unlocked id keeps the original timestamp.
    fn record_unlock(
        &self,
        id: AchievementId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn night_window_wraps_midnight() {
        let t = AchievementThresholds::default();
        assert!(t.is_night_hour(22));
        assert!(t.is_night_hour(23));
        assert!(t.is_night_hour(0));
        assert!(t.is_night_hour(3));
        assert!(!t.is_night_hour(4));
        assert!(!t.is_night_hour(21));
        assert!(!t.is_night_hour(12));
    }

    #[test]
    fn non_wrapping_window() {
        let t = AchievementThresholds {
            night_start_hour: 1,
            night_end_hour: 5,
            ..AchievementThresholds::default()
        };
        assert!(t.is_night_hour(1));
        assert!(!t.is_night_hour(5));
        assert!(!t.is_night_hour(23));
    }

    #[test]
    fn ids_parse_from_their_tags() {
        for id in AchievementId::ALL {
            assert_eq!(id.as_str().parse::<AchievementId>().unwrap(), id);
        }
        assert!("speedrun".parse::<AchievementId>().is_err());
    }

    #[test]
    fn night_owl_description_uses_last_window_hour() {
        let t = AchievementThresholds::default();
        assert_eq!(
            AchievementId::NightOwl.description(&t),
            "Finish a session between 22:00 and 03:59"
        );
    }
}
