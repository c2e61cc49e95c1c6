use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    /// Tag stored in the `phase_kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Focus => "focus",
            Phase::ShortBreak => "short_break",
            Phase::LongBreak => "long_break",
        }
    }

    /// Only focus phases record sessions.
    pub fn is_focus(&self) -> bool {
        matches!(self, Phase::Focus)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "focus" => Ok(Phase::Focus),
            "short_break" | "short" => Ok(Phase::ShortBreak),
            "long_break" | "long" => Ok(Phase::LongBreak),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// Durations and cadence read from the preference store.
///
/// All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPreferences {
    #[serde(default = "default_focus_duration")]
    pub focus_duration: u64,
    #[serde(default = "default_short_break")]
    pub short_break_duration: u64,
    #[serde(default = "default_long_break")]
    pub long_break_duration: u64,
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
}

fn default_focus_duration() -> u64 {
    25 * 60
}
fn default_short_break() -> u64 {
    5 * 60
}
fn default_long_break() -> u64 {
    15 * 60
}
fn default_long_break_interval() -> u32 {
    4
}

impl Default for TimerPreferences {
    fn default() -> Self {
        Self {
            focus_duration: default_focus_duration(),
            short_break_duration: default_short_break(),
            long_break_duration: default_long_break(),
            long_break_interval: default_long_break_interval(),
        }
    }
}

impl TimerPreferences {
    pub fn duration_for(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Focus => self.focus_duration,
            Phase::ShortBreak => self.short_break_duration,
            Phase::LongBreak => self.long_break_duration,
        }
    }

    pub fn policy(&self) -> PhasePolicy {
        PhasePolicy::new(self.long_break_interval)
    }
}

/// Decides which phase follows a completed (or skipped) one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePolicy {
    long_break_interval: u32,
}

impl PhasePolicy {
    /// An interval of zero is treated as one (every break is long).
    pub fn new(long_break_interval: u32) -> Self {
        Self {
            long_break_interval: long_break_interval.max(1),
        }
    }

    pub fn long_break_interval(&self) -> u32 {
        self.long_break_interval
    }

    /// `completed_focus` is the cumulative count of focus phases completed,
    /// including the one that just ended.
    pub fn next_phase(&self, ended: Phase, completed_focus: u32) -> Phase {
        match ended {
            Phase::Focus => {
                if completed_focus > 0 && completed_focus % self.long_break_interval == 0 {
                    Phase::LongBreak
                } else {
                    Phase::ShortBreak
                }
            }
            Phase::ShortBreak | Phase::LongBreak => Phase::Focus,
        }
    }
}

impl Default for PhasePolicy {
    fn default() -> Self {
        Self::new(default_long_break_interval())
    }
}
