use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AchievementId, AchievementThresholds};
use crate::events::Event;
use crate::stats::StatsSummary;

/// The statistics the rules look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementInput {
    pub total_sessions: u64,
    pub total_hours: f64,
    pub streak: u32,
    pub last_session_end: Option<DateTime<Utc>>,
    /// Some closed session in the history ended inside the night window.
    #[serde(default)]
    pub night_session: bool,
}

impl From<&StatsSummary> for AchievementInput {
    fn from(summary: &StatsSummary) -> Self {
        Self {
            total_sessions: summary.total_sessions,
            total_hours: summary.total_hours,
            streak: summary.streak,
            last_session_end: summary.last_session_end,
            night_session: false,
        }
    }
}

/// An unlock waiting to be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unlock {
    pub id: AchievementId,
    pub at: DateTime<Utc>,
}

impl From<Unlock> for Event {
    fn from(unlock: Unlock) -> Self {
        Event::AchievementUnlocked {
            achievement: unlock.id,
            at: unlock.at,
        }
    }
}

/// Evaluates the fixed rule set against statistics.
///
/// The only state kept is the set of ids already unlocked and the queue of
/// unlocks not yet acknowledged by the display layer.
#[derive(Debug, Clone, Default)]
pub struct AchievementEvaluator {
    thresholds: AchievementThresholds,
    unlocked: BTreeSet<AchievementId>,
    queue: VecDeque<Unlock>,
}

impl AchievementEvaluator {
    pub fn new(thresholds: AchievementThresholds) -> Self {
        Self {
            thresholds,
            unlocked: BTreeSet::new(),
            queue: VecDeque::new(),
        }
    }

    /// Seed the cache with ids unlocked in earlier runs. They are not queued.
    pub fn restore(&mut self, ids: impl IntoIterator<Item = AchievementId>) {
        self.unlocked.extend(ids);
    }

    pub fn thresholds(&self) -> &AchievementThresholds {
        &self.thresholds
    }

    pub fn is_unlocked(&self, id: AchievementId) -> bool {
        self.unlocked.contains(&id)
    }

    pub fn unlocked(&self) -> impl Iterator<Item = AchievementId> + '_ {
        self.unlocked.iter().copied()
    }

    /// Every rule the input satisfies, unlocked or not.
    pub fn satisfied<Tz: TimeZone>(&self, input: &AchievementInput, tz: &Tz) -> Vec<AchievementId> {
        let t = &self.thresholds;
        AchievementId::ALL
            .into_iter()
            .filter(|id| match id {
                AchievementId::FirstSession => input.total_sessions >= 1,
                AchievementId::Streak => input.streak >= t.streak_days,
                AchievementId::FocusHours => input.total_hours >= t.focus_hours,
                AchievementId::SessionCount => input.total_sessions >= t.sessions,
                AchievementId::NightOwl => {
                    input.night_session
                        || input
                            .last_session_end
                            .map(|end| t.is_night_hour(end.with_timezone(tz).hour()))
                            .unwrap_or(false)
                }
            })
            .collect()
    }

    /// Returns ids crossed for the first time and queues them for display.
    /// Re-evaluating the same input returns nothing new.
    pub fn evaluate<Tz: TimeZone>(
        &mut self,
        input: &AchievementInput,
        tz: &Tz,
        at: DateTime<Utc>,
    ) -> Vec<AchievementId> {
        let fresh: Vec<AchievementId> = self
            .satisfied(input, tz)
            .into_iter()
            .filter(|id| !self.unlocked.contains(id))
            .collect();

        for id in &fresh {
            info!(achievement = %id, "achievement unlocked");
            self.unlocked.insert(*id);
            self.queue.push_back(Unlock { id: *id, at });
        }
        fresh
    }

    /// Unlocks not yet acknowledged.
    pub fn pending(&self) -> impl Iterator<Item = &Unlock> {
        self.queue.iter()
    }

    /// Mark one unlock as shown. Returns false if it was not pending.
    pub fn acknowledge(&mut self, id: AchievementId) -> bool {
        match self.queue.iter().position(|u| u.id == id) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Undo an unlock that could not be persisted. The next evaluation
    /// offers it again.
    pub fn retract(&mut self, id: AchievementId) {
        self.unlocked.remove(&id);
        self.queue.retain(|u| u.id != id);
    }

    /// Take every pending unlock; each is handed out once.
    pub fn drain(&mut self) -> Vec<Unlock> {
        self.queue.drain(..).collect()
    }
}
