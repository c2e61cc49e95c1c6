//! Turns engine events into user-facing notices.
//!
//! The core never talks to a desktop notification service; hosts implement
//! [`Notifier`] for whatever surface they have.

use serde::{Deserialize, Serialize};

use crate::achievements::AchievementId;
use crate::events::Event;
use crate::storage::NotificationsConfig;
use crate::timer::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub play_sound: bool,
}

/// The notice for `event`, if it is one users are told about.
///
/// Only completions and achievement unlocks qualify, and nothing is produced
/// while notifications are disabled.
pub fn notice_for(event: &Event, config: &NotificationsConfig) -> Option<Notice> {
    if !config.enabled {
        return None;
    }

    let (title, body) = match event {
        Event::TimerCompleted { phase, .. } => match phase {
            Phase::Focus => ("Focus complete".to_string(), "Time for a break.".to_string()),
            Phase::ShortBreak | Phase::LongBreak => (
                format!("{} over", phase.label()),
                "Ready to focus again?".to_string(),
            ),
        },
        Event::AchievementUnlocked { achievement, .. } => unlock_text(*achievement),
        _ => return None,
    };

    Some(Notice {
        title,
        body,
        play_sound: config.sound_enabled && config.volume > 0,
    })
}

fn unlock_text(id: AchievementId) -> (String, String) {
    (
        "Achievement unlocked".to_string(),
        format!("{} unlocked!", id.title()),
    )
}

pub trait Notifier {
    fn notify(&self, notice: &Notice);
}

/// Writes notices to the log. Used by the CLI host.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        tracing::info!(
            title = %notice.title,
            body = %notice.body,
            sound = notice.play_sound,
            "notification"
        );
    }
}
