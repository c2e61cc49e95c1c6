use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::streak::{current_streak, longest_streak};
use crate::session::Session;

/// Headline numbers over the closed focus history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_sessions: u64,
    pub total_focus_seconds: u64,
    pub total_hours: f64,
    pub today_sessions: u64,
    pub today_focus_seconds: u64,
    pub streak: u32,
    pub longest_streak: u32,
    pub last_session_end: Option<DateTime<Utc>>,
}

pub fn summarize<Tz: TimeZone>(sessions: &[Session], today: NaiveDate, tz: &Tz) -> StatsSummary {
    let closed: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.phase_kind.is_focus() && s.is_closed())
        .collect();

    let mut summary = StatsSummary::default();
    for session in &closed {
        summary.total_sessions += 1;
        summary.total_focus_seconds += session.elapsed_seconds;
        if let Some(end) = session.end_time {
            if end.with_timezone(tz).date_naive() == today {
                summary.today_sessions += 1;
                summary.today_focus_seconds += session.elapsed_seconds;
            }
            summary.last_session_end = summary.last_session_end.max(Some(end));
        }
    }
    summary.total_hours = summary.total_focus_seconds as f64 / 3600.0;
    summary.streak = current_streak(sessions, today, tz);
    summary.longest_streak = longest_streak(sessions, tz);
    summary
}
