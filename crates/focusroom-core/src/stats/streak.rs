//! Day streaks over closed sessions.
//!
//! A day counts when at least one closed session with non-zero elapsed time
//! ended on it, in the caller's local time zone.

use std::collections::BTreeSet;

use chrono::{NaiveDate, TimeZone};

use crate::session::Session;

/// Local calendar days with at least one counted session.
pub fn active_days<Tz: TimeZone>(sessions: &[Session], tz: &Tz) -> BTreeSet<NaiveDate> {
    sessions
        .iter()
        .filter(|s| s.elapsed_seconds > 0)
        .filter_map(|s| s.end_time)
        .map(|end| end.with_timezone(tz).date_naive())
        .collect()
}

/// Consecutive active days ending today or yesterday.
///
/// Returns 0 when the most recent active day is older than yesterday.
pub fn current_streak<Tz: TimeZone>(sessions: &[Session], today: NaiveDate, tz: &Tz) -> u32 {
    let days = active_days(sessions, tz);
    let Some(&latest) = days.iter().next_back() else {
        return 0;
    };
    let Some(yesterday) = today.pred_opt() else {
        return 0;
    };
    if latest < yesterday {
        return 0;
    }
    run_length_back_from(&days, latest)
}

/// Longest run of consecutive active days anywhere in the history.
pub fn longest_streak<Tz: TimeZone>(sessions: &[Session], tz: &Tz) -> u32 {
    let days = active_days(sessions, tz);
    let mut best = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for &day in &days {
        run = match previous.and_then(|p| p.succ_opt()) {
            Some(next) if next == day => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(day);
    }
    best
}

fn run_length_back_from(days: &BTreeSet<NaiveDate>, latest: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut expected = Some(latest);
    for &day in days.iter().rev() {
        match expected {
            Some(want) if day == want => {
                streak += 1;
                expected = want.pred_opt();
            }
            _ => break,
        }
    }
    streak
}
