//! Continuous per-day and per-week focus totals for charts.
//!
//! Every day (or week) in the requested range gets an entry, including
//! empty ones, so chart axes stay continuous.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub focus_seconds: u64,
    pub sessions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyBucket {
    /// Monday of the week.
    pub week_start: NaiveDate,
    pub focus_seconds: u64,
    pub sessions: u32,
    pub active_days: u32,
}

/// Closed focus sessions summed by local end date.
fn totals_by_day<Tz: TimeZone>(sessions: &[Session], tz: &Tz) -> HashMap<NaiveDate, (u64, u32)> {
    let mut totals: HashMap<NaiveDate, (u64, u32)> = HashMap::new();
    for session in sessions.iter().filter(|s| s.phase_kind.is_focus()) {
        let Some(end) = session.end_time else {
            continue;
        };
        let day = end.with_timezone(tz).date_naive();
        let entry = totals.entry(day).or_default();
        entry.0 += session.elapsed_seconds;
        entry.1 += 1;
    }
    totals
}

/// One bucket per day in `from..=to`. Returns an empty list when `to < from`.
pub fn daily_buckets<Tz: TimeZone>(
    sessions: &[Session],
    from: NaiveDate,
    to: NaiveDate,
    tz: &Tz,
) -> Vec<DailyBucket> {
    let totals = totals_by_day(sessions, tz);
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|date| {
            let (focus_seconds, sessions) = totals.get(&date).copied().unwrap_or_default();
            DailyBucket {
                date,
                focus_seconds,
                sessions,
            }
        })
        .collect()
}

/// Monday of the week containing `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

/// `weeks` consecutive Monday-based weeks starting with the week of `from`.
pub fn weekly_buckets<Tz: TimeZone>(
    sessions: &[Session],
    from: NaiveDate,
    weeks: u32,
    tz: &Tz,
) -> Vec<WeeklyBucket> {
    if weeks == 0 {
        return Vec::new();
    }
    let first = week_start(from);
    let last = first + Duration::days(i64::from(weeks) * 7 - 1);
    let days = daily_buckets(sessions, first, last, tz);

    days.chunks(7)
        .map(|week| WeeklyBucket {
            week_start: week[0].date,
            focus_seconds: week.iter().map(|d| d.focus_seconds).sum(),
            sessions: week.iter().map(|d| d.sessions).sum(),
            active_days: week.iter().filter(|d| d.focus_seconds > 0).count() as u32,
        })
        .collect()
}
