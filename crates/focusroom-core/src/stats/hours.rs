//! Hour-of-day distributions of focus time.
//!
//! Sessions are placed by the local hour of their end time.

use chrono::{Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: u32,
    pub sessions: u32,
    pub focus_seconds: u64,
}

/// Counts and focus seconds for each of the 24 local hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourHistogram {
    pub counts: [u32; 24],
    pub seconds: [u64; 24],
}

impl HourHistogram {
    /// All 24 hours, zeros included, for heatmap-style displays.
    pub fn heatmap(&self) -> Vec<HourBucket> {
        (0..24).map(|h| self.bucket(h)).collect()
    }

    /// Hours with at least one session, busiest first.
    pub fn productive_hours(&self) -> Vec<HourBucket> {
        let mut hours: Vec<HourBucket> = self.heatmap().into_iter().filter(|b| b.sessions > 0).collect();
        hours.sort_by(|a, b| b.focus_seconds.cmp(&a.focus_seconds).then(a.hour.cmp(&b.hour)));
        hours
    }

    pub fn total_sessions(&self) -> u32 {
        self.counts.iter().sum()
    }

    fn bucket(&self, hour: u32) -> HourBucket {
        HourBucket {
            hour,
            sessions: self.counts[hour as usize],
            focus_seconds: self.seconds[hour as usize],
        }
    }
}

pub fn hour_histogram<Tz: TimeZone>(sessions: &[Session], tz: &Tz) -> HourHistogram {
    let mut histogram = HourHistogram {
        counts: [0; 24],
        seconds: [0; 24],
    };
    for session in sessions.iter().filter(|s| s.phase_kind.is_focus()) {
        let Some(end) = session.end_time else {
            continue;
        };
        let hour = end.with_timezone(tz).hour() as usize;
        histogram.counts[hour] += 1;
        histogram.seconds[hour] += session.elapsed_seconds;
    }
    histogram
}

/// One cell of the weekday x hour grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    /// 0 = Sunday.
    pub day_of_week: u8,
    pub hour: u8,
    pub sessions: u32,
    pub focus_seconds: u64,
    /// 0.0 .. 1.0, square-root scaled against the busiest cell.
    pub heat_intensity: f64,
}

impl HeatmapCell {
    pub fn new(day_of_week: u8, hour: u8) -> Self {
        Self {
            day_of_week,
            hour,
            sessions: 0,
            focus_seconds: 0,
            heat_intensity: 0.0,
        }
    }

    fn calculate_heat(&mut self, max_seconds: u64) {
        self.heat_intensity = if max_seconds == 0 {
            0.0
        } else {
            (self.focus_seconds as f64 / max_seconds as f64).sqrt().min(1.0)
        };
    }

    /// Character for ASCII heatmap rendering.
    pub fn heat_char(&self) -> char {
        match self.heat_intensity {
            h if h <= 0.0 => ' ',
            h if h < 0.25 => '░',
            h if h < 0.5 => '▒',
            h if h < 0.75 => '▓',
            _ => '█',
        }
    }

    pub fn day_name(&self) -> &'static str {
        DAY_NAMES.get(self.day_of_week as usize).copied().unwrap_or("?")
    }
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// 7 x 24 grid of focus time by local weekday and hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayHeatmap {
    /// All 168 cells, indexed `day_of_week * 24 + hour`.
    pub cells: Vec<HeatmapCell>,
}

impl WeekdayHeatmap {
    pub fn cell(&self, day_of_week: u8, hour: u8) -> Option<&HeatmapCell> {
        if hour >= 24 {
            return None;
        }
        self.cells.get(day_of_week as usize * 24 + hour as usize)
    }

    pub fn render_ascii(&self) -> String {
        let mut output = String::from("    ");
        for hour in 0..24 {
            output.push_str(&format!("{hour:>2} "));
        }
        output.push('\n');

        for day in 0..7u8 {
            output.push_str(&format!("{:<4}", DAY_NAMES[day as usize]));
            for hour in 0..24u8 {
                let ch = self.cell(day, hour).map(|c| c.heat_char()).unwrap_or(' ');
                output.push(' ');
                output.push(ch);
                output.push(' ');
            }
            output.push('\n');
        }
        output
    }
}

pub fn weekday_hour_heatmap<Tz: TimeZone>(sessions: &[Session], tz: &Tz) -> WeekdayHeatmap {
    let mut cells: Vec<HeatmapCell> = (0..168)
        .map(|i| HeatmapCell::new((i / 24) as u8, (i % 24) as u8))
        .collect();

    for session in sessions.iter().filter(|s| s.phase_kind.is_focus()) {
        let Some(end) = session.end_time else {
            continue;
        };
        let local = end.with_timezone(tz);
        let idx = local.weekday().num_days_from_sunday() as usize * 24 + local.hour() as usize;
        cells[idx].sessions += 1;
        cells[idx].focus_seconds += session.elapsed_seconds;
    }

    let max_seconds = cells.iter().map(|c| c.focus_seconds).max().unwrap_or(0);
    for cell in &mut cells {
        cell.calculate_heat(max_seconds);
    }
    WeekdayHeatmap { cells }
}
