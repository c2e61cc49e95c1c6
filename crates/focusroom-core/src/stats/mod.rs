//! Statistics derived from the session history.
//!
//! Everything here is a pure function over closed sessions plus a time zone,
//! so the dashboard, the achievement rules and the CLI all agree on the same
//! numbers. Empty input never errors; it yields zeros.

mod buckets;
mod hours;
mod streak;
mod summary;

pub use buckets::{daily_buckets, week_start, weekly_buckets, DailyBucket, WeeklyBucket};
pub use hours::{
    hour_histogram, weekday_hour_heatmap, HeatmapCell, HourBucket, HourHistogram, WeekdayHeatmap,
};
pub use streak::{active_days, current_streak, longest_streak};
pub use summary::{summarize, StatsSummary};
