use chrono::{Duration, Local};
use clap::Subcommand;
use focusroom_core::stats::{
    current_streak, daily_buckets, hour_histogram, longest_streak, summarize, week_start,
    weekday_hour_heatmap, weekly_buckets,
};
use focusroom_core::{SessionQuery, SessionStore};
use serde_json::json;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Totals, today's focus and streaks
    Summary,
    /// Current and longest streak in days
    Streak,
    /// Focus time per day, oldest first
    Daily {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Focus time per Monday-based week, oldest first
    Weekly {
        #[arg(long, default_value_t = 4)]
        weeks: u32,
    },
    /// Focus time by hour of day
    Hours {
        /// Include hours with no sessions
        #[arg(long)]
        all: bool,
    },
    /// Weekday x hour heatmap
    Heatmap {
        /// Print as an ASCII grid instead of JSON
        #[arg(long)]
        ascii: bool,
    },
}

pub async fn run(action: StatsAction) -> CliResult {
    let ctx = Context::open()?;
    let sessions = ctx
        .store
        .list_sessions(ctx.user_id(), &SessionQuery::focus())
        .await?;
    let today = Local::now().date_naive();

    match action {
        StatsAction::Summary => {
            print_json(&summarize(&sessions, today, &Local))?;
        }
        StatsAction::Streak => {
            let streak = json!({
                "current": current_streak(&sessions, today, &Local),
                "longest": longest_streak(&sessions, &Local),
            });
            print_json(&streak)?;
        }
        StatsAction::Daily { days } => {
            let from = today - Duration::days(i64::from(days.max(1)) - 1);
            print_json(&daily_buckets(&sessions, from, today, &Local))?;
        }
        StatsAction::Weekly { weeks } => {
            let weeks = weeks.max(1);
            let from = week_start(today) - Duration::weeks(i64::from(weeks) - 1);
            print_json(&weekly_buckets(&sessions, from, weeks, &Local))?;
        }
        StatsAction::Hours { all } => {
            let histogram = hour_histogram(&sessions, &Local);
            if all {
                print_json(&histogram.heatmap())?;
            } else {
                print_json(&histogram.productive_hours())?;
            }
        }
        StatsAction::Heatmap { ascii } => {
            let heatmap = weekday_hour_heatmap(&sessions, &Local);
            if ascii {
                print!("{}", heatmap.render_ascii());
            } else {
                print_json(&heatmap)?;
            }
        }
    }
    Ok(())
}
