use std::time::Duration;

use clap::Subcommand;
use focusroom_core::session::{commit_closes, CloseReport};
use focusroom_core::{
    notice_for, EngineSnapshot, Event, FocusEngine, Notifier, Phase, SqliteStore, SystemClock,
    TracingNotifier,
};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{achievements, print_json, CliResult, Context};

const ENGINE_KEY: &str = "focus_engine";
/// Ticks between retries of close writes that failed.
const RETRY_EVERY: u64 = 30;

type Engine = FocusEngine<SqliteStore, SystemClock>;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume the countdown
    Start {
        /// Subject for the focus session
        #[arg(long)]
        subject: Option<String>,
    },
    /// Pause the countdown, keeping the open session
    Pause,
    /// Print current timer state as JSON
    Status,
    /// End the current phase and move to the next one
    Skip,
    /// Reset the countdown of the current phase
    Reset {
        /// Countdown length in minutes (defaults to the configured duration)
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Switch to another phase
    Switch {
        /// focus, short-break or long-break
        phase: Phase,
    },
    /// Drive the timer in the foreground, printing events as JSON lines
    Run {
        /// Stop after this many one-second ticks
        #[arg(long)]
        ticks: Option<u64>,
    },
}

fn load_engine(ctx: &Context) -> Engine {
    let store = ctx.store.clone();
    let prefs = ctx.config.timer.clone();
    match ctx.store.kv_get(ENGINE_KEY) {
        Ok(Some(json)) => match serde_json::from_str::<EngineSnapshot>(&json) {
            Ok(snapshot) => {
                return FocusEngine::from_snapshot(SystemClock, store, ctx.user_id(), prefs, snapshot)
            }
            Err(e) => warn!(error = %e, "discarding unreadable engine snapshot"),
        },
        Ok(None) => {}
        Err(e) => warn!(error = %e, "could not read engine snapshot"),
    }
    FocusEngine::new(SystemClock, store, ctx.user_id(), prefs)
}

fn save_engine(ctx: &Context, engine: &Engine) -> CliResult {
    let json = serde_json::to_string(&engine.to_snapshot())?;
    ctx.store.kv_set(ENGINE_KEY, &json)?;
    Ok(())
}

/// Completion events, plus the auto-advance that follows them.
async fn completions(ctx: &Context, engine: &mut Engine, restart: bool) -> Vec<Event> {
    let mut events = engine.drain_completions();
    if events.is_empty() || !ctx.config.auto_advance {
        return events;
    }
    if let Some(switched) = engine.advance() {
        events.push(switched);
        if restart {
            events.extend(engine.start().await);
        }
    }
    events
}

/// Achievement events for sessions that just landed.
async fn unlocks(ctx: &Context, closed: bool) -> Vec<Event> {
    if !closed {
        return Vec::new();
    }
    match achievements::refresh(ctx).await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "achievement refresh failed");
            Vec::new()
        }
    }
}

fn notify_all(ctx: &Context, notifier: &impl Notifier, events: &[Event]) {
    for event in events {
        if let Some(notice) = notice_for(event, &ctx.config.notifications) {
            notifier.notify(&notice);
        }
    }
}

pub async fn run(action: TimerAction) -> CliResult {
    let ctx = Context::open()?;
    let mut engine = load_engine(&ctx);

    let result = match action {
        TimerAction::Run { ticks } => run_loop(&ctx, &mut engine, ticks).await,
        action => run_once(&ctx, &mut engine, action).await,
    };
    save_engine(&ctx, &engine)?;
    result
}

async fn run_once(ctx: &Context, engine: &mut Engine, action: TimerAction) -> CliResult {
    // Catch up on wall-clock time since the last invocation.
    engine.tick();
    let mut events = completions(ctx, engine, false).await;

    match action {
        TimerAction::Start { subject } => {
            if let Some(subject) = subject.or_else(|| ctx.config.default_subject.clone()) {
                engine.bind_subject(Some(subject));
            }
            events.extend(engine.start().await);
        }
        TimerAction::Pause => events.extend(engine.pause()),
        TimerAction::Skip => events.push(engine.skip()),
        TimerAction::Reset { minutes } => {
            events.extend(engine.reset_timer(minutes.map(|m| m.saturating_mul(60))));
        }
        TimerAction::Switch { phase } => events.push(engine.switch_phase(phase)),
        TimerAction::Status | TimerAction::Run { .. } => {}
    }
    events.extend(completions(ctx, engine, false).await);

    let settled = engine.settle().await;
    let closed = settled
        .iter()
        .any(|e| matches!(e, Event::SessionClosed { .. }));
    events.extend(settled);
    events.extend(unlocks(ctx, closed).await);
    if engine.pending_close_count() > 0 {
        warn!(
            pending = engine.pending_close_count(),
            "session writes failed, kept for the next invocation"
        );
    }

    events.push(engine.snapshot());
    print_json(&events)
}

fn emit(ctx: &Context, notifier: &TracingNotifier, events: &[Event]) -> CliResult {
    notify_all(ctx, notifier, events);
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

/// The foreground host loop: tick once a second, commit closes in the
/// background and keep ticking while they are written.
///
/// Commits in flight are always awaited before returning, even when the
/// loop itself fails.
async fn run_loop(ctx: &Context, engine: &mut Engine, ticks: Option<u64>) -> CliResult {
    let notifier = TracingNotifier;
    let mut commits: JoinSet<CloseReport<SqliteStore>> = JoinSet::new();
    let driven = drive(ctx, engine, &notifier, &mut commits, ticks).await;
    finish_commits(ctx, engine, &notifier, &mut commits).await;

    driven?;
    emit(ctx, &notifier, &[engine.snapshot()])
}

/// Commit what is still queued and wait for every commit in flight.
/// Failed closes go back to the engine so the saved snapshot keeps them.
async fn finish_commits(
    ctx: &Context,
    engine: &mut Engine,
    notifier: &TracingNotifier,
    commits: &mut JoinSet<CloseReport<SqliteStore>>,
) {
    let closes = engine.drain_closes();
    if !closes.is_empty() {
        commits.spawn(commit_closes(closes));
    }
    while let Some(joined) = commits.join_next().await {
        if let Err(e) = handle_report(ctx, engine, notifier, joined).await {
            warn!(error = %e, "could not report a committed close");
        }
    }
}

async fn drive(
    ctx: &Context,
    engine: &mut Engine,
    notifier: &TracingNotifier,
    commits: &mut JoinSet<CloseReport<SqliteStore>>,
    ticks: Option<u64>,
) -> CliResult {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut remaining = ticks;
    let mut tick_count: u64 = 0;

    engine.tick();
    let caught_up = completions(ctx, engine, true).await;
    emit(ctx, notifier, &caught_up)?;
    if !engine.is_running() {
        let started = engine.start().await;
        emit(ctx, notifier, &started)?;
    }

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick_count += 1;
                engine.tick();
                let events = completions(ctx, engine, true).await;
                let fresh = !events.is_empty();
                if fresh {
                    emit(ctx, notifier, &events)?;
                    save_engine(ctx, engine)?;
                }
                if fresh || tick_count % RETRY_EVERY == 0 {
                    let closes = engine.drain_closes();
                    if !closes.is_empty() {
                        debug!(count = closes.len(), "committing closes in the background");
                        commits.spawn(commit_closes(closes));
                    }
                }
                if let Some(n) = remaining.as_mut() {
                    *n = n.saturating_sub(1);
                    if *n == 0 {
                        break;
                    }
                }
            }
            Some(joined) = commits.join_next(), if !commits.is_empty() => {
                handle_report(ctx, engine, notifier, joined).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                engine.pause();
                break;
            }
        }
    }
    Ok(())
}

async fn handle_report(
    ctx: &Context,
    engine: &mut Engine,
    notifier: &TracingNotifier,
    joined: Result<CloseReport<SqliteStore>, tokio::task::JoinError>,
) -> CliResult {
    let report = match joined {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "close commit task failed");
            return Ok(());
        }
    };
    let closed = !report.closed.is_empty();
    engine.requeue_closes(report.failed);
    emit(ctx, notifier, &report.events)?;
    let unlocked = unlocks(ctx, closed).await;
    emit(ctx, notifier, &unlocked)
}
