use chrono::{DateTime, Local, Utc};
use clap::Subcommand;
use focusroom_core::achievements::{refresh_unlocks, Unlock};
use focusroom_core::{AchievementEvaluator, AchievementId, AchievementStore, Event, SqliteStore};
use serde::Serialize;

use super::{print_json, CliResult, Context};

/// Unlocks not yet acknowledged, kept across invocations.
const QUEUE_KEY: &str = "achievement_queue";

#[derive(Subcommand)]
pub enum AchievementsAction {
    /// Every achievement with its unlock state
    List,
    /// Unlocks waiting to be acknowledged
    Pending,
    /// Acknowledge a pending unlock
    Ack {
        /// Achievement id (e.g. "first_session", "night_owl")
        id: AchievementId,
    },
}

#[derive(Serialize)]
struct AchievementView {
    id: AchievementId,
    title: &'static str,
    description: String,
    unlocked: bool,
    unlocked_at: Option<DateTime<Utc>>,
}

fn load_queue(store: &SqliteStore) -> Vec<Unlock> {
    match store.kv_get(QUEUE_KEY) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable unlock queue");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "could not read unlock queue");
            Vec::new()
        }
    }
}

fn save_queue(store: &SqliteStore, queue: &[Unlock]) -> CliResult {
    store.kv_set(QUEUE_KEY, &serde_json::to_string(queue)?)?;
    Ok(())
}

/// Re-evaluate the rules against stored history.
///
/// New unlocks are persisted, added to the pending queue and returned as events.
pub async fn refresh(ctx: &Context) -> CliResult<Vec<Event>> {
    let mut queue = load_queue(&ctx.store);
    let mut evaluator = AchievementEvaluator::new(ctx.config.achievements.clone());
    evaluator.restore(queue.iter().map(|u| u.id));
    refresh_unlocks(&ctx.store, ctx.user_id(), &mut evaluator, &Local, Utc::now()).await?;

    let fresh = evaluator.drain();
    if fresh.is_empty() {
        return Ok(Vec::new());
    }
    queue.extend(fresh.iter().copied());
    save_queue(&ctx.store, &queue)?;
    Ok(fresh.into_iter().map(Event::from).collect())
}

pub async fn run(action: AchievementsAction) -> CliResult {
    let ctx = Context::open()?;
    refresh(&ctx).await?;

    match action {
        AchievementsAction::List => {
            let records = ctx.store.unlocked_achievements().await?;
            let views: Vec<AchievementView> = AchievementId::ALL
                .into_iter()
                .map(|id| {
                    let record = records.iter().find(|r| r.id == id);
                    AchievementView {
                        id,
                        title: id.title(),
                        description: id.description(&ctx.config.achievements),
                        unlocked: record.is_some(),
                        unlocked_at: record.map(|r| r.unlocked_at),
                    }
                })
                .collect();
            print_json(&views)?;
        }
        AchievementsAction::Pending => {
            print_json(&load_queue(&ctx.store))?;
        }
        AchievementsAction::Ack { id } => {
            let mut queue = load_queue(&ctx.store);
            let Some(index) = queue.iter().position(|u| u.id == id) else {
                return Err(format!("achievement {id} is not pending").into());
            };
            let unlock = queue.remove(index);
            save_queue(&ctx.store, &queue)?;
            print_json(&unlock)?;
        }
    }
    Ok(())
}
