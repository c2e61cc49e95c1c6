//! Stats and achievements over a stored history.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use focusroom_core::achievements::{refresh_unlocks, AchievementStore};
use focusroom_core::session::{DateRange, NewSession, SessionUpdate};
use focusroom_core::stats::{current_streak, daily_buckets, longest_streak, summarize};
use focusroom_core::{
    AchievementEvaluator, AchievementId, AchievementThresholds, Phase, SessionQuery, SessionStore,
    SqliteStore,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 10).unwrap()
}

fn at(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
}

/// Store a closed focus session that ends at `end`.
async fn record(store: &SqliteStore, end: DateTime<Utc>, secs: u64) {
    let id = store
        .create_session(NewSession {
            user_id: "local".into(),
            subject_id: None,
            phase_kind: Phase::Focus,
            start_time: end - Duration::seconds(secs as i64),
        })
        .await
        .unwrap();
    store
        .update_session(
            &id,
            SessionUpdate {
                end_time: end,
                elapsed_seconds: secs,
                focus_score: None,
            },
        )
        .await
        .unwrap();
}

async fn focus_history(store: &SqliteStore) -> Vec<focusroom_core::Session> {
    store
        .list_sessions("local", &SessionQuery::focus())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_streak_with_gap() {
    let store = SqliteStore::open_memory().unwrap();
    let day = today();
    record(&store, at(day, 10), 1500).await;
    record(&store, at(day - Duration::days(1), 10), 1500).await;
    record(&store, at(day - Duration::days(3), 10), 1500).await;

    let sessions = focus_history(&store).await;
    assert_eq!(current_streak(&sessions, day, &Utc), 2);
    assert_eq!(longest_streak(&sessions, &Utc), 2);
}

#[tokio::test]
async fn test_streak_broken_two_days_ago() {
    let store = SqliteStore::open_memory().unwrap();
    record(&store, at(today() - Duration::days(2), 10), 1500).await;

    let sessions = focus_history(&store).await;
    assert_eq!(current_streak(&sessions, today(), &Utc), 0);
    assert_eq!(longest_streak(&sessions, &Utc), 1);
}

#[tokio::test]
async fn test_open_session_is_not_counted() {
    let store = SqliteStore::open_memory().unwrap();
    record(&store, at(today(), 9), 1500).await;
    store
        .create_session(NewSession {
            user_id: "local".into(),
            subject_id: None,
            phase_kind: Phase::Focus,
            start_time: at(today(), 11),
        })
        .await
        .unwrap();

    let sessions = focus_history(&store).await;
    assert_eq!(sessions.len(), 2);
    let summary = summarize(&sessions, today(), &Utc);
    assert_eq!(summary.total_sessions, 1);
    assert_eq!(summary.today_focus_seconds, 1500);
}

#[tokio::test]
async fn test_daily_buckets_from_range_query() {
    let store = SqliteStore::open_memory().unwrap();
    let day = today();
    record(&store, at(day, 8), 600).await;
    record(&store, at(day, 20), 900).await;
    record(&store, at(day - Duration::days(2), 8), 1500).await;
    record(&store, at(day - Duration::days(30), 8), 1500).await;

    let from = day - Duration::days(6);
    let range = DateRange::new(at(from, 0), at(day + Duration::days(1), 0)).unwrap();
    let sessions = store
        .list_sessions("local", &SessionQuery::focus().in_range(range))
        .await
        .unwrap();
    assert_eq!(sessions.len(), 3);

    let buckets = daily_buckets(&sessions, from, day, &Utc);
    assert_eq!(buckets.len(), 7);
    assert_eq!(buckets[6].focus_seconds, 1500);
    assert_eq!(buckets[6].sessions, 2);
    assert_eq!(buckets[4].focus_seconds, 1500);
    assert_eq!(buckets[5].sessions, 0);
}

#[tokio::test]
async fn test_unlocks_are_idempotent_across_runs() {
    let store = SqliteStore::open_memory().unwrap();
    let day = today();
    for offset in 0..3 {
        record(&store, at(day - Duration::days(offset), 10), 1500).await;
    }
    let now = at(day, 12);

    let mut evaluator = AchievementEvaluator::new(AchievementThresholds::default());
    let fresh = refresh_unlocks(&store, "local", &mut evaluator, &Utc, now)
        .await
        .unwrap();
    assert_eq!(fresh, vec![AchievementId::FirstSession, AchievementId::Streak]);

    // Same history, same evaluator: nothing new.
    let again = refresh_unlocks(&store, "local", &mut evaluator, &Utc, now)
        .await
        .unwrap();
    assert!(again.is_empty());

    // A fresh evaluator restores persisted ids rather than re-unlocking.
    let mut restarted = AchievementEvaluator::new(AchievementThresholds::default());
    let after_restart = refresh_unlocks(&store, "local", &mut restarted, &Utc, now + Duration::hours(1))
        .await
        .unwrap();
    assert!(after_restart.is_empty());
    assert_eq!(restarted.pending().count(), 0);

    let records = store.unlocked_achievements().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.unlocked_at == now));
}
