use chrono::{DateTime, TimeZone, Timelike, Utc};
use tracing::warn;

use super::{AchievementEvaluator, AchievementId, AchievementInput, AchievementStore};
use crate::error::Result;
use crate::session::{SessionQuery, SessionStore};
use crate::stats::summarize;

/// Recompute unlocks from the stored history and persist new ones.
///
/// Ids already persisted are folded into the evaluator first, so an unlock
/// from an earlier process is never queued again. An unlock whose
/// `record_unlock` fails is retracted and left out of the result; a later
/// refresh offers it again.
pub async fn refresh_unlocks<S, Tz>(
    store: &S,
    user_id: &str,
    evaluator: &mut AchievementEvaluator,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Result<Vec<AchievementId>>
where
    S: SessionStore + AchievementStore,
    Tz: TimeZone,
{
    let persisted = store.unlocked_achievements().await?;
    evaluator.restore(persisted.into_iter().map(|r| r.id));

    let sessions = store.list_sessions(user_id, &SessionQuery::focus()).await?;
    let today = now.with_timezone(tz).date_naive();
    let summary = summarize(&sessions, today, tz);
    let thresholds = evaluator.thresholds();
    let night_session = sessions
        .iter()
        .filter(|s| s.phase_kind.is_focus())
        .filter_map(|s| s.end_time)
        .any(|end| thresholds.is_night_hour(end.with_timezone(tz).hour()));
    let input = AchievementInput {
        night_session,
        ..AchievementInput::from(&summary)
    };
    let fresh = evaluator.evaluate(&input, tz, now);

    let mut recorded = Vec::with_capacity(fresh.len());
    for id in fresh {
        match store.record_unlock(id, now).await {
            Ok(()) => recorded.push(id),
            Err(err) => {
                warn!(achievement = %id, error = %err, "could not persist unlock, retrying later");
                evaluator.retract(id);
            }
        }
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::achievements::UnlockRecord;
    use crate::error::PersistenceError;
    use crate::session::{NewSession, Session, SessionId, SessionUpdate};
    use crate::storage::MemoryStore;
    use crate::timer::Phase;
    use chrono::Duration;

    async fn closed_focus(store: &MemoryStore, end: DateTime<Utc>, secs: u64) {
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

    #[tokio::test]
    async fn unlocks_persist_across_evaluators() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        closed_focus(&store, now, 1500).await;

        let mut first = AchievementEvaluator::default();
        let fresh = refresh_unlocks(&store, "local", &mut first, &Utc, now).await.unwrap();
        assert_eq!(fresh, vec![AchievementId::FirstSession, AchievementId::NightOwl]);

        let mut second = AchievementEvaluator::default();
        let again = refresh_unlocks(&store, "local", &mut second, &Utc, now).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(second.pending().count(), 0);
        assert!(second.is_unlocked(AchievementId::NightOwl));
    }

    #[tokio::test]
    async fn night_session_counts_even_when_not_last() {
        let store = MemoryStore::new();
        let night = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap();
        closed_focus(&store, night, 1500).await;
        closed_focus(&store, morning, 1500).await;

        let mut eval = AchievementEvaluator::default();
        let fresh = refresh_unlocks(&store, "local", &mut eval, &Utc, morning)
            .await
            .unwrap();
        assert_eq!(fresh, vec![AchievementId::FirstSession, AchievementId::NightOwl]);
    }

    /// Sessions read fine but unlock writes fail until `accept` is set.
    #[derive(Clone)]
    struct FlakyUnlocks {
        inner: MemoryStore,
        accept: Arc<AtomicBool>,
    }

    impl SessionStore for FlakyUnlocks {
        async fn create_session(&self, new: NewSession) -> Result<SessionId, PersistenceError> {
            self.inner.create_session(new).await
        }

        async fn update_session(
            &self,
            id: &SessionId,
            update: SessionUpdate,
        ) -> Result<Session, PersistenceError> {
            self.inner.update_session(id, update).await
        }

        async fn list_sessions(
            &self,
            user_id: &str,
            query: &SessionQuery,
        ) -> Result<Vec<Session>, PersistenceError> {
            self.inner.list_sessions(user_id, query).await
        }
    }

    impl AchievementStore for FlakyUnlocks {
        async fn unlocked_achievements(&self) -> Result<Vec<UnlockRecord>, PersistenceError> {
            self.inner.unlocked_achievements().await
        }

        async fn record_unlock(
            &self,
            id: AchievementId,
            at: DateTime<Utc>,
        ) -> Result<(), PersistenceError> {
            if !self.accept.load(Ordering::SeqCst) {
                return Err(PersistenceError::QueryFailed("unlock write refused".into()));
            }
            self.inner.record_unlock(id, at).await
        }
    }

    #[tokio::test]
    async fn unpersisted_unlock_is_delivered_exactly_once() {
        let inner = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        closed_focus(&inner, now, 1500).await;
        let store = FlakyUnlocks {
            inner,
            accept: Arc::new(AtomicBool::new(false)),
        };

        let mut first = AchievementEvaluator::default();
        let fresh = refresh_unlocks(&store, "local", &mut first, &Utc, now).await.unwrap();
        assert!(fresh.is_empty());
        assert!(first.drain().is_empty());

        store.accept.store(true, Ordering::SeqCst);
        let mut second = AchievementEvaluator::default();
        let fresh = refresh_unlocks(&store, "local", &mut second, &Utc, now).await.unwrap();
        assert_eq!(fresh, vec![AchievementId::FirstSession]);
        assert_eq!(second.drain().len(), 1);

        let mut third = AchievementEvaluator::default();
        let fresh = refresh_unlocks(&store, "local", &mut third, &Utc, now).await.unwrap();
        assert!(fresh.is_empty());
    }

    #[tokio::test]
    async fn offline_store_surfaces_error() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let mut eval = AchievementEvaluator::default();
        let err = refresh_unlocks(&store, "local", &mut eval, &Utc, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_persistence());
    }
}
