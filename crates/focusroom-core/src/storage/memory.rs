use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::achievements::{AchievementId, AchievementStore, UnlockRecord};
use crate::error::PersistenceError;
use crate::session::{NewSession, Session, SessionId, SessionQuery, SessionStore, SessionUpdate};

#[derive(Debug, Default)]
struct MemoryState {
    sessions: Vec<Session>,
    unlocks: Vec<UnlockRecord>,
    offline: bool,
}

/// Session and achievement store kept in process memory.
///
/// Clones share the same data. `set_offline` makes every call fail, which
/// lets hosts and tests exercise the persistence-failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock_raw().offline = offline;
    }

    /// Every stored session, in insertion order.
    pub fn snapshot(&self) -> Vec<Session> {
        self.lock_raw().sessions.clone()
    }

    fn lock_raw(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, PersistenceError> {
        let guard = self.lock_raw();
        if guard.offline {
            return Err(PersistenceError::QueryFailed("store offline".into()));
        }
        Ok(guard)
    }
}

impl SessionStore for MemoryStore {
    async fn create_session(&self, new: NewSession) -> Result<SessionId, PersistenceError> {
        let mut state = self.lock()?;
        let id = SessionId::generate();
        state.sessions.push(Session {
            id: id.clone(),
            user_id: new.user_id,
            subject_id: new.subject_id,
            start_time: new.start_time,
            end_time: None,
            elapsed_seconds: 0,
            phase_kind: new.phase_kind,
            focus_score: None,
        });
        Ok(id)
    }

    async fn update_session(
        &self,
        id: &SessionId,
        update: SessionUpdate,
    ) -> Result<Session, PersistenceError> {
        let mut state = self.lock()?;
        let session = state
            .sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| PersistenceError::NotFound(format!("session {id}")))?;
        session.end_time = Some(update.end_time);
        session.elapsed_seconds = update.elapsed_seconds;
        session.focus_score = update.focus_score;
        Ok(session.clone())
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, PersistenceError> {
        let state = self.lock()?;
        let mut sessions: Vec<Session> = state
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && query.matches(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }
}

impl AchievementStore for MemoryStore {
    async fn unlocked_achievements(&self) -> Result<Vec<UnlockRecord>, PersistenceError> {
        Ok(self.lock()?.unlocks.clone())
    }

    async fn record_unlock(
        &self,
        id: AchievementId,
        at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut state = self.lock()?;
        if !state.unlocks.iter().any(|u| u.id == id) {
            state.unlocks.push(UnlockRecord { id, unlocked_at: at });
        }
        Ok(())
    }
}
