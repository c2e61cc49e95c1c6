//! Binds focus phases to persisted session records.
//!
//! The recorder is the only writer of session rows and holds at most one
//! open session. Elapsed time is accumulated in memory on every focus tick
//! and written once, when the session closes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::{NewSession, Session, SessionId, SessionUpdate};
use super::store::SessionStore;
use crate::error::{ConflictError, CoreError, Result};
use crate::events::Event;
use crate::timer::Phase;

/// The recorder's in-memory view of the open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    /// `None` while the row could not be created; the close path retries.
    pub id: Option<SessionId>,
    pub subject_id: Option<String>,
    pub phase_kind: Phase,
    pub start_time: DateTime<Utc>,
    pub elapsed_seconds: u64,
}

pub struct SessionRecorder<S> {
    store: S,
    user_id: String,
    open: Option<OpenSession>,
}

impl<S: SessionStore> SessionRecorder<S> {
    pub fn new(store: S, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            open: None,
        }
    }

    /// Rebuild a recorder around a session left open by a previous run.
    pub fn with_open(store: S, user_id: impl Into<String>, open: Option<OpenSession>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            open,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn current(&self) -> Option<&OpenSession> {
        self.open.as_ref()
    }

    pub fn has_open_session(&self) -> bool {
        self.open.is_some()
    }

    /// Persist a new focus session starting at `now`.
    ///
    /// Fails with [`ConflictError`] if a session is already open. If the store
    /// call fails the session is still opened in memory and the persistence
    /// error is returned so the host can warn about it.
    pub async fn open_session(
        &mut self,
        subject_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SessionId> {
        if let Some(open) = &self.open {
            return Err(ConflictError::SessionAlreadyOpen {
                session_id: open.id.as_ref().map(|id| id.to_string()),
            }
            .into());
        }

        let new = NewSession {
            user_id: self.user_id.clone(),
            subject_id: subject_id.clone(),
            phase_kind: Phase::Focus,
            start_time: now,
        };

        match self.store.create_session(new).await {
            Ok(id) => {
                info!(session_id = %id, subject = ?subject_id, "session opened");
                self.open = Some(OpenSession {
                    id: Some(id.clone()),
                    subject_id,
                    phase_kind: Phase::Focus,
                    start_time: now,
                    elapsed_seconds: 0,
                });
                Ok(id)
            }
            Err(err) => {
                warn!(error = %err, "could not persist new session, keeping it in memory");
                self.open = Some(OpenSession {
                    id: None,
                    subject_id,
                    phase_kind: Phase::Focus,
                    start_time: now,
                    elapsed_seconds: 0,
                });
                Err(err.into())
            }
        }
    }

    /// Add ticked seconds to the open session. Never touches the store.
    pub fn accumulate(&mut self, consumed_seconds: u64) {
        match self.open.as_mut() {
            Some(open) => {
                open.elapsed_seconds = open.elapsed_seconds.saturating_add(consumed_seconds);
            }
            None => debug!(consumed_seconds, "no open session, dropping focus seconds"),
        }
    }

    /// Detach the open session and hand back the write that finalizes it.
    ///
    /// The open reference is cleared immediately; the returned
    /// [`PendingClose`] owns everything it needs to persist on its own.
    /// Returns `None` (and logs) when no session is open.
    pub fn close_session(
        &mut self,
        focus_score: Option<u8>,
        now: DateTime<Utc>,
    ) -> Option<PendingClose<S>> {
        let Some(session) = self.open.take() else {
            warn!("close requested with no open session");
            return None;
        };
        debug!(
            session_id = ?session.id,
            elapsed = session.elapsed_seconds,
            "session detached for close"
        );
        Some(PendingClose {
            store: self.store.clone(),
            user_id: self.user_id.clone(),
            session,
            end_time: now,
            focus_score,
        })
    }

    /// Rebuild a close saved with [`PendingClose::to_record`] so it can be
    /// committed by this process.
    pub fn resume_close(&self, record: PendingCloseRecord) -> PendingClose<S> {
        PendingClose {
            store: self.store.clone(),
            user_id: self.user_id.clone(),
            session: record.session,
            end_time: record.end_time,
            focus_score: record.focus_score,
        }
    }
}

/// The persistable part of a [`PendingClose`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCloseRecord {
    pub session: OpenSession,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub focus_score: Option<u8>,
}

/// A closed session whose final write has not landed yet.
pub struct PendingClose<S> {
    store: S,
    user_id: String,
    session: OpenSession,
    end_time: DateTime<Utc>,
    focus_score: Option<u8>,
}

impl<S> PendingClose<S> {
    pub fn to_record(&self) -> PendingCloseRecord {
        PendingCloseRecord {
            session: self.session.clone(),
            end_time: self.end_time,
            focus_score: self.focus_score,
        }
    }
}

impl<S: SessionStore> PendingClose<S> {
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.id.as_ref()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.session.elapsed_seconds
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Write `end_time` and the final elapsed total.
    ///
    /// Creates the row first when opening it had failed. A failed commit can be
    /// retried; a row created on an earlier attempt is reused.
    pub async fn commit(&mut self) -> Result<Session> {
        let id = match &self.session.id {
            Some(id) => id.clone(),
            None => {
                let new = NewSession {
                    user_id: self.user_id.clone(),
                    subject_id: self.session.subject_id.clone(),
                    phase_kind: self.session.phase_kind,
                    start_time: self.session.start_time,
                };
                let id = self.store.create_session(new).await?;
                self.session.id = Some(id.clone());
                id
            }
        };

        let update = SessionUpdate {
            end_time: self.end_time,
            elapsed_seconds: self.session.elapsed_seconds,
            focus_score: self.focus_score,
        };
        let stored = self.store.update_session(&id, update).await?;
        info!(
            session_id = %id,
            elapsed = stored.elapsed_seconds,
            "session closed"
        );
        Ok(stored)
    }
}

/// Outcome of committing a batch of pending closes.
pub struct CloseReport<S> {
    pub closed: Vec<Session>,
    pub events: Vec<Event>,
    /// Closes whose write failed; hand them back to the engine to retry.
    pub failed: Vec<PendingClose<S>>,
}

/// Commit pending closes in order, turning outcomes into events.
///
/// Failures are logged and reported as [`Event::PersistenceWarning`]; they
/// never abort the remaining commits.
pub async fn commit_closes<S: SessionStore>(closes: Vec<PendingClose<S>>) -> CloseReport<S> {
    let mut report = CloseReport {
        closed: Vec::new(),
        events: Vec::new(),
        failed: Vec::new(),
    };

    for mut close in closes {
        match close.commit().await {
            Ok(session) => {
                report.events.push(Event::SessionClosed {
                    session_id: session.id.to_string(),
                    elapsed_secs: session.elapsed_seconds,
                    at: close.end_time,
                });
                report.closed.push(session);
            }
            Err(err) => {
                warn!(error = %err, elapsed = close.elapsed_seconds(), "session close failed");
                report.events.push(persistence_warning(&err, close.end_time));
                report.failed.push(close);
            }
        }
    }
    report
}

pub(crate) fn persistence_warning(err: &CoreError, at: DateTime<Utc>) -> Event {
    Event::PersistenceWarning {
        message: err.to_string(),
        at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionQuery;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn open_accumulate_close() {
        let store = MemoryStore::new();
        let mut recorder = SessionRecorder::new(store.clone(), "local");

        let id = recorder.open_session(Some("math".into()), t0()).await.unwrap();
        recorder.accumulate(30);
        recorder.accumulate(12);
        assert_eq!(recorder.current().unwrap().elapsed_seconds, 42);

        let mut close = recorder
            .close_session(Some(4), t0() + Duration::minutes(5))
            .unwrap();
        assert!(!recorder.has_open_session());

        let session = close.commit().await.unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.elapsed_seconds, 42);
        assert_eq!(session.subject_id.as_deref(), Some("math"));
        assert_eq!(session.focus_score, Some(4));
        assert_eq!(session.end_time, Some(t0() + Duration::minutes(5)));
    }

    #[tokio::test]
    async fn second_open_is_a_conflict() {
        let mut recorder = SessionRecorder::new(MemoryStore::new(), "local");
        recorder.open_session(None, t0()).await.unwrap();

        let err = recorder.open_session(None, t0()).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn close_without_open_session_is_silent() {
        let mut recorder = SessionRecorder::new(MemoryStore::new(), "local");
        assert!(recorder.close_session(None, t0()).is_none());
    }

    #[tokio::test]
    async fn accumulate_does_not_write_until_close() {
        let store = MemoryStore::new();
        let mut recorder = SessionRecorder::new(store.clone(), "local");
        recorder.open_session(None, t0()).await.unwrap();
        recorder.accumulate(100);

        let rows = store.list_sessions("local", &SessionQuery::all()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].elapsed_seconds, 0);
        assert!(rows[0].end_time.is_none());
    }

    #[tokio::test]
    async fn failed_open_is_reconciled_on_close() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let mut recorder = SessionRecorder::new(store.clone(), "local");

        let err = recorder.open_session(None, t0()).await.unwrap_err();
        assert!(err.is_persistence());
        assert!(recorder.has_open_session());
        recorder.accumulate(90);

        let mut close = recorder.close_session(None, t0() + Duration::minutes(2)).unwrap();
        assert!(close.commit().await.is_err());

        store.set_offline(false);
        let session = close.commit().await.unwrap();
        assert_eq!(session.elapsed_seconds, 90);
        assert_eq!(session.start_time, t0());

        let rows = store.list_sessions("local", &SessionQuery::all()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn commit_closes_reports_failures_without_stopping() {
        let store = MemoryStore::new();
        let mut recorder = SessionRecorder::new(store.clone(), "local");

        recorder.open_session(None, t0()).await.unwrap();
        recorder.accumulate(10);
        let first = recorder.close_session(None, t0() + Duration::minutes(1)).unwrap();

        store.set_offline(true);
        let report = commit_closes(vec![first]).await;
        assert!(report.closed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.events[0], Event::PersistenceWarning { .. }));

        store.set_offline(false);
        let report = commit_closes(report.failed).await;
        assert_eq!(report.closed.len(), 1);
        assert!(matches!(
            report.events[0],
            Event::SessionClosed { elapsed_secs: 10, .. }
        ));
    }

    #[tokio::test]
    async fn failed_close_survives_a_restart_as_a_record() {
        let store = MemoryStore::new();
        let mut recorder = SessionRecorder::new(store.clone(), "local");
        recorder.open_session(Some("art".into()), t0()).await.unwrap();
        recorder.accumulate(600);

        store.set_offline(true);
        let mut close = recorder.close_session(None, t0() + Duration::minutes(10)).unwrap();
        assert!(close.commit().await.is_err());

        let json = serde_json::to_string(&close.to_record()).unwrap();
        drop(close);
        let record: PendingCloseRecord = serde_json::from_str(&json).unwrap();

        store.set_offline(false);
        let fresh = SessionRecorder::new(store.clone(), "local");
        let session = fresh.resume_close(record).commit().await.unwrap();
        assert_eq!(session.elapsed_seconds, 600);
        assert_eq!(session.subject_id.as_deref(), Some("art"));

        let rows = store.list_sessions("local", &SessionQuery::all()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_closed());
    }
}
