//! SQLite-backed record store.
//!
//! Provides persistent storage for:
//! - Focus and break sessions
//! - Achievement unlocks
//! - Key-value store for host state (engine snapshot, last-seen day)
//!
//! Every async call runs its query on the blocking pool so the timer's
//! executor never waits on disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations};
use crate::achievements::{AchievementId, AchievementStore, UnlockRecord};
use crate::error::PersistenceError;
use crate::session::{NewSession, Session, SessionId, SessionQuery, SessionStore, SessionUpdate};
use crate::timer::Phase;

/// Handle onto a single SQLite connection.
///
/// Clones share the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open the database at `<data_dir>/focusroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, PersistenceError> {
        let dir = data_dir().map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        Self::open_path(dir.join("focusroom.db"))
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| PersistenceError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        Self::init(conn, Some(path))
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().map_err(|source| PersistenceError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, PersistenceError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrations::migrate(&conn).map_err(|e| PersistenceError::MigrationFailed(e.to_string()))?;
        tracing::debug!(path = ?path, "opened session database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| PersistenceError::TaskFailed("connection mutex poisoned".into()))?;
        f(&guard)
    }

    async fn run<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f)).await?
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
    }
}

/// Fixed-width UTC form, so stored timestamps sort lexically.
fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(field: &str, value: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PersistenceError::Corrupt {
            field: field.into(),
            value: value.into(),
        })
}

/// SQLite has no boolean type; any non-zero integer reads as true.
pub(crate) fn sql_bool(value: i64) -> bool {
    value != 0
}

struct RawSession {
    id: String,
    user_id: String,
    subject_id: Option<String>,
    phase_kind: String,
    start_time: String,
    end_time: Option<String>,
    elapsed_seconds: i64,
    focus_score: Option<i64>,
}

const SESSION_COLUMNS: &str =
    "id, user_id, subject_id, phase_kind, start_time, end_time, elapsed_seconds, focus_score";

fn read_session_row(row: &Row<'_>) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        phase_kind: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        elapsed_seconds: row.get(6)?,
        focus_score: row.get(7)?,
    })
}

fn row_to_session(raw: RawSession) -> Result<Session, PersistenceError> {
    let phase_kind: Phase = raw.phase_kind.parse().map_err(|_| PersistenceError::Corrupt {
        field: "phase_kind".into(),
        value: raw.phase_kind.clone(),
    })?;
    let elapsed_seconds =
        u64::try_from(raw.elapsed_seconds).map_err(|_| PersistenceError::Corrupt {
            field: "elapsed_seconds".into(),
            value: raw.elapsed_seconds.to_string(),
        })?;
    let focus_score = raw
        .focus_score
        .map(|score| {
            u8::try_from(score).map_err(|_| PersistenceError::Corrupt {
                field: "focus_score".into(),
                value: score.to_string(),
            })
        })
        .transpose()?;
    let end_time = raw
        .end_time
        .as_deref()
        .map(|v| parse_ts("end_time", v))
        .transpose()?;

    Ok(Session {
        id: SessionId::from(raw.id),
        user_id: raw.user_id,
        subject_id: raw.subject_id,
        start_time: parse_ts("start_time", &raw.start_time)?,
        end_time,
        elapsed_seconds,
        phase_kind,
        focus_score,
    })
}

fn fetch_session(conn: &Connection, id: &str) -> Result<Session, PersistenceError> {
    let raw = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            params![id],
            read_session_row,
        )
        .optional()?
        .ok_or_else(|| PersistenceError::NotFound(format!("session {id}")))?;
    row_to_session(raw)
}

impl SessionStore for SqliteStore {
    async fn create_session(&self, new: NewSession) -> Result<SessionId, PersistenceError> {
        let id = SessionId::generate();
        let row_id = id.as_str().to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, subject_id, phase_kind, start_time, elapsed_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    row_id,
                    new.user_id,
                    new.subject_id,
                    new.phase_kind.as_str(),
                    fmt_ts(new.start_time),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn update_session(
        &self,
        id: &SessionId,
        update: SessionUpdate,
    ) -> Result<Session, PersistenceError> {
        let id = id.as_str().to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET end_time = ?2, elapsed_seconds = ?3, focus_score = ?4
                 WHERE id = ?1",
                params![
                    id,
                    fmt_ts(update.end_time),
                    i64::try_from(update.elapsed_seconds).unwrap_or(i64::MAX),
                    update.focus_score,
                ],
            )?;
            if changed == 0 {
                return Err(PersistenceError::NotFound(format!("session {id}")));
            }
            fetch_session(conn, &id)
        })
        .await
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, PersistenceError> {
        let user_id = user_id.to_string();
        let query = query.clone();
        self.run(move |conn| {
            let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1");
            let mut args: Vec<String> = vec![user_id];
            if let Some(phase) = query.phase_kind {
                args.push(phase.as_str().to_string());
                sql.push_str(&format!(" AND phase_kind = ?{}", args.len()));
            }
            if let Some(range) = query.range {
                args.push(fmt_ts(range.start));
                sql.push_str(&format!(
                    " AND COALESCE(end_time, start_time) >= ?{}",
                    args.len()
                ));
                args.push(fmt_ts(range.end));
                sql.push_str(&format!(
                    " AND COALESCE(end_time, start_time) < ?{}",
                    args.len()
                ));
            }
            sql.push_str(" ORDER BY start_time ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), read_session_row)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row_to_session(row?)?);
            }
            Ok(sessions)
        })
        .await
    }
}

impl AchievementStore for SqliteStore {
    async fn unlocked_achievements(&self) -> Result<Vec<UnlockRecord>, PersistenceError> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, unlocked, unlocked_at FROM achievements ORDER BY unlocked_at")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, unlocked, unlocked_at) = row?;
                if !sql_bool(unlocked) {
                    continue;
                }
                let Ok(id) = id.parse::<AchievementId>() else {
                    tracing::warn!(id = %id, "skipping unknown achievement row");
                    continue;
                };
                records.push(UnlockRecord {
                    id,
                    unlocked_at: parse_ts("unlocked_at", &unlocked_at)?,
                });
            }
            Ok(records)
        })
        .await
    }

    async fn record_unlock(
        &self,
        id: AchievementId,
        at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO achievements (id, unlocked, unlocked_at) VALUES (?1, 1, ?2)
                 ON CONFLICT(id) DO UPDATE SET unlocked = 1, unlocked_at = excluded.unlocked_at
                 WHERE achievements.unlocked = 0",
                params![id.as_str(), fmt_ts(at)],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DateRange;
    use chrono::{Duration, TimeZone};

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
    }

    fn focus(start: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id: "local".into(),
            subject_id: Some("math".into()),
            phase_kind: Phase::Focus,
            start_time: start,
        }
    }

    #[tokio::test]
    async fn create_update_and_list() {
        let db = SqliteStore::open_memory().unwrap();
        let id = db.create_session(focus(t(9))).await.unwrap();

        let closed = db
            .update_session(
                &id,
                SessionUpdate {
                    end_time: t(9) + Duration::seconds(1500),
                    elapsed_seconds: 1500,
                    focus_score: Some(4),
                },
            )
            .await
            .unwrap();
        assert_eq!(closed.elapsed_seconds, 1500);
        assert_eq!(closed.subject_id.as_deref(), Some("math"));
        assert_eq!(closed.focus_score, Some(4));
        assert!(closed.is_closed());

        let all = db.list_sessions("local", &SessionQuery::all()).await.unwrap();
        assert_eq!(all, vec![closed]);
        assert!(db
            .list_sessions("someone-else", &SessionQuery::all())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn range_filter_is_half_open_on_reference_time() {
        let db = SqliteStore::open_memory().unwrap();
        for h in [8, 10, 12] {
            let id = db.create_session(focus(t(h) - Duration::minutes(25))).await.unwrap();
            db.update_session(
                &id,
                SessionUpdate {
                    end_time: t(h),
                    elapsed_seconds: 1500,
                    focus_score: None,
                },
            )
            .await
            .unwrap();
        }

        let range = DateRange::new(t(8), t(12)).unwrap();
        let rows = db
            .list_sessions("local", &SessionQuery::focus().in_range(range))
            .await
            .unwrap();
        let ends: Vec<_> = rows.iter().filter_map(|s| s.end_time).collect();
        assert_eq!(ends, vec![t(8), t(10)]);
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found() {
        let db = SqliteStore::open_memory().unwrap();
        let err = db
            .update_session(
                &SessionId::from("nope"),
                SessionUpdate {
                    end_time: t(1),
                    elapsed_seconds: 0,
                    focus_score: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn corrupt_phase_is_reported() {
        let db = SqliteStore::open_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, phase_kind, start_time) VALUES ('x', 'local', 'nap', ?1)",
                params![fmt_ts(t(3))],
            )?;
            Ok(())
        })
        .unwrap();

        let err = db.list_sessions("local", &SessionQuery::all()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { ref field, .. } if field == "phase_kind"));
    }

    #[tokio::test]
    async fn unlocks_normalize_integer_flags() {
        let db = SqliteStore::open_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO achievements VALUES ('streak', 2, '2024-06-01T00:00:00.000Z');
                 INSERT INTO achievements VALUES ('night_owl', 0, '2024-06-01T00:00:00.000Z');
                 INSERT INTO achievements VALUES ('retired_badge', 1, '2024-06-01T00:00:00.000Z');",
            )?;
            Ok(())
        })
        .unwrap();

        let ids: Vec<_> = db
            .unlocked_achievements()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![AchievementId::Streak]);

        db.record_unlock(AchievementId::NightOwl, t(5)).await.unwrap();
        db.record_unlock(AchievementId::Streak, t(6)).await.unwrap();
        let records = db.unlocked_achievements().await.unwrap();
        assert_eq!(records.len(), 2);
        let streak = records.iter().find(|r| r.id == AchievementId::Streak).unwrap();
        assert_eq!(streak.unlocked_at, parse_ts("t", "2024-06-01T00:00:00.000Z").unwrap());
    }

    #[test]
    fn kv_store() {
        let db = SqliteStore::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().as_deref(), Some("hello"));
        db.kv_delete("test").unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
    }

    #[test]
    fn sql_bool_treats_nonzero_as_true() {
        assert!(!sql_bool(0));
        assert!(sql_bool(1));
        assert!(sql_bool(-1));
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.db");
        {
            let db = SqliteStore::open_path(&path).unwrap();
            db.kv_set("k", "v").unwrap();
        }
        let db = SqliteStore::open_path(&path).unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(db.path(), Some(path.as_path()));
    }
}
