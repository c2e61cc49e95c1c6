use std::future::Future;

use super::model::{NewSession, Session, SessionId, SessionQuery, SessionUpdate};
use crate::error::PersistenceError;

/// The persisted record store for sessions.
///
/// Implementations are cheap handles (`Clone`) onto shared storage so a
/// pending close can carry its own copy while the engine keeps ticking.
pub trait SessionStore: Clone + Send + Sync + 'static {
    fn create_session(
        &self,
        new: NewSession,
    ) -> impl Future<Output = Result<SessionId, PersistenceError>> + Send;

    fn update_session(
        &self,
        id: &SessionId,
        update: SessionUpdate,
    ) -> impl Future<Output = Result<Session, PersistenceError>> + Send;

    fn list_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> impl Future<Output = Result<Vec<Session>, PersistenceError>> + Send;
}
