mod model;
mod recorder;
mod store;

pub use model::{DateRange, NewSession, Session, SessionId, SessionQuery, SessionUpdate};
pub(crate) use recorder::persistence_warning;
pub use recorder::{
    commit_closes, CloseReport, OpenSession, PendingClose, PendingCloseRecord, SessionRecorder,
};
pub use store::SessionStore;
