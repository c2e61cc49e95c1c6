use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::timer::Phase;

/// Opaque session identifier. New sessions get a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted focus session.
///
/// `elapsed_seconds` is the sum of ticked seconds while running, so it is
/// usually shorter than `end_time - start_time` when the session was paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub phase_kind: Phase,
    /// Self-rated focus quality recorded at close.
    #[serde(default)]
    pub focus_score: Option<u8>,
}

impl Session {
    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Instant used for day/hour bucketing: the end time, or the start time
    /// for sessions that never closed.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.start_time)
    }
}

/// Fields for `create_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: String,
    pub subject_id: Option<String>,
    pub phase_kind: Phase,
    pub start_time: DateTime<Utc>,
}

/// Fields for `update_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    pub end_time: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub focus_score: Option<u8>,
}

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Filter for `list_sessions`. Ranges match on [`Session::reference_time`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionQuery {
    pub range: Option<DateRange>,
    pub phase_kind: Option<Phase>,
}

impl SessionQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn focus() -> Self {
        Self {
            range: None,
            phase_kind: Some(Phase::Focus),
        }
    }

    pub fn in_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        if let Some(kind) = self.phase_kind {
            if session.phase_kind != kind {
                return false;
            }
        }
        match self.range {
            Some(range) => range.contains(session.reference_time()),
            None => true,
        }
    }
}
