//! # Focusroom Core Library
//!
//! The focus timer engine behind the `focusroom` CLI: a drift-corrected
//! Pomodoro countdown bound to persisted session records, plus the
//! statistics and achievements derived from that history.
//!
//! ## Architecture
//!
//! - **Timer**: A wall-clock-based state machine that requires the caller
//!   to periodically invoke `tick()`; elapsed time is measured, never counted
//! - **Session**: The recorder that owns the single open focus session and
//!   writes it through an async [`SessionStore`]
//! - **Focus**: [`FocusEngine`], which drives the two together
//! - **Stats** / **Achievements**: Pure readers of the closed-session history
//! - **Storage**: SQLite and in-memory stores, TOML configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`FocusEngine`]: Timer plus session recorder
//! - [`SqliteStore`]: Session and achievement persistence
//! - [`Config`]: Application configuration management

pub mod achievements;
pub mod clock;
pub mod error;
pub mod events;
pub mod focus;
pub mod notify;
pub mod session;
pub mod stats;
pub mod storage;
pub mod timer;

pub use achievements::{AchievementEvaluator, AchievementId, AchievementStore, AchievementThresholds};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, ConflictError, CoreError, PersistenceError, ValidationError};
pub use events::Event;
pub use focus::{EngineSnapshot, FocusEngine};
pub use notify::{notice_for, Notice, Notifier, TracingNotifier};
pub use session::{Session, SessionId, SessionQuery, SessionRecorder, SessionStore};
pub use storage::{Config, MemoryStore, SqliteStore};
pub use timer::{Phase, TimerEngine, TimerPreferences, TimerState, TimerStatus};
