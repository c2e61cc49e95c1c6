mod engine;
mod phase;

pub use engine::{Completion, TickOutcome, TimerEngine, TimerState, TimerStatus};
pub use phase::{Phase, PhasePolicy, TimerPreferences};
