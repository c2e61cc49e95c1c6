//! The focus engine: timer and session recorder driven as one unit.
//!
//! The host calls [`FocusEngine::tick`] about once a second. Focus seconds
//! flow into the open session on every tick; when a focus phase ends (by
//! completion, switch or skip) its session is detached as a [`PendingClose`]
//! that the host commits whenever it likes, without holding up ticking.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::events::Event;
use crate::session::{
    commit_closes, persistence_warning, OpenSession, PendingClose, PendingCloseRecord,
    SessionRecorder, SessionStore,
};
use crate::timer::{Phase, TickOutcome, TimerEngine, TimerPreferences, TimerState};

/// Everything needed to rebuild a [`FocusEngine`] in a later process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub timer: TimerState,
    #[serde(default)]
    pub open_session: Option<OpenSession>,
    #[serde(default)]
    pub completed_focus: u32,
    #[serde(default)]
    pub subject_id: Option<String>,
    /// Closes whose write had not landed when the snapshot was taken.
    #[serde(default)]
    pub pending_closes: Vec<PendingCloseRecord>,
}

pub struct FocusEngine<S, C = SystemClock> {
    timer: TimerEngine<C>,
    recorder: SessionRecorder<S>,
    prefs: TimerPreferences,
    /// Preferences received while running, applied when the timer stops.
    pending_prefs: Option<TimerPreferences>,
    completed_focus: u32,
    subject_id: Option<String>,
    completions: VecDeque<Event>,
    closes: Vec<PendingClose<S>>,
}

impl<S: SessionStore, C: Clock> FocusEngine<S, C> {
    pub fn new(clock: C, store: S, user_id: impl Into<String>, prefs: TimerPreferences) -> Self {
        Self {
            timer: TimerEngine::new(clock, &prefs),
            recorder: SessionRecorder::new(store, user_id),
            prefs,
            pending_prefs: None,
            completed_focus: 0,
            subject_id: None,
            completions: VecDeque::new(),
            closes: Vec::new(),
        }
    }

    /// Restore an engine saved with [`FocusEngine::to_snapshot`].
    ///
    /// A snapshot taken while running keeps running: the next tick consumes
    /// the wall-clock time that passed in between. Closes that had not been
    /// committed are queued again.
    pub fn from_snapshot(
        clock: C,
        store: S,
        user_id: impl Into<String>,
        prefs: TimerPreferences,
        snapshot: EngineSnapshot,
    ) -> Self {
        let recorder = SessionRecorder::with_open(store, user_id, snapshot.open_session);
        let closes = snapshot
            .pending_closes
            .into_iter()
            .map(|record| recorder.resume_close(record))
            .collect();
        Self {
            timer: TimerEngine::from_state(clock, snapshot.timer),
            recorder,
            prefs,
            pending_prefs: None,
            completed_focus: snapshot.completed_focus,
            subject_id: snapshot.subject_id,
            completions: VecDeque::new(),
            closes,
        }
    }

    pub fn to_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            timer: self.timer.state().clone(),
            open_session: self.recorder.current().cloned(),
            completed_focus: self.completed_focus,
            subject_id: self.subject_id.clone(),
            pending_closes: self.closes.iter().map(PendingClose::to_record).collect(),
        }
    }

    pub fn state(&self) -> &TimerState {
        self.timer.state()
    }

    pub fn timer(&self) -> &TimerEngine<C> {
        &self.timer
    }

    pub fn recorder(&self) -> &SessionRecorder<S> {
        &self.recorder
    }

    pub fn open_session(&self) -> Option<&OpenSession> {
        self.recorder.current()
    }

    pub fn completed_focus_count(&self) -> u32 {
        self.completed_focus
    }

    pub fn preferences(&self) -> &TimerPreferences {
        &self.prefs
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Subject attached to the next session opened.
    pub fn bind_subject(&mut self, subject_id: Option<String>) {
        self.subject_id = subject_id;
    }

    /// Start or resume the countdown.
    ///
    /// Entering a focus phase with no open session opens one. If the store
    /// is unreachable the session is kept in memory and a
    /// [`Event::PersistenceWarning`] is returned alongside the start.
    pub async fn start(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let Some(started) = self.timer.start() else {
            return events;
        };
        events.push(started);

        if !self.timer.phase().is_focus() || self.recorder.has_open_session() {
            return events;
        }

        let now = self.timer.now();
        match self.recorder.open_session(self.subject_id.clone(), now).await {
            Ok(id) => events.push(Event::SessionOpened {
                session_id: Some(id.to_string()),
                subject_id: self.subject_id.clone(),
                at: now,
            }),
            Err(err) if err.is_persistence() => {
                events.push(Event::SessionOpened {
                    session_id: None,
                    subject_id: self.subject_id.clone(),
                    at: now,
                });
                events.push(persistence_warning(&err, now));
            }
            Err(err) => warn!(error = %err, "session open absorbed"),
        }
        events
    }

    /// Pause, keeping the open session. Elapsed time up to now is counted first.
    pub fn pause(&mut self) -> Option<Event> {
        self.tick();
        let event = self.timer.pause();
        if event.is_some() {
            self.apply_pending_prefs();
        }
        event
    }

    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.timer.tick();
        self.absorb(outcome);
        outcome
    }

    fn absorb(&mut self, outcome: TickOutcome) {
        let focus = outcome.focus_seconds();
        if focus > 0 {
            self.recorder.accumulate(focus);
            debug!(focus, "focus seconds accumulated");
        }

        let Some(completion) = outcome.completed else {
            return;
        };
        if completion.phase.is_focus() {
            self.completed_focus += 1;
            self.close_open_session(completion.at);
        }
        info!(phase = %completion.phase, completed_focus = self.completed_focus, "phase complete");
        self.completions.push_back(Event::TimerCompleted {
            phase: completion.phase,
            at: completion.at,
        });
        self.apply_pending_prefs();
    }

    /// Count time up to now, then stop the countdown.
    fn flush_and_stop(&mut self) {
        self.tick();
        self.timer.pause();
    }

    fn close_open_session(&mut self, at: DateTime<Utc>) {
        if !self.recorder.has_open_session() {
            return;
        }
        if let Some(close) = self.recorder.close_session(None, at) {
            self.closes.push(close);
        }
    }

    /// Move to `phase` with its configured duration.
    pub fn switch_phase(&mut self, phase: Phase) -> Event {
        self.flush_and_stop();
        self.apply_pending_prefs();
        let duration = self.prefs.duration_for(phase);
        self.switch_stopped(phase, duration, false)
    }

    /// Move to `phase` with an explicit duration, closing any open session
    /// with the time focused so far. Does not count as a completion.
    /// A zero duration falls back to the configured one.
    pub fn switch_phase_with(&mut self, phase: Phase, duration: u64) -> Event {
        self.flush_and_stop();
        self.apply_pending_prefs();
        let duration = match duration {
            0 => self.prefs.duration_for(phase),
            d => d,
        };
        self.switch_stopped(phase, duration, false)
    }

    /// End the current phase early and move on as if it had completed.
    ///
    /// A skipped focus phase counts toward the long-break interval and its
    /// partial session is finalized.
    pub fn skip(&mut self) -> Event {
        self.flush_and_stop();
        let ended = self.timer.phase();
        // A flush that reached zero was already counted as a completion.
        if ended.is_focus() && self.timer.remaining_seconds() > 0 {
            self.completed_focus += 1;
        }
        self.apply_pending_prefs();
        let next = self.prefs.policy().next_phase(ended, self.completed_focus);
        let duration = self.prefs.duration_for(next);
        info!(from = %ended, to = %next, "phase skipped");
        self.switch_stopped(next, duration, true)
    }

    /// After a completion, switch to the phase the policy picks.
    ///
    /// Returns `None` unless the timer is stopped at zero.
    pub fn advance(&mut self) -> Option<Event> {
        if self.timer.is_running() || self.timer.remaining_seconds() > 0 {
            return None;
        }
        let ended = self.timer.phase();
        self.apply_pending_prefs();
        let next = self.prefs.policy().next_phase(ended, self.completed_focus);
        let duration = self.prefs.duration_for(next);
        Some(self.switch_stopped(next, duration, false))
    }

    fn switch_stopped(&mut self, phase: Phase, duration: u64, skipped: bool) -> Event {
        self.close_open_session(self.timer.now());
        let mut event = self.timer.switch_phase(phase, duration);
        if let Event::PhaseSwitched { skipped: flag, .. } = &mut event {
            *flag = skipped;
        }
        event
    }

    /// Reset the countdown of the current phase. Ignored while running and
    /// for a zero duration, which would leave a phase that can never complete.
    ///
    /// `None` restores the configured duration for the phase.
    pub fn reset_timer(&mut self, duration: Option<u64>) -> Option<Event> {
        let duration = duration.unwrap_or_else(|| self.prefs.duration_for(self.timer.phase()));
        if duration == 0 {
            debug!("reset to zero ignored");
            return None;
        }
        self.timer.reset_timer(duration)
    }

    /// Take new preferences. Returns true if they took effect immediately.
    ///
    /// While running they are held until the timer next stops. When idle, a
    /// countdown that has not been touched picks up the new duration.
    pub fn apply_preferences(&mut self, prefs: TimerPreferences) -> bool {
        if self.timer.is_running() {
            debug!("preferences deferred until the timer stops");
            self.pending_prefs = Some(prefs);
            return false;
        }
        self.pending_prefs = None;
        self.install_prefs(prefs);
        true
    }

    fn apply_pending_prefs(&mut self) {
        if let Some(prefs) = self.pending_prefs.take() {
            self.install_prefs(prefs);
        }
    }

    fn install_prefs(&mut self, prefs: TimerPreferences) {
        let state = self.timer.state();
        let untouched =
            state.remaining_seconds > 0 && state.remaining_seconds == state.phase_duration_seconds;
        let phase = state.phase;
        self.prefs = prefs;
        if untouched && !self.timer.is_running() {
            self.timer.reset_timer(self.prefs.duration_for(phase));
        }
    }

    /// Completion events since the last drain, oldest first.
    pub fn drain_completions(&mut self) -> Vec<Event> {
        self.completions.drain(..).collect()
    }

    /// Closes waiting to be committed. Commit them with [`commit_closes`].
    pub fn drain_closes(&mut self) -> Vec<PendingClose<S>> {
        std::mem::take(&mut self.closes)
    }

    /// Hand back closes whose commit failed, for a later retry.
    pub fn requeue_closes(&mut self, failed: Vec<PendingClose<S>>) {
        self.closes.extend(failed);
    }

    pub fn pending_close_count(&self) -> usize {
        self.closes.len()
    }

    /// Commit every pending close now, keeping failures for the next call.
    pub async fn settle(&mut self) -> Vec<Event> {
        let report = commit_closes(self.drain_closes()).await;
        self.requeue_closes(report.failed);
        report.events
    }

    pub fn snapshot(&self) -> Event {
        let state = self.timer.state();
        let open = self.recorder.current();
        Event::StateSnapshot {
            status: state.status(),
            phase: state.phase,
            remaining_secs: state.remaining_seconds,
            total_secs: state.phase_duration_seconds,
            progress: self.timer.progress(),
            accumulated_focus_secs: state.accumulated_focus_seconds,
            completed_focus: self.completed_focus,
            open_session_id: open.and_then(|s| s.id.as_ref()).map(|id| id.to_string()),
            open_session_elapsed_secs: open.map(|s| s.elapsed_seconds),
            at: self.timer.now(),
        }
    }
}
