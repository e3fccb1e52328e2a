//! Timer/stopwatch state machine
//!
//! Intents (`toggle`, `reset`, `save_focus_session`, `discard`) and ticks all
//! funnel through one owner. Remaining and elapsed time are rederived from
//! the stored anchor on every call, so ticks can arrive late, or not at all
//! while the process is suspended, without losing time.
//!
//! Transitions:
//!   Idle --toggle--> CountingDown --toggle--> Paused --toggle--> CountingDown
//!   CountingDown --budget reached--> Completed --> RunningStopwatch
//!   RunningStopwatch <--toggle--> StopwatchPaused
//!   RunningStopwatch | StopwatchPaused --save / discard--> Idle
//!   any --reset--> Idle

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use twomin_core::config::{MAX_BUDGET_SECS, MAX_RETENTION_HOURS};
use twomin_core::Config;

use crate::clock::Clock;
use crate::notify::{Notifier, ScheduledNotification};
use crate::session::FocusSession;
use crate::state::{PersistedTimer, Phase, TimerState, TimerView, TransitionEvent};
use crate::stats::{SessionStats, StatisticsSnapshot};
use crate::store::{load_or_default, to_value, KeyValueStore};

/// Identifier of the deferred completion alert
pub const NOTIFICATION_ID: &str = "timerComplete";

/// Store key for the persisted timer record
pub const TIMER_KEY: &str = "timer";

/// Settings the machine needs from [`Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSettings {
    pub budget: TimeDelta,
    pub retention: TimeDelta,
    pub count_countdown_in_session: bool,
    pub notification_title: String,
    pub notification_body: String,
    pub notification_sound: bool,
}

impl TimerSettings {
    /// Out-of-range durations fall back to the defaults
    pub fn from_config(config: &Config) -> Self {
        let budget = i64::try_from(config.budget_secs.clamp(1, MAX_BUDGET_SECS))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or_else(default_budget);
        let retention = i64::try_from(config.retention_hours.clamp(1, MAX_RETENTION_HOURS))
            .ok()
            .and_then(TimeDelta::try_hours)
            .unwrap_or_else(default_retention);

        Self {
            budget,
            retention,
            count_countdown_in_session: config.count_countdown_in_session,
            notification_title: config.notification_title.clone(),
            notification_body: config.notification_body.clone(),
            notification_sound: config.notification_sound,
        }
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn default_budget() -> TimeDelta {
    TimeDelta::seconds(120)
}

fn default_retention() -> TimeDelta {
    TimeDelta::hours(24)
}

/// The focus timer
pub struct TimerMachine {
    settings: TimerSettings,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
    stats: SessionStats,
    notifier: Box<dyn Notifier>,
    state: TimerState,
    view_tx: watch::Sender<TimerView>,
}

impl TimerMachine {
    /// A fresh, idle machine; any persisted timer record is ignored
    pub fn new(
        settings: TimerSettings,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let stats = SessionStats::open(store.clone(), clock.clone(), settings.retention);
        let state = TimerState::idle(settings.budget);
        let (view_tx, _) = watch::channel(state.view());

        Self {
            settings,
            clock,
            store,
            stats,
            notifier,
            state,
            view_tx,
        }
    }

    /// Rebuild the machine from the persisted timer record and catch up
    ///
    /// A countdown that ran out while the process was gone completes now,
    /// with the stopwatch starting at the real deadline.
    pub fn restore(
        settings: TimerSettings,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let mut machine = Self::new(settings, clock, store, notifier);
        let record: PersistedTimer = load_or_default(machine.store.as_ref(), TIMER_KEY);
        machine.state = TimerState::from_persisted(&record, machine.settings.budget);

        let now = machine.clock.now();
        let mut events = Vec::new();
        machine.catch_up(now, &mut events);

        if machine.state.phase == Phase::CountingDown {
            machine.schedule_alert();
        }

        debug!(phase = machine.state.phase.as_str(), "restored timer");
        machine.commit(&events);
        machine
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    /// Current reading, recomputed against the clock without mutating state
    pub fn view(&self) -> TimerView {
        let mut state = self.state.clone();
        state.recompute(self.clock.now());
        state.view()
    }

    /// Observe every published view
    pub fn subscribe(&self) -> watch::Receiver<TimerView> {
        self.view_tx.subscribe()
    }

    /// Whether the periodic tick should be running
    pub fn is_ticking(&self) -> bool {
        self.state.phase.is_ticking()
    }

    /// Start, pause or resume depending on the current phase
    pub fn toggle(&mut self) -> Vec<TransitionEvent> {
        let now = self.clock.now();
        let mut events = Vec::new();
        self.catch_up(now, &mut events);

        match self.state.phase {
            Phase::Idle => self.start_countdown(now, TimeDelta::zero(), &mut events),
            Phase::Paused => {
                let offset = self.state.paused_elapsed.unwrap_or_else(TimeDelta::zero);
                self.start_countdown(now, offset, &mut events);
            }
            Phase::CountingDown => self.pause_countdown(now, &mut events),
            Phase::RunningStopwatch => self.pause_stopwatch(now, &mut events),
            Phase::StopwatchPaused => self.resume_stopwatch(now, &mut events),
            Phase::Completed => self.start_stopwatch(now, now, &mut events),
        }

        self.commit(&events);
        events
    }

    /// Recompute from the anchor; completes the countdown once its budget is spent
    pub fn tick(&mut self) -> Vec<TransitionEvent> {
        let now = self.clock.now();
        let mut events = Vec::new();
        self.catch_up(now, &mut events);

        if events.is_empty() {
            self.publish();
        } else {
            self.commit(&events);
        }
        events
    }

    /// Back to idle from anywhere; cancels the pending alert
    pub fn reset(&mut self) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        self.notifier.cancel(NOTIFICATION_ID);

        let from = self.state.phase;
        self.state = TimerState::idle(self.settings.budget);
        if from != Phase::Idle {
            self.transition(from, Phase::Idle, &mut events);
        }

        self.commit(&events);
        events
    }

    /// Throw away the stopwatch reading; same as [`reset`](Self::reset)
    pub fn discard(&mut self) -> Vec<TransitionEvent> {
        self.reset()
    }

    /// Record the stopwatch reading as a focus session and reset
    ///
    /// Outside the stopwatch phases nothing is recorded and the session is
    /// `None`. The events include any completion caught up on the way.
    pub fn save_focus_session(&mut self) -> (Option<FocusSession>, Vec<TransitionEvent>) {
        let now = self.clock.now();
        let mut events = Vec::new();
        self.catch_up(now, &mut events);

        if !self.state.phase.is_stopwatch() {
            debug!(phase = self.state.phase.as_str(), "nothing to save");
            self.commit(&events);
            return (None, events);
        }

        let mut duration = self.state.elapsed_at(now);
        if self.settings.count_countdown_in_session {
            duration = duration
                .checked_add(&self.settings.budget)
                .unwrap_or(duration);
        }

        let session = self.stats.record_session(duration);
        events.extend(self.reset());
        (Some(session), events)
    }

    /// Statistics snapshot, pruned first
    pub fn statistics(&mut self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn catch_up(&mut self, now: DateTime<Utc>, events: &mut Vec<TransitionEvent>) {
        if self.state.recompute(now) {
            self.complete(now, events);
        }
    }

    fn start_countdown(
        &mut self,
        now: DateTime<Utc>,
        offset: TimeDelta,
        events: &mut Vec<TransitionEvent>,
    ) {
        let from = self.state.phase;
        self.state.phase = Phase::CountingDown;
        self.state.anchor = Some(now - offset);
        self.state.paused_elapsed = None;
        self.transition(from, Phase::CountingDown, events);

        if self.state.recompute(now) {
            self.complete(now, events);
        } else {
            self.schedule_alert();
        }
    }

    fn pause_countdown(&mut self, now: DateTime<Utc>, events: &mut Vec<TransitionEvent>) {
        self.notifier.cancel(NOTIFICATION_ID);

        self.state.paused_elapsed = Some(self.state.elapsed_at(now));
        self.state.anchor = None;
        self.state.phase = Phase::Paused;
        self.state.recompute(now);
        self.transition(Phase::CountingDown, Phase::Paused, events);
    }

    fn complete(&mut self, now: DateTime<Utc>, events: &mut Vec<TransitionEvent>) {
        let deadline = self.state.deadline().unwrap_or(now);

        self.notifier.cancel(NOTIFICATION_ID);
        self.state.phase = Phase::Completed;
        self.transition(Phase::CountingDown, Phase::Completed, events);
        self.notifier.success();

        self.start_stopwatch(now, deadline, events);
    }

    fn start_stopwatch(
        &mut self,
        now: DateTime<Utc>,
        anchor: DateTime<Utc>,
        events: &mut Vec<TransitionEvent>,
    ) {
        self.state.phase = Phase::RunningStopwatch;
        self.state.anchor = Some(anchor);
        self.state.paused_elapsed = None;
        self.state.recompute(now);
        self.transition(Phase::Completed, Phase::RunningStopwatch, events);
    }

    fn pause_stopwatch(&mut self, now: DateTime<Utc>, events: &mut Vec<TransitionEvent>) {
        self.state.paused_elapsed = Some(self.state.elapsed_at(now));
        self.state.anchor = None;
        self.state.phase = Phase::StopwatchPaused;
        self.state.recompute(now);
        self.transition(Phase::RunningStopwatch, Phase::StopwatchPaused, events);
    }

    fn resume_stopwatch(&mut self, now: DateTime<Utc>, events: &mut Vec<TransitionEvent>) {
        let offset = self.state.paused_elapsed.unwrap_or_else(TimeDelta::zero);
        self.state.phase = Phase::RunningStopwatch;
        self.state.anchor = Some(now - offset);
        self.state.paused_elapsed = None;
        self.state.recompute(now);
        self.transition(Phase::StopwatchPaused, Phase::RunningStopwatch, events);
    }

    fn schedule_alert(&mut self) {
        let Some(deadline) = self.state.deadline() else {
            return;
        };
        let fire_after = (deadline - self.clock.now())
            .max(TimeDelta::zero())
            .to_std()
            .unwrap_or_default();

        let alert = ScheduledNotification {
            identifier: NOTIFICATION_ID.to_string(),
            fire_after,
            title: self.settings.notification_title.clone(),
            body: self.settings.notification_body.clone(),
            sound: self.settings.notification_sound,
        };

        // A missing alert only costs the background reminder
        if let Err(e) = self.notifier.schedule(alert) {
            warn!(error = %e, "failed to schedule completion alert");
        }
    }

    fn transition(&self, from: Phase, to: Phase, events: &mut Vec<TransitionEvent>) {
        info!(from = from.as_str(), to = to.as_str(), "timer transition");
        events.push(TransitionEvent { from, to });
    }

    /// Persist after a phase change, then publish
    fn commit(&mut self, events: &[TransitionEvent]) {
        if !events.is_empty() {
            self.persist();
        }
        self.publish();
    }

    fn persist(&self) {
        let record = self.state.to_persisted();
        match to_value(&record) {
            Ok(value) => {
                if let Err(e) = self.store.set(TIMER_KEY, value) {
                    warn!(error = %e, "failed to persist timer");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize timer"),
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.state.view());
    }
}
