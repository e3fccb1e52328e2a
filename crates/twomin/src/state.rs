//! Timer state types
//!
//! [`TimerState`] is the machine's private bookkeeping. [`TimerView`] is the
//! read-only projection handed to whoever renders the timer, and
//! [`PersistedTimer`] is what survives a restart.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::clock::{delta_secs, from_epoch_seconds, secs_delta, to_epoch_seconds};

/// Phase of the timer/stopwatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Nothing running, full budget available
    #[default]
    Idle,
    /// Countdown in progress
    CountingDown,
    /// Countdown paused part-way
    Paused,
    /// Countdown just ran out; immediately becomes `RunningStopwatch`
    Completed,
    /// Counting up past the budget
    RunningStopwatch,
    /// Stopwatch paused, waiting to resume, save or discard
    StopwatchPaused,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::CountingDown => "counting-down",
            Phase::Paused => "paused",
            Phase::Completed => "completed",
            Phase::RunningStopwatch => "stopwatch",
            Phase::StopwatchPaused => "stopwatch-paused",
        }
    }

    /// Phases that need a periodic tick
    pub fn is_ticking(&self) -> bool {
        matches!(self, Phase::CountingDown | Phase::RunningStopwatch)
    }

    /// Phases where a session can be saved or discarded
    pub fn is_stopwatch(&self) -> bool {
        matches!(self, Phase::RunningStopwatch | Phase::StopwatchPaused)
    }
}

/// A phase change, reported by every intent and tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionEvent {
    pub from: Phase,
    pub to: Phase,
}

/// Read-only snapshot of the timer for presentation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub phase: Phase,
    /// Whole seconds left on the countdown, rounded up
    pub remaining_seconds: u64,
    /// Stopwatch reading (seconds)
    pub elapsed_seconds: f64,
    pub budget_seconds: u64,
}

impl TimerView {
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_seconds.max(0.0))
    }

    /// Fraction of the budget still left (1.0 when idle, 0.0 in the stopwatch)
    pub fn progress(&self) -> f64 {
        if self.budget_seconds == 0 {
            return 0.0;
        }
        self.remaining_seconds as f64 / self.budget_seconds as f64
    }
}

/// Internal timer bookkeeping
///
/// `anchor` is the countdown start in `CountingDown` and the stopwatch start
/// in `RunningStopwatch`. Both paused phases keep `paused_elapsed` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerState {
    pub phase: Phase,
    pub budget: TimeDelta,
    pub anchor: Option<DateTime<Utc>>,
    pub paused_elapsed: Option<TimeDelta>,
    pub remaining_seconds: u64,
    pub elapsed: TimeDelta,
}

impl TimerState {
    pub fn idle(budget: TimeDelta) -> Self {
        Self {
            phase: Phase::Idle,
            budget,
            anchor: None,
            paused_elapsed: None,
            remaining_seconds: ceil_secs(budget),
            elapsed: TimeDelta::zero(),
        }
    }

    /// Time spent in the current countdown or stopwatch run
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> TimeDelta {
        match (self.phase, self.anchor, self.paused_elapsed) {
            (Phase::CountingDown | Phase::RunningStopwatch, Some(anchor), _) => {
                (now - anchor).max(TimeDelta::zero())
            }
            (Phase::Paused | Phase::StopwatchPaused, _, Some(paused)) => paused,
            _ => TimeDelta::zero(),
        }
    }

    /// The instant the countdown runs out, if one is in progress
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match (self.phase, self.anchor) {
            (Phase::CountingDown, Some(anchor)) => anchor.checked_add_signed(self.budget),
            _ => None,
        }
    }

    /// Rederive remaining/elapsed from the anchor
    ///
    /// Returns true when a countdown has reached its budget.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> bool {
        let elapsed = self.elapsed_at(now);
        match self.phase {
            Phase::CountingDown | Phase::Paused => {
                let left = (self.budget - elapsed).max(TimeDelta::zero());
                self.remaining_seconds = ceil_secs(left);
                self.elapsed = TimeDelta::zero();
                self.phase == Phase::CountingDown && elapsed >= self.budget
            }
            Phase::RunningStopwatch | Phase::StopwatchPaused => {
                self.remaining_seconds = 0;
                self.elapsed = elapsed;
                false
            }
            Phase::Idle => {
                self.remaining_seconds = ceil_secs(self.budget);
                self.elapsed = TimeDelta::zero();
                false
            }
            Phase::Completed => {
                self.remaining_seconds = 0;
                false
            }
        }
    }

    pub fn view(&self) -> TimerView {
        TimerView {
            phase: self.phase,
            remaining_seconds: self.remaining_seconds,
            elapsed_seconds: delta_secs(self.elapsed),
            budget_seconds: ceil_secs(self.budget),
        }
    }

    pub fn to_persisted(&self) -> PersistedTimer {
        let anchor = self.anchor.map(to_epoch_seconds);
        PersistedTimer {
            phase: self.phase,
            last_countdown_anchor_epoch_seconds: if self.phase == Phase::CountingDown {
                anchor
            } else {
                None
            },
            stopwatch_anchor_epoch_seconds: if self.phase == Phase::RunningStopwatch {
                anchor
            } else {
                None
            },
            paused_elapsed_seconds: self.paused_elapsed.map(delta_secs),
        }
    }

    /// Rebuild from a persisted record; inconsistent records restore as idle
    pub fn from_persisted(record: &PersistedTimer, budget: TimeDelta) -> Self {
        let mut state = Self::idle(budget);
        let countdown_anchor = record
            .last_countdown_anchor_epoch_seconds
            .and_then(from_epoch_seconds);
        let stopwatch_anchor = record
            .stopwatch_anchor_epoch_seconds
            .and_then(from_epoch_seconds);
        let paused = record.paused_elapsed_seconds.map(secs_delta);

        match (record.phase, countdown_anchor, stopwatch_anchor, paused) {
            (Phase::Idle, _, _, _) => {}
            (Phase::CountingDown, Some(anchor), _, _) => {
                state.phase = Phase::CountingDown;
                state.anchor = Some(anchor);
            }
            (Phase::Paused, _, _, Some(paused)) if paused < budget => {
                state.phase = Phase::Paused;
                state.paused_elapsed = Some(paused);
            }
            (Phase::RunningStopwatch | Phase::Completed, _, Some(anchor), _) => {
                state.phase = Phase::RunningStopwatch;
                state.anchor = Some(anchor);
            }
            (Phase::StopwatchPaused, _, _, Some(paused)) => {
                state.phase = Phase::StopwatchPaused;
                state.paused_elapsed = Some(paused);
            }
            (phase, ..) => {
                warn!(phase = phase.as_str(), "inconsistent persisted timer, starting idle");
            }
        }

        state
    }
}

/// Timer record kept in the key-value store under `timer`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimer {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_countdown_anchor_epoch_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopwatch_anchor_epoch_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_elapsed_seconds: Option<f64>,
}

/// Whole seconds in `delta`, rounded up
fn ceil_secs(delta: TimeDelta) -> u64 {
    let millis = delta.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    }
}
