//! Focus session records
//!
//! A [`FocusSession`] is written once, when the user accepts a finished
//! interval, and never changes afterwards.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{delta_secs, from_epoch_seconds, to_epoch_seconds};

/// A completed focus session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    /// When the session was recorded (Unix timestamp, fractional seconds)
    pub timestamp_epoch_seconds: f64,
    /// Time spent focused (seconds)
    pub duration_seconds: f64,
}

impl FocusSession {
    /// Create a session recorded at `timestamp`
    pub fn new(timestamp: DateTime<Utc>, duration: TimeDelta) -> Self {
        Self {
            timestamp_epoch_seconds: to_epoch_seconds(timestamp),
            duration_seconds: delta_secs(duration).max(0.0),
        }
    }

    /// Get the timestamp as a DateTime
    pub fn timestamp(&self) -> DateTime<Utc> {
        from_epoch_seconds(self.timestamp_epoch_seconds).unwrap_or_default()
    }

    /// Whether the session was recorded strictly before `cutoff`
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.timestamp() < cutoff
    }
}
