//! Wall-clock source
//!
//! Everything that needs "now" asks a [`Clock`], so tests can move time
//! forward without sleeping.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at a fixed, arbitrary instant
    pub fn at_epoch_seconds(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(TimeDelta::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/// Seconds since the Unix epoch, millisecond precision
pub fn to_epoch_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_millis() as f64 / 1000.0
}

/// Inverse of [`to_epoch_seconds`]; `None` for non-finite or out-of-range input
pub fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

/// A `TimeDelta` as fractional seconds
pub fn delta_secs(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

/// Fractional seconds as a `TimeDelta`, clamped at zero
pub fn secs_delta(secs: f64) -> TimeDelta {
    if !secs.is_finite() || secs <= 0.0 {
        return TimeDelta::zero();
    }
    TimeDelta::milliseconds((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_epoch_seconds(1_000);
        clock.advance_secs(30);
        assert_eq!(clock.now().timestamp(), 1_030);

        clock.set(DateTime::from_timestamp(5, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 5);
    }

    #[test]
    fn test_epoch_seconds_roundtrip_keeps_millis() {
        let instant = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let secs = to_epoch_seconds(instant);
        assert_eq!(from_epoch_seconds(secs), Some(instant));
    }

    #[test]
    fn test_from_epoch_seconds_rejects_nan() {
        assert_eq!(from_epoch_seconds(f64::NAN), None);
        assert_eq!(from_epoch_seconds(f64::INFINITY), None);
    }

    #[test]
    fn test_secs_delta_clamps_negative() {
        assert_eq!(secs_delta(-3.0), TimeDelta::zero());
        assert_eq!(secs_delta(1.5), TimeDelta::milliseconds(1500));
        assert_eq!(delta_secs(TimeDelta::milliseconds(2500)), 2.5);
    }
}
