//! Focus statistics
//!
//! Keeps the rolling session log and the lifetime accumulators:
//! - Sessions and focused time inside the retention window (24h by default)
//! - Lifetime session count and focused time, never decreasing
//!
//! The log is pruned after every write and before every read, so it never
//! holds more than a day's worth of sessions.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::session::FocusSession;
use crate::store::{entry_or_default, load_or_default, to_value, KeyValueStore};

pub const LIFETIME_TASK_COUNT_KEY: &str = "lifetimeTaskCount";
pub const LIFETIME_FOCUSED_SECONDS_KEY: &str = "lifetimeFocusedSeconds";
pub const SESSION_LOG_KEY: &str = "sessionLog";

/// Aggregated focus statistics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    /// Sessions inside the retention window
    pub last_day_count: u64,
    /// Focused seconds inside the retention window
    pub last_day_duration: f64,
    /// Sessions ever recorded
    pub lifetime_count: u64,
    /// Focused seconds ever recorded
    pub lifetime_duration: f64,
}

impl StatisticsSnapshot {
    /// Mean session length inside the retention window (seconds)
    pub fn average_last_day(&self) -> f64 {
        if self.last_day_count == 0 {
            0.0
        } else {
            self.last_day_duration / self.last_day_count as f64
        }
    }
}

/// Session log plus lifetime counters, backed by a [`KeyValueStore`]
///
/// Every change is a read-modify-write through [`KeyValueStore::update`], so
/// sessions saved by another process sharing the store are never lost.
pub struct SessionStats {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    retention: TimeDelta,
    totals: Totals,
}

impl SessionStats {
    /// Load persisted statistics; unreadable values start from zero
    pub fn open(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, retention: TimeDelta) -> Self {
        let totals = Totals {
            log: load_or_default(store.as_ref(), SESSION_LOG_KEY),
            lifetime_count: load_or_default(store.as_ref(), LIFETIME_TASK_COUNT_KEY),
            lifetime_seconds: load_or_default(store.as_ref(), LIFETIME_FOCUSED_SECONDS_KEY),
        }
        .sanitized();

        debug!(
            sessions = totals.log.len(),
            lifetime_count = totals.lifetime_count,
            lifetime_seconds = totals.lifetime_seconds,
            "loaded focus statistics"
        );

        Self {
            store,
            clock,
            retention,
            totals,
        }
    }

    /// Append a session recorded now and bump the lifetime counters
    pub fn record_session(&mut self, duration: TimeDelta) -> FocusSession {
        let session = FocusSession::new(self.clock.now(), duration);
        let cutoff = self.cutoff();

        self.modify(|totals| {
            totals.log.push(session);
            totals.lifetime_count += 1;
            totals.lifetime_seconds += session.duration_seconds;
            totals.prune(cutoff);
            true
        });

        info!(
            duration_seconds = session.duration_seconds,
            lifetime_count = self.totals.lifetime_count,
            "recorded focus session"
        );
        session
    }

    /// Drop sessions older than the retention window; returns how many went
    pub fn prune(&mut self) -> usize {
        let cutoff = self.cutoff();
        let mut removed = 0;
        self.modify(|totals| {
            removed = totals.prune(cutoff);
            removed > 0
        });

        if removed > 0 {
            debug!(removed, "pruned expired focus sessions");
        }
        removed
    }

    /// Current aggregates, pruned first
    pub fn snapshot(&mut self) -> StatisticsSnapshot {
        self.prune();

        let totals = &self.totals;
        StatisticsSnapshot {
            last_day_count: totals.log.len() as u64,
            last_day_duration: totals.log.iter().map(|s| s.duration_seconds).sum(),
            lifetime_count: totals.lifetime_count,
            lifetime_duration: totals.lifetime_seconds,
        }
    }

    /// Sessions in the log as of the last read, oldest first
    pub fn sessions(&self) -> &[FocusSession] {
        &self.totals.log
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Apply `change` to the latest stored totals, writing back when it
    /// returns true. If the store fails the change still lands in memory.
    fn modify<F>(&mut self, mut change: F)
    where
        F: FnMut(&mut Totals) -> bool,
    {
        let mut latest = None;
        let result = self.store.update(&mut |entries| {
            let mut totals = Totals::read(entries);
            if change(&mut totals) {
                totals.write(entries)?;
            }
            latest = Some(totals);
            Ok(())
        });

        match (result, latest) {
            (Ok(()), Some(totals)) => self.totals = totals,
            (result, _) => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to persist focus statistics");
                }
                change(&mut self.totals);
            }
        }
    }
}

/// The persisted statistics keys as one value
#[derive(Debug, Clone, Default, PartialEq)]
struct Totals {
    log: Vec<FocusSession>,
    lifetime_count: u64,
    lifetime_seconds: f64,
}

impl Totals {
    fn read(entries: &Map<String, Value>) -> Self {
        Self {
            log: entry_or_default(entries, SESSION_LOG_KEY),
            lifetime_count: entry_or_default(entries, LIFETIME_TASK_COUNT_KEY),
            lifetime_seconds: entry_or_default(entries, LIFETIME_FOCUSED_SECONDS_KEY),
        }
        .sanitized()
    }

    fn write(&self, entries: &mut Map<String, Value>) -> Result<(), StoreError> {
        entries.insert(SESSION_LOG_KEY.to_string(), to_value(&self.log)?);
        entries.insert(
            LIFETIME_TASK_COUNT_KEY.to_string(),
            to_value(&self.lifetime_count)?,
        );
        entries.insert(
            LIFETIME_FOCUSED_SECONDS_KEY.to_string(),
            to_value(&self.lifetime_seconds)?,
        );
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        if !self.lifetime_seconds.is_finite() {
            self.lifetime_seconds = 0.0;
        }
        self.lifetime_seconds = self.lifetime_seconds.max(0.0);
        self
    }

    /// Keeps order; returns how many sessions were dropped
    fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.log.len();
        self.log.retain(|session| !session.is_older_than(cutoff));
        before - self.log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{JsonFileStore, MemoryStore};
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, SessionStats) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at_epoch_seconds(1_700_000_000));
        let stats = SessionStats::open(store.clone(), clock.clone(), TimeDelta::hours(24));
        (store, clock, stats)
    }

    #[test]
    fn test_empty_snapshot() {
        let (_store, _clock, mut stats) = setup();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot, StatisticsSnapshot::default());
        assert_eq!(snapshot.average_last_day(), 0.0);
    }

    #[test]
    fn test_record_session_updates_counters() {
        let (_store, _clock, mut stats) = setup();

        stats.record_session(TimeDelta::seconds(300));
        stats.record_session(TimeDelta::seconds(100));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.last_day_count, 2);
        assert_eq!(snapshot.last_day_duration, 400.0);
        assert_eq!(snapshot.lifetime_count, 2);
        assert_eq!(snapshot.lifetime_duration, 400.0);
        assert_eq!(snapshot.average_last_day(), 200.0);
    }

    #[test]
    fn test_old_sessions_pruned_but_lifetime_kept() {
        let (_store, clock, mut stats) = setup();

        // 25 hours ago
        stats.record_session(TimeDelta::seconds(600));
        clock.advance_secs(23 * 3600);
        // 2 hours ago
        stats.record_session(TimeDelta::seconds(90));
        clock.advance_secs(2 * 3600);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.last_day_count, 1);
        assert_eq!(snapshot.last_day_duration, 90.0);
        assert_eq!(snapshot.lifetime_count, 2);
        assert_eq!(snapshot.lifetime_duration, 690.0);
    }

    #[test]
    fn test_prune_keeps_order_and_is_idempotent() {
        let (_store, clock, mut stats) = setup();

        for secs in [10, 20, 30, 40] {
            stats.record_session(TimeDelta::seconds(secs));
            clock.advance_secs(9 * 3600);
        }
        // Now at +36h: the first two (at +0h and +9h) are outside the window
        assert_eq!(stats.prune(), 2);
        assert_eq!(stats.prune(), 0);

        let durations: Vec<f64> = stats.sessions().iter().map(|s| s.duration_seconds).collect();
        assert_eq!(durations, vec![30.0, 40.0]);

        let cutoff = clock.now() - TimeDelta::hours(24);
        assert!(stats.sessions().iter().all(|s| !s.is_older_than(cutoff)));
    }

    #[test]
    fn test_entry_exactly_at_cutoff_is_kept() {
        let (_store, clock, mut stats) = setup();
        stats.record_session(TimeDelta::seconds(5));
        clock.advance_secs(24 * 3600);

        assert_eq!(stats.snapshot().last_day_count, 1);

        clock.advance_secs(1);
        assert_eq!(stats.snapshot().last_day_count, 0);
    }

    #[test]
    fn test_lifetime_counters_never_decrease() {
        let (_store, clock, mut stats) = setup();
        let mut last = stats.snapshot();

        for secs in [0, 45, 0, 1200] {
            stats.record_session(TimeDelta::seconds(secs));
            clock.advance_secs(13 * 3600);
            let next = stats.snapshot();
            assert!(next.lifetime_count > last.lifetime_count);
            assert!(next.lifetime_duration >= last.lifetime_duration);
            last = next;
        }
    }

    #[test]
    fn test_reopen_gives_equal_snapshot() {
        let (store, clock, mut stats) = setup();
        stats.record_session(TimeDelta::milliseconds(125_500));
        stats.record_session(TimeDelta::seconds(60));
        let before = stats.snapshot();

        let mut reopened = SessionStats::open(store, clock, TimeDelta::hours(24));
        assert_eq!(reopened.snapshot(), before);
        assert_eq!(reopened.sessions(), stats.sessions());
    }

    #[test]
    fn test_corrupt_values_fall_back_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(SESSION_LOG_KEY, json!({"not": "a list"})).unwrap();
        store.set(LIFETIME_TASK_COUNT_KEY, json!(-3)).unwrap();
        store.set(LIFETIME_FOCUSED_SECONDS_KEY, json!("lots")).unwrap();

        let clock = Arc::new(ManualClock::at_epoch_seconds(1_700_000_000));
        let mut stats = SessionStats::open(store, clock, TimeDelta::hours(24));
        assert_eq!(stats.snapshot(), StatisticsSnapshot::default());

        stats.record_session(TimeDelta::seconds(30));
        assert_eq!(stats.snapshot().lifetime_count, 1);
    }

    #[test]
    fn test_processes_sharing_a_file_keep_every_session() {
        let dir = std::env::temp_dir().join(format!(
            "twomin_stats_test_{}_shared",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("state.json");
        let clock = Arc::new(ManualClock::at_epoch_seconds(1_700_000_000));

        // Both opened before either writes, like `twomin run` and a one-shot save
        let mut foreground = SessionStats::open(
            Arc::new(JsonFileStore::open(&path).unwrap()),
            clock.clone(),
            TimeDelta::hours(24),
        );
        let mut one_shot = SessionStats::open(
            Arc::new(JsonFileStore::open(&path).unwrap()),
            clock.clone(),
            TimeDelta::hours(24),
        );

        one_shot.record_session(TimeDelta::seconds(30));
        clock.advance_secs(60);
        foreground.record_session(TimeDelta::seconds(90));

        let snapshot = foreground.snapshot();
        assert_eq!(snapshot.lifetime_count, 2);
        assert_eq!(snapshot.lifetime_duration, 120.0);
        assert_eq!(snapshot.last_day_count, 2);
        assert_eq!(one_shot.snapshot(), snapshot);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_persisted_layout() {
        let (store, _clock, mut stats) = setup();
        stats.record_session(TimeDelta::seconds(300));

        assert_eq!(store.get(LIFETIME_TASK_COUNT_KEY).unwrap(), Some(json!(1)));
        assert_eq!(store.get(LIFETIME_FOCUSED_SECONDS_KEY).unwrap(), Some(json!(300.0)));
        assert_eq!(
            store.get(SESSION_LOG_KEY).unwrap(),
            Some(json!([{"timestampEpochSeconds": 1_700_000_000.0, "durationSeconds": 300.0}]))
        );
    }
}
