//! Periodic tick signal
//!
//! Ticks only wake the machine up; they carry no time. A late or dropped
//! tick is harmless because the machine recomputes from its anchor.

use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Owns the background task that sends a tick every `period`
pub struct Ticker {
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start ticking into `tx`; a no-op when already running
    pub fn start(&mut self, tx: Sender<()>) {
        if self.is_running() {
            return;
        }

        let period = self.period;
        self.handle = Some(tokio::spawn(async move {
            debug!(period_ms = period.as_millis() as u64, "ticker started");
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            ticks.tick().await;

            loop {
                ticks.tick().await;
                if tx.send(()).await.is_err() {
                    debug!("ticker stopping (receiver dropped)");
                    break;
                }
            }
        }));
    }

    /// Stop ticking; safe to call when already stopped
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("ticker stopped");
        }
    }

    /// Start or stop so the ticker matches `wanted`
    pub fn sync(&mut self, wanted: bool, tx: &Sender<()>) {
        if wanted {
            self.start(tx.clone());
        } else {
            self.stop();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
