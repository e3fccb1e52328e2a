//! Completion alerts
//!
//! The state machine talks to a [`Notifier`]: it schedules a deferred alert
//! when a countdown starts, cancels it whenever the countdown stops, and
//! asks for immediate success feedback when the countdown runs out. At most
//! one alert is pending per identifier; scheduling again replaces it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, Notification};
use crate::error::NotifyError;

/// A deferred alert
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledNotification {
    pub identifier: String,
    pub fire_after: Duration,
    pub title: String,
    pub body: String,
    pub sound: bool,
}

/// Side-effect sink for alerts and completion feedback
pub trait Notifier: Send {
    /// Schedule an alert, replacing any pending one with the same identifier
    fn schedule(&mut self, notification: ScheduledNotification) -> Result<(), NotifyError>;

    /// Cancel the pending alert for `identifier`; a no-op when none is pending
    fn cancel(&mut self, identifier: &str);

    /// Immediate feedback that the countdown finished
    fn success(&mut self);
}

/// Notifier that only logs; used by one-shot commands that exit immediately
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn schedule(&mut self, notification: ScheduledNotification) -> Result<(), NotifyError> {
        debug!(
            identifier = %notification.identifier,
            fire_after_secs = notification.fire_after.as_secs_f64(),
            "alert not scheduled: no foreground process to deliver it"
        );
        Ok(())
    }

    fn cancel(&mut self, identifier: &str) {
        debug!(identifier, "cancel alert");
    }

    fn success(&mut self) {
        info!("countdown complete");
    }
}

/// A call captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq)]
pub enum NotifierCall {
    Schedule(ScheduledNotification),
    Cancel(String),
    Success,
}

/// Notifier that records every call; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    calls: Arc<Mutex<Vec<NotifierCall>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// The alert still pending for `identifier` after replaying all calls
    pub fn pending(&self, identifier: &str) -> Option<ScheduledNotification> {
        let mut pending = None;
        for call in self.calls() {
            match call {
                NotifierCall::Schedule(n) if n.identifier == identifier => pending = Some(n),
                NotifierCall::Cancel(id) if id == identifier => pending = None,
                _ => {}
            }
        }
        pending
    }

    pub fn success_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, NotifierCall::Success))
            .count()
    }

    fn push(&self, call: NotifierCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Notifier for RecordingNotifier {
    fn schedule(&mut self, notification: ScheduledNotification) -> Result<(), NotifyError> {
        self.push(NotifierCall::Schedule(notification));
        Ok(())
    }

    fn cancel(&mut self, identifier: &str) {
        self.push(NotifierCall::Cancel(identifier.to_string()));
    }

    fn success(&mut self) {
        self.push(NotifierCall::Success);
    }
}

/// Desktop notifier that defers alerts on the tokio runtime
///
/// Each pending alert is a sleeping task; cancelling aborts it.
pub struct DesktopNotifier {
    backend: Backend,
    runtime: Handle,
    pending: HashMap<String, JoinHandle<()>>,
}

impl DesktopNotifier {
    /// Use the best backend for this platform on the current runtime
    pub fn detect() -> Result<Self, NotifyError> {
        Self::with_backend(Backend::detect())
    }

    pub fn with_backend(backend: Backend) -> Result<Self, NotifyError> {
        let runtime = Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        info!(backend = backend.name(), "desktop notifications enabled");
        Ok(Self {
            backend,
            runtime,
            pending: HashMap::new(),
        })
    }
}

impl Notifier for DesktopNotifier {
    fn schedule(&mut self, notification: ScheduledNotification) -> Result<(), NotifyError> {
        self.cancel(&notification.identifier);

        let backend = self.backend;
        let identifier = notification.identifier.clone();
        let delay = notification.fire_after;
        let mut alert = Notification::new(notification.title, notification.body);
        if !notification.sound {
            alert = alert.silent();
        }

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let sent = tokio::task::spawn_blocking(move || backend.send(&alert)).await;
            match sent {
                Ok(Ok(())) => debug!(backend = backend.name(), "alert delivered"),
                Ok(Err(e)) => warn!(error = %e, "failed to deliver alert"),
                Err(e) => warn!(error = %e, "alert task failed"),
            }
        });

        debug!(
            identifier = %identifier,
            fire_after_secs = delay.as_secs_f64(),
            "alert scheduled"
        );
        self.pending.insert(identifier, handle);
        Ok(())
    }

    fn cancel(&mut self, identifier: &str) {
        if let Some(handle) = self.pending.remove(identifier) {
            handle.abort();
            debug!(identifier, "alert cancelled");
        }
    }

    fn success(&mut self) {
        // Terminal bell stands in for haptic feedback
        print!("\x07");
        let _ = std::io::Write::flush(&mut std::io::stdout());
        info!("countdown complete");
    }
}

impl Drop for DesktopNotifier {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, secs: u64) -> ScheduledNotification {
        ScheduledNotification {
            identifier: id.to_string(),
            fire_after: Duration::from_secs(secs),
            title: "t".to_string(),
            body: "b".to_string(),
            sound: true,
        }
    }

    fn is_pending(notifier: &DesktopNotifier, identifier: &str) -> bool {
        notifier
            .pending
            .get(identifier)
            .is_some_and(|handle| !handle.is_finished())
    }

    #[test]
    fn test_recording_last_schedule_wins() {
        let mut notifier = RecordingNotifier::new();
        notifier.schedule(alert("timerComplete", 120)).unwrap();
        notifier.schedule(alert("timerComplete", 90)).unwrap();

        assert_eq!(notifier.pending("timerComplete"), Some(alert("timerComplete", 90)));
        assert_eq!(notifier.pending("other"), None);
    }

    #[test]
    fn test_recording_cancel_is_idempotent() {
        let mut notifier = RecordingNotifier::new();
        notifier.schedule(alert("timerComplete", 120)).unwrap();
        notifier.cancel("timerComplete");
        let once = notifier.pending("timerComplete");
        notifier.cancel("timerComplete");

        assert_eq!(once, None);
        assert_eq!(notifier.pending("timerComplete"), None);
    }

    #[test]
    fn test_recording_clones_share_log() {
        let notifier = RecordingNotifier::new();
        let mut boxed: Box<dyn Notifier> = Box::new(notifier.clone());
        boxed.success();
        assert_eq!(notifier.success_count(), 1);

        notifier.clear();
        assert!(notifier.calls().is_empty());
    }

    #[test]
    fn test_desktop_requires_runtime() {
        assert!(matches!(
            DesktopNotifier::with_backend(Backend::Echo),
            Err(NotifyError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_desktop_reschedule_replaces_pending() {
        let mut notifier = DesktopNotifier::with_backend(Backend::Echo).unwrap();
        notifier.schedule(alert("timerComplete", 60)).unwrap();
        notifier.schedule(alert("timerComplete", 60)).unwrap();

        assert_eq!(notifier.pending.len(), 1);
        assert!(is_pending(&notifier, "timerComplete"));

        notifier.cancel("timerComplete");
        notifier.cancel("timerComplete");
        assert!(!is_pending(&notifier, "timerComplete"));
    }
}
