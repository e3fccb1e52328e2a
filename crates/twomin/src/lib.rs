//! twomin - A two-minute focus timer that rolls into a stopwatch
//!
//! "Just start. Two minutes is enough to get going."
//!
//! The timer counts down from a fixed budget (120 seconds by default). When
//! it runs out it keeps counting up as a stopwatch until the session is
//! saved or discarded. Saved sessions feed a small statistics store:
//! - Sessions and focused time over the last 24 hours
//! - Lifetime session count and focused time
//!
//! Remaining and elapsed time are always derived from a wall-clock anchor,
//! so a suspended process or a late tick never loses time.

pub mod backend;
pub mod clock;
pub mod error;
pub mod machine;
pub mod notify;
pub mod session;
pub mod state;
pub mod stats;
pub mod store;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{NotifyError, StoreError};
pub use machine::{TimerMachine, TimerSettings};
pub use notify::{Notifier, ScheduledNotification};
pub use session::FocusSession;
pub use state::{Phase, TimerView, TransitionEvent};
pub use stats::{SessionStats, StatisticsSnapshot};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use ticker::Ticker;
