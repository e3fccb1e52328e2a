//! Configuration management for twomin

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// twomin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Countdown length (seconds)
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,

    /// Interval between ticks in the foreground loop (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How far back the "last day" statistics look (hours)
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Count the countdown itself toward a saved session's duration
    #[serde(default)]
    pub count_countdown_in_session: bool,

    /// Title of the completion alert
    #[serde(default = "default_notification_title")]
    pub notification_title: String,

    /// Body of the completion alert
    #[serde(default = "default_notification_body")]
    pub notification_body: String,

    /// Play a sound with the completion alert
    #[serde(default = "default_notification_sound")]
    pub notification_sound: bool,

    /// Send desktop notifications from `twomin run`
    #[serde(default = "default_desktop_notifications")]
    pub desktop_notifications: bool,
}

/// Longest countdown accepted (one day)
pub const MAX_BUDGET_SECS: u64 = 24 * 60 * 60;

/// Slowest tick accepted (one minute)
pub const MAX_TICK_INTERVAL_MS: u64 = 60 * 1000;

/// Longest statistics window accepted (ten years)
pub const MAX_RETENTION_HOURS: u64 = 10 * 365 * 24;

fn default_budget_secs() -> u64 {
    120
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_retention_hours() -> u64 {
    24
}

fn default_notification_title() -> String {
    "2-Minute Timer Complete".to_string()
}

fn default_notification_body() -> String {
    "Task finished? Awesome!\nStill working? Stay in the flow!".to_string()
}

fn default_notification_sound() -> bool {
    true
}

fn default_desktop_notifications() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            budget_secs: default_budget_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            retention_hours: default_retention_hours(),
            count_countdown_in_session: false,
            notification_title: default_notification_title(),
            notification_body: default_notification_body(),
            notification_sound: default_notification_sound(),
            desktop_notifications: default_desktop_notifications(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            Ok(config.sanitized())
        } else {
            Ok(Self::default())
        }
    }

    /// Zero values fall back to their defaults, oversized ones are capped
    fn sanitized(mut self) -> Self {
        if self.budget_secs == 0 {
            self.budget_secs = default_budget_secs();
        }
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = default_tick_interval_ms();
        }
        if self.retention_hours == 0 {
            self.retention_hours = default_retention_hours();
        }
        self.budget_secs = self.budget_secs.min(MAX_BUDGET_SECS);
        self.tick_interval_ms = self.tick_interval_ms.min(MAX_TICK_INTERVAL_MS);
        self.retention_hours = self.retention_hours.min(MAX_RETENTION_HOURS);
        self
    }
}
