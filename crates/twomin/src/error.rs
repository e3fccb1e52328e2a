//! Error types for the persistence and notification seams

use thiserror::Error;

/// Key-value store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State file is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Notification delivery errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{backend} failed: {reason}")]
    Backend { backend: &'static str, reason: String },

    #[error("No async runtime available to defer the notification")]
    NoRuntime,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
