//! User-facing notifications.
//!
//! Components report outcomes through a [`NotificationSink`] instead of
//! printing or rendering anything themselves. The CLI plugs in a
//! [`ConsoleSink`]; tests use [`MemorySink`] and assert on what was emitted.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

/// Receiver of success/failure messages meant for the user.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Records every notification in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|n| n.message)
            .collect()
    }

    /// Number of recorded notifications whose message contains `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.notifications()
            .iter()
            .filter(|n| n.message.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, notification: Notification) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

/// Writes notifications to stderr, mirrored to tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Success => {
                tracing::debug!(message = %notification.message, "Notification");
                eprintln!("ok: {}", notification.message);
            }
            Level::Info => {
                tracing::debug!(message = %notification.message, "Notification");
                eprintln!("{}", notification.message);
            }
            Level::Error => {
                tracing::debug!(message = %notification.message, "Error notification");
                eprintln!("error: {}", notification.message);
            }
        }
    }
}
