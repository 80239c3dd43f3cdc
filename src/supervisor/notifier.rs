//! Human-visible status notifications
//!
//! The supervisor reports lifecycle milestones and failures through a
//! [`Notifier`]. The shipped implementation writes structured log records;
//! mail or chat delivery can be added behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{error, info, warn};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Single-line rendering with a local wall-clock stamp
    pub fn format_line(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: Alert);
}

/// Notifier that emits a tracing event at the alert's level
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: Alert) {
        let line = alert.format_line();
        match alert.level {
            AlertLevel::Info => info!(target: "notifier", "{}", line),
            AlertLevel::Warning => warn!(target: "notifier", "{}", line),
            AlertLevel::Error => error!(target: "notifier", "{}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_level_ordering() {
        assert!(AlertLevel::Info < AlertLevel::Warning);
        assert!(AlertLevel::Warning < AlertLevel::Error);
    }

    #[test]
    fn test_format_line_contains_message() {
        let alert = Alert::new(AlertLevel::Warning, "proxy stopped");
        let line = alert.format_line();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] proxy stopped"));
    }
}
