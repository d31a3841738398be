//! Operator notifications
//!
//! Every outcome the operator must see (zone saved, delete failed, alert
//! received) is turned into a [`Notification`] and handed to a [`Notifier`].
//! The console binary prints them; the library default writes them to the
//! tracing log.

use crate::models::AlertEvent;
use serde::Serialize;
use std::sync::Mutex;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
    /// High-salience danger alert
    Alert,
}

/// One operator-facing message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub detail: Option<String>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title)
    }

    /// Present an `admin_alert` as a single danger notice
    pub fn from_alert(alert: &AlertEvent) -> Self {
        let detail = match &alert.location {
            Some(loc) => format!("{} (at {:.4}, {:.4})", alert.message, loc.lat, loc.lng),
            None => alert.message.clone(),
        };
        Self::new(NotificationLevel::Alert, "DANGER ALERT").with_detail(detail)
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.title, detail),
            None => write!(f, "{}", self.title),
        }
    }
}

/// Sink for operator notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        let detail = n.detail.as_deref().unwrap_or("");
        match n.level {
            NotificationLevel::Info | NotificationLevel::Success => {
                tracing::info!(level = ?n.level, title = %n.title, detail = %detail, "Notification")
            }
            NotificationLevel::Warning => {
                tracing::warn!(title = %n.title, detail = %detail, "Notification")
            }
            NotificationLevel::Error | NotificationLevel::Alert => {
                tracing::error!(level = ?n.level, title = %n.title, detail = %detail, "Notification")
            }
        }
    }
}

/// Keeps notifications in memory, oldest first
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<Notification> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}
