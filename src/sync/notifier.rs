//! Conflict Notifier - surfaces sync results to whatever front end is attached
//!
//! The manager never blocks on the user: conflicts are handed to the
//! notifier and the user answers later through
//! `SyncManager::resolve_conflict`.

use super::models::Conflict;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Toast severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Success => "success",
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Front-end hook for notifications and conflict presentation
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    /// Present conflicts for manual resolution
    fn conflicts_detected(&self, conflicts: &[Conflict]);
}

/// Writes everything to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => log::error!("{}", notification.message),
            NotificationLevel::Warning => log::warn!("{}", notification.message),
            _ => log::info!("{}", notification.message),
        }
    }

    fn conflicts_detected(&self, conflicts: &[Conflict]) {
        for conflict in conflicts {
            log::warn!(
                "Conflict on quote {}: local \"{}\" ({}) vs server \"{}\" ({})",
                conflict.id,
                conflict.local.text,
                conflict.local.last_updated.to_rfc3339(),
                conflict.server.text,
                conflict.server.last_updated.to_rfc3339()
            );
        }
    }
}

/// Events forwarded by `ChannelNotifier`
#[derive(Debug, Clone, PartialEq)]
pub enum NotifierEvent {
    Notification(Notification),
    Conflicts(Vec<Conflict>),
}

/// Forwards notifications over a channel to an interactive front end
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: UnboundedSender<NotifierEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<NotifierEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(NotifierEvent::Notification(notification)).is_err() {
            log::debug!("Notification dropped: receiver closed");
        }
    }

    fn conflicts_detected(&self, conflicts: &[Conflict]) {
        if self.sender.send(NotifierEvent::Conflicts(conflicts.to_vec())).is_err() {
            log::debug!("Conflict event dropped: receiver closed");
        }
    }
}
