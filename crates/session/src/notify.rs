//! User-facing notifications
//!
//! Every remote failure and every degraded page reaches exactly one sink.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    /// What the user was doing, e.g. "delete annotation"
    pub action: String,
    pub message: String,
}

impl Notification {
    pub fn warning(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Warning, action: action.into(), message: message.into() }
    }

    pub fn error(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Error, action: action.into(), message: message.into() }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to a channel drained by the UI
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

/// Writes notifications to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => {
                tracing::info!(action = %notification.action, "{}", notification.message)
            }
            NotificationLevel::Warning => {
                tracing::warn!(action = %notification.action, "{}", notification.message)
            }
            NotificationLevel::Error => {
                tracing::error!(action = %notification.action, "{}", notification.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();

        sink.notify(Notification::warning("open document", "page 2 has no token layer"));
        sink.notify(Notification::error("delete annotation", "timeout"));

        assert_eq!(rx.try_recv().unwrap().level, NotificationLevel::Warning);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.action, "delete annotation");
        assert_eq!(second.message, "timeout");
    }

    #[test]
    fn test_dropped_receiver_is_not_an_error() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.notify(Notification::error("create annotation", "offline"));
    }
}
