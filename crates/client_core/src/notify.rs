//! Human-readable notices for the display layer.

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BootstrapFailure,
    ProtocolError,
    OutOfBounds,
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    /// Persistent notices stay on screen until the user acts on them.
    pub persistent: bool,
}

impl Notification {
    pub fn transient(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            persistent: false,
        }
    }

    pub fn persistent(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            persistent: true,
        }
    }
}

impl From<&SyncError> for Notification {
    fn from(err: &SyncError) -> Self {
        Self::transient(err.kind(), err.to_string())
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Fallback sink that only logs.
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        if notification.persistent {
            error!(kind = ?notification.kind, "{}", notification.message);
        } else {
            warn!(kind = ?notification.kind, "{}", notification.message);
        }
    }
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        let _ = self.send(notification);
    }
}
