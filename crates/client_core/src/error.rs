use shared::domain::{GridDimensions, Position};
use thiserror::Error;

use crate::notify::NotificationKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("failed to load grid snapshot: {0}")]
    BootstrapFailure(String),
    #[error("{message}")]
    Protocol {
        message: String,
        code: Option<u16>,
    },
    #[error("invalid server frame: {0}")]
    MalformedFrame(String),
    #[error("position {position} is outside the {dimensions} grid")]
    OutOfBounds {
        position: Position,
        dimensions: GridDimensions,
    },
    #[error("{0}")]
    ConnectionLost(String),
    #[error("realtime channel is not open")]
    NotOpen,
}

impl SyncError {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::BootstrapFailure(_) => NotificationKind::BootstrapFailure,
            Self::Protocol { .. } | Self::MalformedFrame(_) => NotificationKind::ProtocolError,
            Self::OutOfBounds { .. } => NotificationKind::OutOfBounds,
            Self::ConnectionLost(_) | Self::NotOpen => NotificationKind::ConnectionLost,
        }
    }
}
