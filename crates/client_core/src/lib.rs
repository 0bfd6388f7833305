//! Client-side synchronization engine for the shared grid.
//!
//! Bootstraps from an HTTP snapshot, streams updates over one WebSocket per
//! identity, and only ever mutates the local grid from server-confirmed data.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid_store;
pub mod identity;
pub mod notify;
pub mod snapshot;

pub use channel::{ChannelEvent, ConnectionState, RealtimeChannel};
pub use config::{load_settings, load_settings_from, ClientSettings, ReconnectPolicy};
pub use engine::{SessionView, SyncEngine};
pub use error::SyncError;
pub use grid_store::{Grid, GridStore, SnapshotReport};
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore};
pub use notify::{Notification, NotificationKind, NotificationSink, TracingNotificationSink};
pub use snapshot::{HttpSnapshotLoader, SnapshotSource};
