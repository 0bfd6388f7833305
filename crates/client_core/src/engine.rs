//! Session orchestration.
//!
//! A [`SyncEngine`] is the handle the UI holds. All session state lives in a
//! single spawned task that multiplexes UI commands, channel events and the
//! reconnect timer, so grid mutations are serialized in server delivery order.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{anyhow, Result};
use shared::{
    domain::Position,
    protocol::{BroadcastAction, CellUpdate, ClientAction, ServerFrame},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    channel::{ChannelEvent, ConnectionState, RealtimeChannel},
    config::ClientSettings,
    error::SyncError,
    grid_store::{Grid, GridStore},
    identity::{normalize_username, IdentityStore, MemoryIdentityStore},
    notify::{Notification, NotificationKind, NotificationSink, TracingNotificationSink},
    snapshot::{HttpSnapshotLoader, SnapshotSource},
};

const COMMAND_BUFFER: usize = 64;

/// Read-only picture of a session, republished after every change.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub grid: Arc<Grid>,
    pub connection: ConnectionState,
    pub selection: Option<Position>,
    /// Cells other users announced as selected, keyed by position.
    pub remote_selections: Arc<BTreeMap<Position, String>>,
}

enum EngineCommand {
    Select(Position),
    Edit { value: String },
    SubmitEdit { position: Position, value: String },
}

pub struct SyncEngine {
    username: String,
    commands: mpsc::Sender<EngineCommand>,
    view: watch::Receiver<SessionView>,
    task: JoinHandle<()>,
}

impl SyncEngine {
    /// Starts a session with the HTTP snapshot loader, log-only notifications
    /// and no identity persistence.
    pub fn start(settings: ClientSettings, username: &str) -> Result<Self> {
        let snapshot = Arc::new(HttpSnapshotLoader::new(settings.snapshot_timeout));
        Self::start_with_dependencies(
            settings,
            username,
            snapshot,
            Arc::new(TracingNotificationSink),
            Arc::new(MemoryIdentityStore::default()),
        )
    }

    pub fn start_with_dependencies(
        settings: ClientSettings,
        username: &str,
        snapshot: Arc<dyn SnapshotSource>,
        notifications: Arc<dyn NotificationSink>,
        identity: Arc<dyn IdentityStore>,
    ) -> Result<Self> {
        settings.validate()?;
        let username = normalize_username(username)?;
        let websocket_url = settings.websocket_url(&username)?;
        let snapshot_url = settings.snapshot_url()?;

        let store = GridStore::with_dimensions(settings.dimensions);
        let (view_tx, view) = watch::channel(SessionView {
            grid: store.read(),
            connection: ConnectionState::Disconnected,
            selection: None,
            remote_selections: Arc::new(BTreeMap::new()),
        });
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let session = SyncSession {
            channel: RealtimeChannel::new(settings.connect_timeout),
            settings,
            username: username.clone(),
            websocket_url,
            snapshot_url,
            store,
            selection: None,
            remote_selections: Arc::new(BTreeMap::new()),
            reconnect_attempts: 0,
            reconnect_at: None,
            opened_at: None,
            snapshot,
            notifications,
            identity,
            view: view_tx,
        };
        let task = tokio::spawn(session.run(command_rx));

        Ok(Self {
            username,
            commands,
            view,
            task,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Marks `position` as the target of the next [`edit`](Self::edit).
    pub async fn select(&self, position: Position) -> Result<()> {
        self.dispatch(EngineCommand::Select(position)).await
    }

    /// Edits the currently selected cell. Ignored when nothing is selected.
    pub async fn edit(&self, value: impl Into<String>) -> Result<()> {
        self.dispatch(EngineCommand::Edit {
            value: value.into(),
        })
        .await
    }

    /// Selects `position` and edits it in one step.
    pub async fn submit_edit(&self, position: Position, value: impl Into<String>) -> Result<()> {
        self.dispatch(EngineCommand::SubmitEdit {
            position,
            value: value.into(),
        })
        .await
    }

    pub fn grid(&self) -> Arc<Grid> {
        Arc::clone(&self.view.borrow().grid)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.view.borrow().connection
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Ends the session and its connection. A new identity needs a new engine.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(err) = self.task.await {
            warn!("sync engine task ended abnormally: {err}");
        }
    }

    async fn dispatch(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("sync engine has stopped"))
    }
}

struct SyncSession {
    settings: ClientSettings,
    username: String,
    websocket_url: Url,
    snapshot_url: Url,
    store: GridStore,
    channel: RealtimeChannel,
    selection: Option<Position>,
    remote_selections: Arc<BTreeMap<Position, String>>,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
    /// When the current channel reached Open; cleared on close.
    opened_at: Option<Instant>,
    snapshot: Arc<dyn SnapshotSource>,
    notifications: Arc<dyn NotificationSink>,
    identity: Arc<dyn IdentityStore>,
    view: watch::Sender<SessionView>,
}

impl SyncSession {
    async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        info!(username = %self.username, url = %self.websocket_url, "sync: session started");
        self.channel.open(&self.websocket_url);
        self.publish();

        loop {
            let channel_live = self.channel.state().is_live();
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = self.channel.next_event(), if channel_live => {
                    if let Some(event) = event {
                        self.handle_channel_event(event).await;
                    }
                }
                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() => self.reconnect(),
            }
        }

        self.channel.close();
        self.publish();
        info!(username = %self.username, "sync: session ended");
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Select(position) => {
                if self.check_bounds(position) {
                    self.selection = Some(position);
                    self.publish();
                }
            }
            EngineCommand::Edit { value } => match self.selection {
                Some(position) => self.send_edit(position, value),
                None => debug!("sync: edit ignored, no cell selected"),
            },
            EngineCommand::SubmitEdit { position, value } => {
                if self.check_bounds(position) {
                    self.selection = Some(position);
                    self.publish();
                    self.send_edit(position, value);
                }
            }
        }
    }

    /// Announces the selection, then the value. The grid itself only changes
    /// once the server's update frame comes back.
    fn send_edit(&mut self, position: Position, value: String) {
        let actions = [
            ClientAction::Select(position),
            ClientAction::NewGridValue(CellUpdate::new(position, value)),
        ];
        for action in &actions {
            if let Err(err) = self.channel.send(action) {
                warn!(
                    row = position.row,
                    column = position.column,
                    state = ?self.channel.state(),
                    "sync: dropping edit: {err}"
                );
                return;
            }
        }
    }

    fn check_bounds(&self, position: Position) -> bool {
        let dimensions = self.store.dimensions();
        if dimensions.contains(position) {
            return true;
        }
        self.report(&SyncError::OutOfBounds {
            position,
            dimensions,
        });
        false
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => self.on_opened().await,
            ChannelEvent::Frame(text) => self.apply_frame(&text),
            ChannelEvent::Closed { reason } => self.on_closed(reason),
        }
    }

    async fn on_opened(&mut self) {
        self.opened_at = Some(Instant::now());
        self.publish();
        if let Err(err) = self.identity.store(&self.username) {
            warn!("sync: failed to persist username: {err:#}");
        }

        // Frames that arrive meanwhile stay queued in the channel and are applied
        // on top of the snapshot.
        match self.snapshot.load(&self.snapshot_url).await {
            Ok(entries) => {
                let report = self.store.apply_snapshot(entries);
                info!(
                    applied = report.applied,
                    rejected = report.rejected.len(),
                    "sync: snapshot applied"
                );
                for err in &report.rejected {
                    self.report(err);
                }
                self.publish();
            }
            Err(err) => self.report(&err),
        }
    }

    fn apply_frame(&mut self, text: &str) {
        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.report(&SyncError::MalformedFrame(err.to_string()));
                return;
            }
        };
        match frame {
            ServerFrame::Error(server_error) => {
                debug!(code = ?server_error.error_code, "sync: server reported an error");
                self.report(&SyncError::Protocol {
                    message: server_error.error,
                    code: server_error.error_code,
                });
            }
            ServerFrame::Update(update) => self.apply_update(update),
            ServerFrame::Broadcast { who, action } => match action {
                BroadcastAction::Update(update) => self.apply_update(update),
                BroadcastAction::Select(position) => self.record_remote_selection(who, position),
            },
        }
    }

    fn apply_update(&mut self, update: CellUpdate) {
        let CellUpdate { position, value } = update;
        match self.store.apply_update(position, value) {
            Ok(true) => self.publish(),
            Ok(false) => {}
            Err(err) => self.report(&err),
        }
    }

    fn record_remote_selection(&mut self, who: String, position: Position) {
        if who == self.username {
            return;
        }
        let selections = Arc::make_mut(&mut self.remote_selections);
        selections.retain(|_, owner| *owner != who);
        selections.insert(position, who);
        self.publish();
    }

    fn on_closed(&mut self, reason: String) {
        if !self.remote_selections.is_empty() {
            self.remote_selections = Arc::new(BTreeMap::new());
        }
        let policy = &self.settings.reconnect;
        // Only a connection that stayed up for `stable_after` refills the budget.
        if let Some(opened_at) = self.opened_at.take() {
            if opened_at.elapsed() >= policy.stable_after {
                debug!("sync: connection was stable, reconnect budget reset");
                self.reconnect_attempts = 0;
            }
        }
        if self.reconnect_attempts >= policy.max_attempts {
            self.reconnect_at = None;
            self.notifications.notify(Notification::persistent(
                NotificationKind::ConnectionLost,
                format!("Connection to the grid server was lost ({reason}). Reload to reconnect."),
            ));
        } else {
            let delay = policy.delay_for(self.reconnect_attempts);
            self.reconnect_attempts += 1;
            self.reconnect_at = Some(Instant::now() + delay);
            self.report(&SyncError::ConnectionLost(format!(
                "Connection to the grid server was lost ({reason}); reconnecting in {}s (attempt {} of {})",
                delay.as_secs_f32(),
                self.reconnect_attempts,
                policy.max_attempts
            )));
        }
        self.publish();
    }

    fn reconnect(&mut self) {
        self.reconnect_at = None;
        info!(attempt = self.reconnect_attempts, "sync: reconnecting");
        self.channel = RealtimeChannel::new(self.settings.connect_timeout);
        self.channel.open(&self.websocket_url);
        self.publish();
    }

    fn report(&self, err: &SyncError) {
        self.notifications.notify(Notification::from(err));
    }

    fn publish(&self) {
        self.view.send_replace(SessionView {
            grid: self.store.read(),
            connection: self.channel.state(),
            selection: self.selection,
            remote_selections: Arc::clone(&self.remote_selections),
        });
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
