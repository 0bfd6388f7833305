//! In-process stand-in for the grid server: serves the snapshot route and the
//! per-user socket, records every inbound frame, and can push frames or drop
//! connections on demand.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use client_core::{ClientSettings, ReconnectPolicy, SessionView, SyncEngine};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::GridDimensions,
    protocol::{ClientAction, SnapshotEntry},
};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, Mutex},
};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum PeerControl {
    Push(String),
    Disconnect,
}

#[derive(Clone)]
struct PeerState {
    snapshot: Arc<Mutex<Option<Vec<SnapshotEntry>>>>,
    echo_updates: bool,
    close_on_accept: bool,
    received: mpsc::UnboundedSender<(String, String)>,
    control: broadcast::Sender<PeerControl>,
    connections: Arc<AtomicUsize>,
    snapshot_requests: Arc<AtomicUsize>,
}

pub struct TestPeer {
    pub address: String,
    state: PeerState,
    received: mpsc::UnboundedReceiver<(String, String)>,
}

impl TestPeer {
    /// `snapshot = None` makes the snapshot route answer 500.
    pub async fn spawn(snapshot: Option<Vec<SnapshotEntry>>, echo_updates: bool) -> Self {
        Self::spawn_with(snapshot, echo_updates, false).await
    }

    /// A peer that completes every handshake and closes the socket right away,
    /// the way a server turns away a username that is already connected.
    pub async fn spawn_closing_on_accept() -> Self {
        Self::spawn_with(Some(Vec::new()), false, true).await
    }

    async fn spawn_with(
        snapshot: Option<Vec<SnapshotEntry>>,
        echo_updates: bool,
        close_on_accept: bool,
    ) -> Self {
        let (received_tx, received) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(64);
        let state = PeerState {
            snapshot: Arc::new(Mutex::new(snapshot)),
            echo_updates,
            close_on_accept,
            received: received_tx,
            control,
            connections: Arc::new(AtomicUsize::new(0)),
            snapshot_requests: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route("/", get(serve_snapshot))
            .route("/ws/:username", get(serve_socket))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("addr").to_string();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            address,
            state,
            received,
        }
    }

    pub fn settings(&self, rows: usize, columns: usize) -> ClientSettings {
        ClientSettings {
            server_address: self.address.clone(),
            secure: false,
            dimensions: GridDimensions::new(rows, columns),
            snapshot_timeout: WAIT,
            connect_timeout: WAIT,
            reconnect: ReconnectPolicy::disabled(),
            ..ClientSettings::default()
        }
    }

    pub async fn set_snapshot(&self, snapshot: Vec<SnapshotEntry>) {
        *self.state.snapshot.lock().await = Some(snapshot);
    }

    /// Sends `frame` to every connected client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.state.control.send(PeerControl::Push(frame.into()));
    }

    pub fn disconnect_all(&self) {
        let _ = self.state.control.send(PeerControl::Disconnect);
    }

    pub async fn next_received(&mut self) -> (String, String) {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("peer stopped")
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn snapshot_requests(&self) -> usize {
        self.state.snapshot_requests.load(Ordering::SeqCst)
    }
}

pub async fn wait_for_view(
    engine: &SyncEngine,
    predicate: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    let mut view = engine.subscribe();
    let result = tokio::time::timeout(WAIT, view.wait_for(predicate))
        .await
        .expect("timed out waiting for session view");
    let view = result.expect("engine stopped").clone();
    view
}

async fn serve_snapshot(
    State(state): State<PeerState>,
) -> Result<Json<Vec<SnapshotEntry>>, StatusCode> {
    state.snapshot_requests.fetch_add(1, Ordering::SeqCst);
    state
        .snapshot
        .lock()
        .await
        .clone()
        .map(Json)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn serve_socket(
    ws: WebSocketUpgrade,
    Path(username): Path<String>,
    State(state): State<PeerState>,
) -> impl IntoResponse {
    // Subscribe before the handshake completes so pushes issued right after
    // the client reports `Open` are not missed.
    let control = state.control.subscribe();
    ws.on_upgrade(move |socket| peer_session(socket, state, username, control))
}

async fn peer_session(
    socket: WebSocket,
    state: PeerState,
    username: String,
    mut control: broadcast::Receiver<PeerControl>,
) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sender, mut receiver) = socket.split();
    if state.close_on_accept {
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = state.received.send((username.clone(), text.clone()));
                    if !state.echo_updates {
                        continue;
                    }
                    if let Ok(ClientAction::NewGridValue(update)) = serde_json::from_str(&text) {
                        let frame = serde_json::to_string(&update).expect("encode echo");
                        let _ = state.control.send(PeerControl::Push(frame));
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            command = control.recv() => match command {
                Ok(PeerControl::Push(frame)) => {
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(PeerControl::Disconnect) | Err(broadcast::error::RecvError::Closed) => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
        }
    }
}
