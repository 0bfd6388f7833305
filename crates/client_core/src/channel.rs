//! One WebSocket connection to the grid server.
//!
//! `Disconnected -> Connecting -> Open -> Closed`. `Closed` is terminal for an
//! instance; reconnecting means building a new channel. State transitions are
//! applied by the owner in [`RealtimeChannel::next_event`], so the owning task
//! is the only writer.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use shared::protocol::ClientAction;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::SyncError;

const INBOUND_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Frame(String),
    Closed { reason: String },
}

enum TransportEvent {
    Connected(mpsc::UnboundedSender<Message>),
    Frame(String),
    Closed(String),
}

pub struct RealtimeChannel {
    state: ConnectionState,
    connect_timeout: Duration,
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    transport_tx: mpsc::Sender<TransportEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    transport_task: Option<JoinHandle<()>>,
}

impl RealtimeChannel {
    pub fn new(connect_timeout: Duration) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(INBOUND_BUFFER);
        Self {
            state: ConnectionState::Disconnected,
            connect_timeout,
            outgoing: None,
            transport_tx,
            transport_rx,
            transport_task: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Starts connecting in the background. Completion is reported through
    /// [`next_event`](Self::next_event).
    pub fn open(&mut self, url: &Url) {
        if self.state != ConnectionState::Disconnected {
            warn!(state = ?self.state, "channel: open ignored, instance already used");
            return;
        }
        self.state = ConnectionState::Connecting;
        info!(%url, "channel: connecting");
        self.transport_task = Some(tokio::spawn(run_transport(
            url.to_string(),
            self.connect_timeout,
            self.transport_tx.clone(),
        )));
    }

    /// Queues one action on the socket. Only valid while `Open`; callers are
    /// expected to drop the action on `NotOpen`.
    pub fn send(&self, action: &ClientAction) -> Result<(), SyncError> {
        let outgoing = match (&self.outgoing, self.state) {
            (Some(outgoing), ConnectionState::Open) => outgoing,
            _ => return Err(SyncError::NotOpen),
        };
        let text = action
            .encode()
            .map_err(|err| SyncError::MalformedFrame(err.to_string()))?;
        debug!(action = action.name(), "channel: send");
        outgoing
            .send(Message::Text(text))
            .map_err(|_| SyncError::NotOpen)
    }

    /// Waits for the next transport event and applies the matching state
    /// transition. Returns `None` once the channel is no longer live.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        if !self.state.is_live() {
            return None;
        }
        match self.transport_rx.recv().await? {
            TransportEvent::Connected(outgoing) => {
                self.outgoing = Some(outgoing);
                self.state = ConnectionState::Open;
                info!("channel: open");
                Some(ChannelEvent::Opened)
            }
            TransportEvent::Frame(text) => Some(ChannelEvent::Frame(text)),
            TransportEvent::Closed(reason) => {
                self.outgoing = None;
                self.transport_task = None;
                self.state = ConnectionState::Closed;
                info!(%reason, "channel: closed");
                Some(ChannelEvent::Closed { reason })
            }
        }
    }

    /// Tears the connection down locally without emitting a `Closed` event.
    pub fn close(&mut self) {
        self.outgoing = None;
        if let Some(task) = self.transport_task.take() {
            task.abort();
        }
        self.state = ConnectionState::Closed;
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(task) = self.transport_task.take() {
            task.abort();
        }
    }
}

async fn run_transport(url: String, connect_timeout: Duration, events: mpsc::Sender<TransportEvent>) {
    let ws_stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(err)) => {
            let _ = events
                .send(TransportEvent::Closed(format!(
                    "failed to connect websocket {url}: {err}"
                )))
                .await;
            return;
        }
        Err(_) => {
            let _ = events
                .send(TransportEvent::Closed(format!(
                    "timed out connecting websocket {url}"
                )))
                .await;
            return;
        }
    };
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
    if events
        .send(TransportEvent::Connected(outgoing_tx))
        .await
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = outgoing_rx.recv().await {
            if let Err(err) = ws_writer.send(message).await {
                warn!("channel: websocket send failed: {err}");
                break;
            }
        }
        let _ = ws_writer.close().await;
    });

    let reason = loop {
        match ws_reader.next().await {
            Some(Ok(Message::Text(text))) => {
                if events.send(TransportEvent::Frame(text)).await.is_err() {
                    break "channel dropped".to_string();
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) if !frame.reason.is_empty() => {
                        format!("server closed the connection: {}", frame.reason)
                    }
                    _ => "server closed the connection".to_string(),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => break format!("websocket receive failed: {err}"),
            None => break "websocket stream ended".to_string(),
        }
    };

    writer.abort();
    let _ = events.send(TransportEvent::Closed(reason)).await;
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
