use shared::domain::Position;
use tokio::net::TcpListener;

use super::*;

async fn unused_local_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    Url::parse(&format!("ws://{addr}/ws/alice")).expect("url")
}

#[test]
fn new_channel_starts_disconnected_and_refuses_sends() {
    let channel = RealtimeChannel::new(Duration::from_secs(1));

    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!channel.state().is_live());
    assert_eq!(
        channel.send(&ClientAction::Select(Position::new(0, 0))),
        Err(SyncError::NotOpen)
    );
}

#[tokio::test]
async fn idle_channel_yields_no_events() {
    let mut channel = RealtimeChannel::new(Duration::from_secs(1));
    assert_eq!(channel.next_event().await, None);
}

#[tokio::test]
async fn refused_connection_moves_to_closed() {
    let url = unused_local_url().await;
    let mut channel = RealtimeChannel::new(Duration::from_secs(5));

    channel.open(&url);
    assert_eq!(channel.state(), ConnectionState::Connecting);

    let event = tokio::time::timeout(Duration::from_secs(5), channel.next_event())
        .await
        .expect("event in time")
        .expect("closed event");
    match event {
        ChannelEvent::Closed { reason } => assert!(reason.contains("failed to connect")),
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(channel.state(), ConnectionState::Closed);
    assert_eq!(channel.next_event().await, None);
    assert_eq!(
        channel.send(&ClientAction::Select(Position::new(0, 0))),
        Err(SyncError::NotOpen)
    );
}

#[tokio::test]
async fn closed_channel_cannot_be_reopened() {
    let url = unused_local_url().await;
    let mut channel = RealtimeChannel::new(Duration::from_secs(1));

    channel.close();
    channel.open(&url);

    assert_eq!(channel.state(), ConnectionState::Closed);
    assert_eq!(channel.next_event().await, None);
}
