//! Event Channel Connection Tests
//!
//! Runs the connection manager against a local WebSocket server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use trading_client::infrastructure::stream::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, HeartbeatConfig, ReconnectConfig,
};
use trading_client::ConnectivityStatus;

const WAIT: Duration = Duration::from_secs(2);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/api/v1/ws", listener.local_addr().unwrap());
    (listener, url)
}

fn fast_config(url: String) -> ConnectionConfig {
    ConnectionConfig {
        url,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
            jitter_factor: 0.0,
            ..ReconnectConfig::default()
        },
        heartbeat: HeartbeatConfig {
            probe_interval: Duration::from_millis(50),
            grace: Duration::from_millis(200),
            probe_payload: "ping".to_string(),
        },
    }
}

fn start(config: ConnectionConfig) -> (mpsc::Receiver<ConnectionEvent>, CancellationToken, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let manager = ConnectionManager::new(config, tx, cancel.clone());
    let handle = tokio::spawn(async move {
        manager.run().await.unwrap();
    });
    (rx, cancel, handle)
}

async fn next(rx: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn next_status(rx: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectivityStatus {
    loop {
        if let ConnectionEvent::Status(status) = next(rx).await {
            return status;
        }
    }
}

#[tokio::test]
async fn forwards_messages_and_reconnects_after_close() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"heartbeat"}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
        }
    });

    let (mut rx, cancel, handle) = start(fast_config(url));

    assert_eq!(next(&mut rx).await, ConnectionEvent::Status(ConnectivityStatus::Connecting));
    assert_eq!(next(&mut rx).await, ConnectionEvent::Status(ConnectivityStatus::Open));
    assert_eq!(
        next(&mut rx).await,
        ConnectionEvent::Message(r#"{"type":"heartbeat"}"#.to_string())
    );
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Closed);
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Connecting);
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Open);

    cancel.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn sends_text_probe_while_open() {
    let (listener, url) = bind().await;
    let (probe_tx, mut probe_rx) = mpsc::channel::<String>(4);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = probe_tx.send(text.as_str().to_owned()).await;
                ws.send(Message::Text("pong".into())).await.unwrap();
            }
        }
    });

    let (mut rx, cancel, handle) = start(fast_config(url));
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Connecting);
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Open);

    let probe = timeout(WAIT, probe_rx.recv()).await.unwrap().unwrap();
    assert_eq!(probe, "ping");
    assert_eq!(next(&mut rx).await, ConnectionEvent::Message("pong".to_string()));

    cancel.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn silent_server_is_torn_down() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = accept_async(stream).await.unwrap();
        // Never read or write; probes go unanswered.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let (mut rx, cancel, handle) = start(fast_config(url));
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Connecting);
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Open);
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Closed);
    assert_eq!(next_status(&mut rx).await, ConnectivityStatus::Connecting);

    cancel.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (listener, url) = bind().await;
    drop(listener);

    let (tx, mut rx) = mpsc::channel(64);
    let mut config = fast_config(url);
    config.reconnect.max_attempts = 2;
    let manager = ConnectionManager::new(config, tx, CancellationToken::new());

    let result = timeout(WAIT, manager.run()).await.unwrap();
    assert!(result.is_err());

    let mut statuses = Vec::new();
    while let Ok(ConnectionEvent::Status(status)) = rx.try_recv() {
        statuses.push(status);
    }
    assert_eq!(statuses.first(), Some(&ConnectivityStatus::Connecting));
    assert!(!statuses.contains(&ConnectivityStatus::Open));
}
