//! Event Channel Connection Manager
//!
//! Owns the WebSocket lifecycle: connect, keep alive, detect staleness and
//! reconnect with backoff. Status transitions and raw text messages are
//! forwarded to the session over an mpsc channel. Decoding happens on the
//! session side so a malformed message never affects the connection.

use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::subscription::ConnectivityStatus;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt or the whole manager.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// No inbound traffic within the grace window.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The session stopped listening.
    #[error("event receiver dropped")]
    ReceiverDropped,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Events
// =============================================================================

/// What the manager forwards to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Channel status changed.
    Status(ConnectivityStatus),
    /// Raw inbound text message.
    Message(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl ConnectionConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    event_tx: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Create a new connection manager.
    #[must_use]
    pub const fn new(
        config: ConnectionConfig,
        event_tx: mpsc::Sender<ConnectionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel,
        }
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer goes away or reconnect attempts are
    /// exhausted.
    pub async fn run(self) -> Result<(), ConnectionError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Connection manager cancelled");
                return Ok(());
            }

            self.emit_status(ConnectivityStatus::Connecting).await?;

            let mut opened_at = None;
            let outcome = self.connect_and_run(&mut opened_at).await;
            self.emit_status(ConnectivityStatus::Closed).await?;

            match outcome {
                Ok(()) => {
                    tracing::info!("Connection closed on shutdown");
                    return Ok(());
                }
                Err(ConnectionError::ReceiverDropped) => return Err(ConnectionError::ReceiverDropped),
                Err(e) => tracing::warn!(error = %e, "Event channel connection lost"),
            }

            if let Some(opened_at) = opened_at {
                let open_for = opened_at.elapsed();
                if policy.record_session(open_for) {
                    tracing::debug!(open_secs = open_for.as_secs(), "Stable session, backoff reset");
                }
            }

            let Some(delay) = policy.next_delay() else {
                return Err(ConnectionError::MaxReconnectAttemptsExceeded);
            };
            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to event channel"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Connection manager cancelled during reconnect delay");
                    return Ok(());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn emit_status(&self, status: ConnectivityStatus) -> Result<(), ConnectionError> {
        metrics::set_connection_state(status);
        self.event_tx
            .send(ConnectionEvent::Status(status))
            .await
            .map_err(|_| ConnectionError::ReceiverDropped)
    }

    async fn forward(&self, text: String) -> Result<(), ConnectionError> {
        self.event_tx
            .send(ConnectionEvent::Message(text))
            .await
            .map_err(|_| ConnectionError::ReceiverDropped)
    }

    /// Connect and pump messages until error or cancellation.
    async fn connect_and_run(&self, opened_at: &mut Option<Instant>) -> Result<(), ConnectionError> {
        tracing::info!(url = %self.config.url, "Connecting to event channel");

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        *opened_at = Some(Instant::now());
        tracing::info!("Event channel open");
        self.emit_status(ConnectivityStatus::Open).await?;

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        let heartbeat_manager = HeartbeatManager::new(
            self.config.heartbeat.clone(),
            Arc::clone(&heartbeat_state),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        tokio::spawn(heartbeat_manager.run());
        let _heartbeat_guard = heartbeat_cancel.drop_guard();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendProbe) => {
                            tracing::trace!("Sending liveness probe");
                            write
                                .send(Message::Text(self.config.heartbeat.probe_payload.clone().into()))
                                .await?;
                            write.send(Message::Ping(Vec::new().into())).await?;
                        }
                        Some(HeartbeatEvent::Timeout) => {
                            return Err(ConnectionError::HeartbeatTimeout);
                        }
                        None => {
                            tracing::debug!("Heartbeat channel closed");
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_traffic();
                            self.forward(text.as_str().to_owned()).await?;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            heartbeat_state.record_traffic();
                            match String::from_utf8(data.to_vec()) {
                                Ok(text) => self.forward(text).await?,
                                Err(_) => tracing::warn!(len = data.len(), "Received non-UTF8 binary message"),
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_traffic();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat_state.record_traffic();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(ConnectionError::ConnectionClosed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(ConnectionError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

/// Spawn a manager and return the receiving end of its events.
#[must_use]
pub fn spawn(
    config: ConnectionConfig,
    cancel: CancellationToken,
    capacity: usize,
) -> (
    tokio::task::JoinHandle<Result<(), ConnectionError>>,
    mpsc::Receiver<ConnectionEvent>,
) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(ConnectionManager::new(config, event_tx, cancel).run());
    (handle, event_rx)
}

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn config_defaults() {
        let config = ConnectionConfig::new("ws://localhost:8000/api/v1/ws");
        assert_eq!(config.url, "ws://localhost:8000/api/v1/ws");
        assert_eq!(config.heartbeat.probe_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn cancelled_manager_exits_immediately() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let manager = ConnectionManager::new(
            ConnectionConfig::new("ws://127.0.0.1:1/ws"),
            event_tx,
            cancel,
        );
        assert!(manager.run().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_receiver_stops_manager() {
        let (event_tx, event_rx) = mpsc::channel(8);
        drop(event_rx);

        let manager = ConnectionManager::new(
            ConnectionConfig::new("ws://127.0.0.1:1/ws"),
            event_tx,
            CancellationToken::new(),
        );
        let result = tokio::time::timeout(Duration::from_secs(2), manager.run())
            .await
            .expect("manager should stop");
        assert!(matches!(result, Err(ConnectionError::ReceiverDropped)));
    }
}
