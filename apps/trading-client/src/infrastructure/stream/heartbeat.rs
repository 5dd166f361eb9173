//! Heartbeat Manager
//!
//! Sends a liveness probe on a fixed interval while the channel is open and
//! declares the channel stale when no inbound traffic of any kind (probe
//! reply, event, ping or pong) arrives within the grace window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between probes.
    pub probe_interval: Duration,
    /// Silence tolerated before the channel is considered stale.
    pub grace: Duration,
    /// Text payload of the probe.
    pub probe_payload: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            grace: Duration::from_secs(45),
            probe_payload: "ping".to_string(),
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a probe now.
    SendProbe,
    /// No traffic within the grace window; tear the channel down.
    Timeout,
}

/// Last-traffic timestamp shared with the reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_traffic: RwLock<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_traffic: RwLock::new(Instant::now()),
        }
    }

    /// Record inbound traffic.
    pub fn record_traffic(&self) {
        *self.last_traffic.write() = Instant::now();
    }

    /// Time since the last inbound traffic.
    #[must_use]
    pub fn time_since_traffic(&self) -> Duration {
        self.last_traffic.read().elapsed()
    }
}

/// Heartbeat manager that monitors channel liveness.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or a timeout is detected.
    pub async fn run(self) {
        let mut probe = tokio::time::interval(self.config.probe_interval);
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the channel was just opened.
        probe.tick().await;

        loop {
            let remaining = self
                .config
                .grace
                .saturating_sub(self.state.time_since_traffic());

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = probe.tick() => {
                    if self.event_tx.send(HeartbeatEvent::SendProbe).await.is_err() {
                        tracing::debug!("Event channel closed, stopping heartbeat");
                        break;
                    }
                }
                () = tokio::time::sleep(remaining) => {
                    let silent_for = self.state.time_since_traffic();
                    if silent_for >= self.config.grace {
                        tracing::warn!(
                            silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
                            grace_ms = u64::try_from(self.config.grace.as_millis()).unwrap_or(u64::MAX),
                            "Heartbeat timeout detected"
                        );
                        let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(probe_ms: u64, grace_ms: u64) -> HeartbeatConfig {
        HeartbeatConfig {
            probe_interval: Duration::from_millis(probe_ms),
            grace: Duration::from_millis(grace_ms),
            probe_payload: "ping".to_string(),
        }
    }

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert_eq!(config.grace, Duration::from_secs(45));
        assert_eq!(config.probe_payload, "ping");
    }

    #[test]
    fn state_tracks_traffic() {
        let state = HeartbeatState::new();
        *state.last_traffic.write() = Instant::now()
            .checked_sub(Duration::from_secs(5))
            .unwrap();
        assert!(state.time_since_traffic() >= Duration::from_secs(5));

        state.record_traffic();
        assert!(state.time_since_traffic() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn manager_sends_probe_events() {
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let manager = HeartbeatManager::new(config(50, 10_000), state, event_tx, cancel.clone());
        let handle = tokio::spawn(manager.run());

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .expect("should receive event")
            .expect("channel should not close");
        assert_eq!(event, HeartbeatEvent::SendProbe);

        cancel.cancel();
        handle.await.expect("task should complete");
    }

    #[tokio::test]
    async fn silence_beyond_grace_times_out() {
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let manager = HeartbeatManager::new(config(10_000, 100), state, event_tx, cancel.clone());
        let handle = tokio::spawn(manager.run());

        let event = tokio::time::timeout(Duration::from_millis(1000), event_rx.recv())
            .await
            .expect("should receive event")
            .expect("channel should not close");
        assert_eq!(event, HeartbeatEvent::Timeout);

        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn traffic_keeps_channel_alive() {
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let manager =
            HeartbeatManager::new(config(10_000, 150), Arc::clone(&state), event_tx, cancel.clone());
        let handle = tokio::spawn(manager.run());

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            state.record_traffic();
        }
        assert!(event_rx.try_recv().is_err(), "no timeout while traffic flows");

        cancel.cancel();
        handle.await.expect("task should complete");
    }
}
