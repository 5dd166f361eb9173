//! Prometheus Metrics Module
//!
//! Counters and gauges for the trading client.
//!
//! # Metrics Categories
//!
//! - **Events**: inbound stream events by type, decode failures
//! - **Reconciliation**: conflicts, expired buffered events, snapshots
//! - **Commands**: place/cancel/query outcomes and latency
//! - **Connection**: channel state and reconnects
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::reconciliation::ConflictKind;
use crate::domain::subscription::ConnectivityStatus;

// =============================================================================
// Installation
// =============================================================================

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus exporter with an HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime. Calling it again is a no-op.
pub fn init_metrics(port: u16) -> Result<SocketAddr, BuildError> {
    if let Some(addr) = INSTALLED.get() {
        return Ok(*addr);
    }
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    Ok(*INSTALLED.get_or_init(|| addr))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "trading_client_events_received_total",
        "Stream events decoded, by type"
    );
    describe_counter!(
        "trading_client_decode_failures_total",
        "Inbound messages discarded as malformed"
    );
    describe_counter!(
        "trading_client_conflicts_total",
        "Optimistic or local states superseded, by kind"
    );
    describe_counter!(
        "trading_client_holding_errors_total",
        "Fills recorded without a holding update because the arithmetic overflowed"
    );
    describe_counter!(
        "trading_client_buffered_events_expired_total",
        "Events discarded because their order never appeared"
    );
    describe_counter!(
        "trading_client_commands_total",
        "Commands issued, by command and outcome"
    );
    describe_counter!(
        "trading_client_snapshots_total",
        "Snapshot fetches, by outcome"
    );
    describe_counter!(
        "trading_client_reconnects_total",
        "Event channel reconnection attempts"
    );
    describe_gauge!(
        "trading_client_connection_state",
        "Event channel state (0 closed, 1 connecting, 2 open)"
    );
    describe_histogram!(
        "trading_client_command_duration_seconds",
        "Command round-trip latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Place an order.
    Place,
    /// Cancel an order.
    Cancel,
    /// Any read.
    Query,
}

impl CommandKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Cancel => "cancel",
            Self::Query => "query",
        }
    }
}

const fn conflict_label(kind: &ConflictKind) -> &'static str {
    match kind {
        ConflictKind::FillBeatCancel => "fill_beat_cancel",
        ConflictKind::CancelRejected { .. } => "cancel_rejected",
        ConflictKind::SnapshotOverride => "snapshot_override",
    }
}

const fn connection_level(status: ConnectivityStatus) -> f64 {
    match status {
        ConnectivityStatus::Closed => 0.0,
        ConnectivityStatus::Connecting => 1.0,
        ConnectivityStatus::Open => 2.0,
    }
}

/// Record a decoded stream event.
pub fn record_event_received(event_type: &'static str) {
    counter!(
        "trading_client_events_received_total",
        "event_type" => event_type
    )
    .increment(1);
}

/// Record a malformed inbound message.
pub fn record_decode_failure() {
    counter!("trading_client_decode_failures_total").increment(1);
}

/// Record a reconciliation conflict.
pub fn record_conflict(kind: &ConflictKind) {
    counter!(
        "trading_client_conflicts_total",
        "kind" => conflict_label(kind)
    )
    .increment(1);
}

/// Record a fill whose holding update was skipped.
pub fn record_holding_error() {
    counter!("trading_client_holding_errors_total").increment(1);
}

/// Record buffered events discarded by garbage collection.
pub fn record_buffered_expired(count: u64) {
    counter!("trading_client_buffered_events_expired_total").increment(count);
}

/// Record a command outcome and latency.
pub fn record_command(kind: CommandKind, success: bool, duration: Duration) {
    let outcome = if success { "ok" } else { "error" };
    counter!(
        "trading_client_commands_total",
        "command" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "trading_client_command_duration_seconds",
        "command" => kind.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record a snapshot fetch outcome.
pub fn record_snapshot(success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!("trading_client_snapshots_total", "outcome" => outcome).increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("trading_client_reconnects_total").increment(1);
}

/// Update the channel state gauge.
pub fn set_connection_state(status: ConnectivityStatus) {
    gauge!("trading_client_connection_state").set(connection_level(status));
}

// =============================================================================
// Tests
// =============================================================================
