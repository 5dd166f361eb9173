#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Trading Client - Order State Reconciliation
//!
//! A client for a remote trading API. Commands go out over HTTP, server
//! events arrive over a WebSocket, and a reconciliation store merges both
//! into one consistent view that subscribers observe slice by slice.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: entities and the reconciliation core, no I/O
//!   - `trading`: orders, trades, holdings, instruments, state machine
//!   - `reconciliation`: optimistic store, event buffer, snapshot merge
//!   - `subscription`: slice-based publish/subscribe
//!
//! - **Application**: use cases and ports
//!   - `ports`: the command transport
//!   - `services`: command client and trading session
//!
//! - **Infrastructure**: adapters
//!   - `http`: `reqwest` command transport
//!   - `stream`: WebSocket connection manager and event decoder
//!   - `config`, `telemetry`, `metrics`
//!
//! # Data Flow
//!
//! ```text
//! caller ──► TradingSession ──► CommandClient ──► HTTP ──► server
//!                 │                                          │
//!                 ▼                                          ▼
//!       ReconciliationStore ◄── EventDecoder ◄── ConnectionManager (WS)
//!                 │
//!                 ▼
//!          SubscriptionHub ──► subscribers
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Entities and reconciliation logic with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Caller-facing error types.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::reconciliation::{
    ChangeSet, Collected, ConflictKind, OrderView, ReconciliationConfig, ReconciliationConflict,
    ReconciliationStore, ServerEvent, Snapshot,
};
pub use domain::subscription::{
    ConnectivityStatus, Selector, StateUpdate, SubscriptionHandle, SubscriptionHub, UpdateQueue,
};
pub use domain::trading::{
    Holding, Instrument, Order, OrderId, OrderRequest, OrderSide, OrderState, OrderStyle,
    Portfolio, PortfolioError, Trade, TradeId,
};

// Application
pub use application::ports::{CommandTransport, TransportError};
pub use application::services::{CommandClient, SessionConfig, SharedSession, TradingSession};

// Errors
pub use error::{CommandError, ValidationError};

// Infrastructure
pub use infrastructure::config::{ClientConfig, ConfigError};
pub use infrastructure::http::{HttpCommandTransport, HttpConfig};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::stream::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager, DecodeError,
    EventDecoder,
};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
