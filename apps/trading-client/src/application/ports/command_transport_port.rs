//! Command Transport Port (Driven Port)
//!
//! Request/response access to the trading server. Implementations perform
//! exactly one attempt per call.

use async_trait::async_trait;

use crate::domain::trading::{Instrument, Order, OrderId, OrderRequest, Portfolio, Trade};

/// Raw transport failure, before mapping to a command error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Server answered with a non-success status.
    #[error("HTTP {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The `detail` field of the error body, or the raw body.
        detail: String,
    },

    /// The request did not complete.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Request/response channel to the trading server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// `POST /orders`.
    async fn place_order(&self, request: &OrderRequest) -> Result<Order, TransportError>;

    /// `POST /orders/{id}/cancel`.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, TransportError>;

    /// `GET /orders/{id}`.
    async fn get_order(&self, order_id: &OrderId) -> Result<Order, TransportError>;

    /// `GET /portfolio`.
    async fn get_portfolio(&self) -> Result<Portfolio, TransportError>;

    /// `GET /trades`.
    async fn get_trades(&self) -> Result<Vec<Trade>, TransportError>;

    /// `GET /instruments`.
    async fn get_instruments(&self) -> Result<Vec<Instrument>, TransportError>;

    /// `GET /instruments/{symbol}`.
    async fn get_instrument(&self, symbol: &str) -> Result<Instrument, TransportError>;
}
