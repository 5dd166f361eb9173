//! Server push events as seen by the store.

use chrono::{DateTime, Utc};

use crate::domain::trading::{Holding, OrderId, OrderState, Trade};

/// A decoded server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// An order moved to a new state.
    OrderStateChanged {
        /// The order.
        order_id: OrderId,
        /// Its new state.
        new_state: OrderState,
        /// When the server made the change.
        timestamp: DateTime<Utc>,
    },
    /// A fill, with the order state it leaves behind.
    TradeExecuted {
        /// The fill.
        trade: Trade,
        /// The filled order's state after this trade.
        resulting_order_state: OrderState,
    },
    /// Authoritative holdings.
    PortfolioUpdated {
        /// Full holdings list.
        holdings: Vec<Holding>,
    },
    /// Keepalive; no state.
    Heartbeat,
}

impl ServerEvent {
    /// Short name for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderStateChanged { .. } => "order_state_changed",
            Self::TradeExecuted { .. } => "trade_executed",
            Self::PortfolioUpdated { .. } => "portfolio_updated",
            Self::Heartbeat => "heartbeat",
        }
    }
}
