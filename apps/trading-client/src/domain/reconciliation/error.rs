//! Store-level command refusals.

use thiserror::Error;

use crate::domain::trading::{OrderId, OrderState};

/// The store refused to start an optimistic change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The order already reached a terminal state.
    #[error("order {order_id} is already {state}")]
    Terminal {
        /// The order.
        order_id: OrderId,
        /// Its confirmed state.
        state: OrderState,
    },

    /// A cancel for this order is already awaiting confirmation.
    #[error("a cancel for order {0} is already in flight")]
    CancelInFlight(OrderId),
}
