//! Error taxonomy for commands issued by the client.
//!
//! | Error | Origin | Surfaces to |
//! |-------|--------|-------------|
//! | [`ValidationError`] | local pre-flight checks, server never contacted | caller |
//! | [`CommandError`] | server or network rejected a command | caller |
//! | `DecodeError` | malformed inbound event | logged, event discarded |
//! | `ReconciliationConflict` | optimistic update superseded | subscribers, logged |
//!
//! Decode and reconciliation issues originate on the background stream and
//! never propagate to command callers.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::reconciliation::StoreError;
use crate::domain::trading::OrderId;

/// Local order request validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Symbol missing or blank.
    #[error("symbol must not be empty")]
    EmptySymbol,

    /// Quantity is zero or negative.
    #[error("quantity must be a positive integer, got {0}")]
    NonPositiveQuantity(i64),

    /// LIMIT order without a price.
    #[error("price is required for LIMIT orders")]
    MissingLimitPrice,

    /// LIMIT price is zero or negative.
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    /// MARKET order carrying a price.
    #[error("price must be absent for MARKET orders")]
    UnexpectedMarketPrice,
}

/// A command was rejected locally, by the server, or by the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Request failed local validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Credential missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The order's state does not allow the command.
    #[error("invalid state for order {order_id}: {reason}")]
    InvalidState {
        /// The order the command targeted.
        order_id: OrderId,
        /// Server or local explanation.
        reason: String,
    },

    /// Order or instrument does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Server rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Request never completed.
    #[error("network error: {0}")]
    Network(String),

    /// Anything else.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CommandError {
    /// Returns true if the caller should re-authenticate.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        let reason = err.to_string();
        match err {
            StoreError::Terminal { order_id, .. } | StoreError::CancelInFlight(order_id) => {
                Self::InvalidState { order_id, reason }
            }
        }
    }
}
