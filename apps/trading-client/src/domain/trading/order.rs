//! Orders and order requests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::OrderId;
use super::timestamp;
use crate::error::ValidationError;

/// Order direction (`order_type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order pricing style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStyle {
    /// Executes at the last traded price.
    Market,
    /// Executes only at the limit price or better.
    Limit,
}

impl fmt::Display for OrderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Order lifecycle state.
///
/// Transitions are monotonic: `PLACED` moves to `EXECUTED` or `CANCELLED`,
/// and both of those are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    /// Accepted by the server, awaiting execution.
    Placed,
    /// Filled.
    Executed,
    /// Cancelled before execution.
    Cancelled,
}

impl OrderState {
    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled)
    }

    /// Rank in the monotonic order. Terminal states share a rank.
    #[must_use]
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Placed => 0,
            Self::Executed | Self::Cancelled => 1,
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placed => write!(f, "PLACED"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// An order as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Server-assigned identifier.
    pub order_id: OrderId,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    #[serde(rename = "order_type")]
    pub side: OrderSide,
    /// Market or limit.
    #[serde(rename = "order_style")]
    pub style: OrderStyle,
    /// Ordered quantity.
    pub quantity: i64,
    /// Limit price (absent for market orders).
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    /// Lifecycle state.
    pub state: OrderState,
    /// Creation time.
    #[serde(with = "timestamp::utc")]
    pub created_at: DateTime<Utc>,
    /// Execution time, once executed.
    #[serde(default, with = "timestamp::utc_option")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns true while the order can still execute or be cancelled.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Request to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    #[serde(rename = "order_type")]
    pub side: OrderSide,
    /// Market or limit.
    #[serde(rename = "order_style")]
    pub style: OrderStyle,
    /// Quantity to trade.
    pub quantity: i64,
    /// Limit price.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub price: Option<Decimal>,
}

impl OrderRequest {
    /// Create a market order request.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: i64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            style: OrderStyle::Market,
            quantity,
            price: None,
        }
    }

    /// Create a limit order request.
    #[must_use]
    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: i64, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            style: OrderStyle::Limit,
            quantity,
            price: Some(price),
        }
    }

    /// Check the request and return its normalized form (trimmed, upper-case symbol).
    ///
    /// # Errors
    ///
    /// Returns the first rule the request violates.
    pub fn validate(&self) -> Result<Self, ValidationError> {
        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        if self.quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }

        match (self.style, self.price) {
            (OrderStyle::Limit, None) => return Err(ValidationError::MissingLimitPrice),
            (OrderStyle::Limit, Some(price)) if price <= Decimal::ZERO => {
                return Err(ValidationError::NonPositivePrice(price));
            }
            (OrderStyle::Market, Some(_)) => return Err(ValidationError::UnexpectedMarketPrice),
            _ => {}
        }

        Ok(Self {
            symbol,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test]
    fn terminal_states() {
        assert!(!OrderState::Placed.is_terminal());
        assert!(OrderState::Executed.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
    }

    #[test]
    fn precedence_places_terminal_states_above_placed() {
        assert!(OrderState::Executed.precedence() > OrderState::Placed.precedence());
        assert_eq!(
            OrderState::Executed.precedence(),
            OrderState::Cancelled.precedence()
        );
    }

    #[test]
    fn order_deserializes_server_payload() {
        let json = r#"{
            "order_id": "5b7c",
            "symbol": "TCS",
            "order_type": "BUY",
            "order_style": "LIMIT",
            "quantity": 3,
            "price": 3790.5,
            "state": "PLACED",
            "created_at": "2024-03-01T09:15:30.123456",
            "executed_at": null
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id.as_str(), "5b7c");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.style, OrderStyle::Limit);
        assert_eq!(order.price, Some(dec!(3790.5)));
        assert_eq!(order.state, OrderState::Placed);
        assert!(order.executed_at.is_none());
        assert!(order.is_open());
    }

    #[test]
    fn order_rejects_unknown_state() {
        let json = r#"{
            "order_id": "x", "symbol": "TCS", "order_type": "BUY",
            "order_style": "MARKET", "quantity": 1, "state": "NEW",
            "created_at": "2024-03-01T09:15:30"
        }"#;
        assert!(serde_json::from_str::<Order>(json).is_err());
    }

    #[test]
    fn market_request_omits_price_on_the_wire() {
        let request = OrderRequest::market("INFY", OrderSide::Sell, 4);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["order_type"], "SELL");
        assert_eq!(value["order_style"], "MARKET");
        assert!(value.get("price").is_none());
    }

    #[test]
    fn validate_normalizes_symbol() {
        let request = OrderRequest::market("  infy ", OrderSide::Buy, 1);
        assert_eq!(request.validate().unwrap().symbol, "INFY");
    }

    #[test_case(OrderRequest::market("", OrderSide::Buy, 1), ValidationError::EmptySymbol ; "empty symbol")]
    #[test_case(OrderRequest::market("   ", OrderSide::Buy, 1), ValidationError::EmptySymbol ; "blank symbol")]
    #[test_case(OrderRequest::market("TCS", OrderSide::Buy, 0), ValidationError::NonPositiveQuantity(0) ; "zero quantity")]
    #[test_case(OrderRequest::market("TCS", OrderSide::Sell, -5), ValidationError::NonPositiveQuantity(-5) ; "negative quantity")]
    #[test_case(OrderRequest::limit("TCS", OrderSide::Buy, 1, dec!(0)), ValidationError::NonPositivePrice(dec!(0)) ; "zero limit price")]
    #[test_case(OrderRequest::limit("TCS", OrderSide::Buy, 1, dec!(-1)), ValidationError::NonPositivePrice(dec!(-1)) ; "negative limit price")]
    fn validate_rejects(request: OrderRequest, expected: ValidationError) {
        assert_eq!(request.validate().unwrap_err(), expected);
    }

    #[test]
    fn validate_requires_limit_price() {
        let mut request = OrderRequest::limit("TCS", OrderSide::Buy, 1, dec!(10));
        request.price = None;
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::MissingLimitPrice
        );
    }

    #[test]
    fn validate_rejects_market_price() {
        let mut request = OrderRequest::market("TCS", OrderSide::Buy, 1);
        request.price = Some(dec!(10));
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::UnexpectedMarketPrice
        );
    }
}
