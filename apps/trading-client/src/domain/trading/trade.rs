//! Executed trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::identifiers::{OrderId, TradeId};
use super::order::OrderSide;
use super::timestamp;

/// A fill against an order. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Server-assigned identifier.
    pub trade_id: TradeId,
    /// The order this trade fills.
    pub order_id: OrderId,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Filled quantity.
    pub quantity: i64,
    /// Fill price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Execution time.
    #[serde(with = "timestamp::utc")]
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trade_deserializes_server_payload() {
        let json = r#"{
            "trade_id": "t-1",
            "order_id": "o-1",
            "symbol": "RELIANCE",
            "quantity": 10,
            "price": 2500.0,
            "side": "BUY",
            "timestamp": "2024-03-01T09:15:31.000001",
            "user_id": "demo-user"
        }"#;
        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.trade_id.as_str(), "t-1");
        assert_eq!(trade.side, OrderSide::Buy);
        assert_eq!(trade.price, dec!(2500));
        assert_eq!(trade.quantity, 10);
    }
}
